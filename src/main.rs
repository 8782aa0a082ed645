use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "manga-translator-rust",
    version,
    about = "Replace the text in manga speech bubbles with a translation"
)]
struct Cli {
    /// Page image to translate
    input: PathBuf,

    /// Output image (default: <input>_translated.<ext>); format follows the extension
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Source language (ISO 639-1, default from settings: ja)
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Target language (ISO 639-1, default from settings: en)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Translation provider (google or deepl)
    #[arg(short = 'p', long = "provider")]
    provider: Option<String>,

    /// API key (overrides settings and environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Detection JSON for the page (skips the [segmentation] command)
    #[arg(long = "regions")]
    regions: Option<PathBuf>,

    /// Font file used for measuring and drawing the translation
    #[arg(long = "font")]
    font: Option<PathBuf>,

    /// Share of the inscribed rectangle's width usable for text (0, 1]
    #[arg(long = "text-buffer")]
    text_buffer: Option<f32>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<PathBuf>,

    /// Write regions.png and regions.json into this directory
    #[arg(long = "debug-regions")]
    debug_regions: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_translator_rust::logging::init(cli.verbose)?;

    let output = manga_translator_rust::run(manga_translator_rust::Config {
        input: cli.input,
        output: cli.output,
        source_lang: cli.source_lang,
        target_lang: cli.lang,
        provider: cli.provider,
        key: cli.key,
        regions: cli.regions,
        font: cli.font,
        text_buffer: cli.text_buffer,
        settings_path: cli.read_settings,
        debug_regions: cli.debug_regions,
    })
    .await?;
    println!("{}", output);
    Ok(())
}
