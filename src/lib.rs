use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod compositor;
pub mod erase;
pub mod font;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod ocr;
pub mod render;
pub mod segmentation;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod translators;

pub use compositor::{Composite, CompositeOptions, Compositor, RegionReport, RegionStatus};
pub use geometry::{BoundingBox, InscribedRect, RegionMask, largest_inscribed_rectangle};
pub use layout::{LayoutError, LayoutOptions, TextLayout, TextMeasure, layout_text};
pub use ocr::TextRecognizer;
pub use render::Canvas;
pub use segmentation::{Detection, RegionDetector};
pub use translators::TextTranslator;

use render::{DebugRegion, TextStyle};
use segmentation::{CommandDetector, DetectionFile};
use settings::Settings;
use translators::TranslatorKind;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub provider: Option<String>,
    pub key: Option<String>,
    pub regions: Option<PathBuf>,
    pub font: Option<PathBuf>,
    pub text_buffer: Option<f32>,
    pub settings_path: Option<PathBuf>,
    pub debug_regions: Option<PathBuf>,
}

impl Config {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(source) = non_blank(&self.source_lang) {
            settings.source_lang = source;
            // Derived again from the new source language.
            settings.ocr_languages = None;
        }
        if let Some(target) = non_blank(&self.target_lang) {
            settings.target_lang = target;
        }
        if let Some(provider) = non_blank(&self.provider) {
            settings.provider = provider;
        }
        if let Some(key) = non_blank(&self.key) {
            settings.api_key = Some(key);
        }
        if let Some(font) = &self.font {
            settings.font_path = Some(font.to_string_lossy().to_string());
        }
        if let Some(buffer) = self.text_buffer {
            settings.text_buffer = buffer;
        }
    }
}

/// Translates one page and writes the result. Returns a short summary.
pub async fn run(config: Config) -> Result<String> {
    let mut settings = settings::load_settings(config.settings_path.as_deref())?;
    config.apply_to(&mut settings);
    settings.validate()?;

    let output = config
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&config.input));
    image::ImageFormat::from_path(&output)
        .map_err(|_| anyhow!("unsupported output image format: {}", output.display()))?;
    let fill = erase::parse_hex_color(&settings.fill_color)
        .with_context(|| "invalid [render] fill_color")?;
    erase::parse_hex_color(&settings.text_color).with_context(|| "invalid [render] text_color")?;

    let page = image::open(&config.input)
        .with_context(|| format!("failed to read image: {}", config.input.display()))?
        .to_rgb8();
    let detector = build_detector(&config, &settings)?;
    let regions = detector.predict(&page)?;
    info!("{} region(s) detected", regions.len());

    let font = font::resolve_font(
        settings.font_path.as_deref().map(Path::new),
        settings.font_family.as_deref(),
        font::fallback_fonts(),
    )?;
    info!("font: {}", font.family);
    let recognizer = build_recognizer(&settings)?;
    let kind = TranslatorKind::from_name(&settings.provider)?;
    let key = translators::resolve_key(kind, settings.api_key.as_deref());
    let translator =
        translators::build_translator(kind, &settings.source_lang, &settings.target_lang, key)?;

    let options = CompositeOptions {
        text_buffer: settings.text_buffer,
        fill,
        layout: LayoutOptions {
            initial_font_size: settings.initial_font_size,
            font_size_step: settings.font_size_step,
            min_font_size: settings.min_font_size,
        },
    };
    let debug_page = config.debug_regions.as_ref().map(|_| page.clone());
    let compositor = Compositor::new(&recognizer, &translator, &font.metrics, options);
    let composite = compositor.translate_image(page, &regions).await?;

    if let (Some(dir), Some(debug_page)) = (&config.debug_regions, debug_page) {
        write_debug_regions(dir, &debug_page, &composite.reports)?;
    }

    let style = TextStyle {
        color: settings.text_color.clone(),
        family: Some(font.family.clone()),
    };
    let rendered = render::render_canvas(
        &composite.canvas,
        &font.metrics,
        &style,
        Some(font.metrics.data()),
    )?;
    render::save_image(&rendered, &output)?;
    Ok(format_summary(&output, &composite))
}

fn build_detector(config: &Config, settings: &Settings) -> Result<Box<dyn RegionDetector>> {
    if let Some(path) = &config.regions {
        return Ok(Box::new(DetectionFile::new(
            path,
            settings.segmentation_threshold,
        )));
    }
    let Some(command) = settings.segmentation_command.as_deref() else {
        return Err(anyhow!(
            "no text regions: pass --regions or set [segmentation] command"
        ));
    };
    let mut detector = CommandDetector::new(
        command,
        settings.segmentation_args.clone(),
        settings.segmentation_threshold,
    );
    if let Some(model) = settings.segmentation_model_path.as_deref() {
        detector = detector.with_model_path(model);
    }
    Ok(Box::new(detector))
}

fn build_recognizer(settings: &Settings) -> Result<ocr::TesseractRecognizer> {
    let languages = settings
        .ocr_languages
        .clone()
        .unwrap_or_else(|| ocr::tesseract_languages_for(&settings.source_lang));
    let recognizer =
        ocr::TesseractRecognizer::new(&settings.ocr_command, languages, settings.ocr_psm)
            .with_available_languages()?;
    info!(
        "ocr: {} -l {} --psm {}",
        settings.ocr_command,
        recognizer.languages(),
        recognizer.psm()
    );
    Ok(recognizer)
}

fn write_debug_regions(dir: &Path, page: &image::RgbImage, reports: &[RegionReport]) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create debug directory: {}", dir.display()))?;
    let regions: Vec<DebugRegion<'_>> = reports
        .iter()
        .map(|report| DebugRegion {
            bbox: &report.bbox,
            inscribed: report.inscribed.as_ref(),
        })
        .collect();
    let overlay = render::render_debug_overlay(page, &regions)?;
    render::save_image(&overlay, &dir.join("regions.png"))?;
    let json = serde_json::to_string_pretty(reports)?;
    let json_path = dir.join("regions.json");
    fs::write(&json_path, json)
        .with_context(|| format!("failed to write {}", json_path.display()))?;
    Ok(())
}

/// `<dir>/<stem>_translated.<ext>`; the extension defaults to png.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "page".to_string());
    let ext = input
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_else(|| "png".to_string());
    input.with_file_name(format!("{}_translated.{}", stem, ext))
}

fn format_summary(output: &Path, composite: &Composite) -> String {
    let reports = &composite.reports;
    let rendered = composite.rendered();
    let mut summary = format!(
        "{}\nregions: {} detected, {} rendered, {} skipped",
        output.display(),
        reports.len(),
        rendered,
        reports.len() - rendered
    );
    for report in reports {
        let reason = match &report.status {
            RegionStatus::Rendered { .. } => continue,
            RegionStatus::EmptyMask => "empty mask".to_string(),
            RegionStatus::NoSourceText => "no source text".to_string(),
            RegionStatus::NoTranslation => "no translation".to_string(),
            RegionStatus::NoFit { floor } => format!("does not fit at size {}", floor),
        };
        summary.push_str(&format!("\n  #{}: {}", report.index, reason));
    }
    summary
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
