use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Region skips are reported at `warn` and always shown; `verbose` adds the
/// per-region OCR, translation and layout trace.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .without_time()
        .try_init();
    Ok(())
}
