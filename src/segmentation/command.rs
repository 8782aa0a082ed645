use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{Detection, RegionDetector, parse_detections};

const IMAGE_PLACEHOLDER: &str = "{image}";
const MODEL_PLACEHOLDER: &str = "{model}";
const WORKDIR_PLACEHOLDER: &str = "{workdir}";

/// Runs an external segmentation model. The page is written to
/// `{workdir}/page.png`; the command prints a detection document on stdout
/// and may write PNG masks into `{workdir}`.
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    model_path: Option<PathBuf>,
    threshold: f32,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>, threshold: f32) -> Self {
        Self {
            program: program.into(),
            args,
            model_path: None,
            threshold,
        }
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    fn build_args(&self, image: &Path, workdir: &Path) -> Result<Vec<String>> {
        let image_str = image.to_string_lossy();
        let workdir_str = workdir.to_string_lossy();
        let model_str = self
            .model_path
            .as_ref()
            .map(|path| path.to_string_lossy().to_string());
        let mut has_image = false;
        let mut args = Vec::with_capacity(self.args.len() + 1);
        for arg in &self.args {
            if arg.contains(MODEL_PLACEHOLDER) && model_str.is_none() {
                return Err(anyhow!(
                    "segmentation args use {} but no model_path is configured",
                    MODEL_PLACEHOLDER
                ));
            }
            has_image |= arg.contains(IMAGE_PLACEHOLDER);
            let mut value = arg
                .replace(IMAGE_PLACEHOLDER, &image_str)
                .replace(WORKDIR_PLACEHOLDER, &workdir_str);
            if let Some(model) = model_str.as_deref() {
                value = value.replace(MODEL_PLACEHOLDER, model);
            }
            args.push(value);
        }
        if !has_image {
            args.push(image_str.to_string());
        }
        Ok(args)
    }
}

impl RegionDetector for CommandDetector {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let workdir = tempfile::Builder::new()
            .prefix("manga-segmentation")
            .tempdir()
            .with_context(|| "failed to create temp dir for segmentation")?;
        let page_path = workdir.path().join("page.png");
        image
            .save_with_format(&page_path, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for segmentation")?;

        let args = self.build_args(&page_path, workdir.path())?;
        debug!("running segmentation: {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .with_context(|| format!("failed to run segmentation command '{}'", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("segmentation command failed: {}", stderr.trim()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_detections(
            &stdout,
            workdir.path(),
            image.width(),
            image.height(),
            self.threshold,
        )
    }
}
