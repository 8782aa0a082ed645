use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::{FONT_SIZE_STEP, INITIAL_FONT_SIZE, MIN_FONT_SIZE};
use crate::segmentation::DEFAULT_THRESHOLD;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub source_lang: String,
    pub target_lang: String,
    pub provider: String,
    pub api_key: Option<String>,
    pub ocr_command: String,
    pub ocr_languages: Option<String>,
    pub ocr_psm: Option<u32>,
    pub segmentation_command: Option<String>,
    pub segmentation_args: Vec<String>,
    pub segmentation_model_path: Option<String>,
    pub segmentation_threshold: f32,
    pub text_buffer: f32,
    pub initial_font_size: u32,
    pub font_size_step: u32,
    pub min_font_size: u32,
    pub font_path: Option<String>,
    pub font_family: Option<String>,
    pub text_color: String,
    pub fill_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_lang: "ja".to_string(),
            target_lang: "en".to_string(),
            provider: "google".to_string(),
            api_key: None,
            ocr_command: "tesseract".to_string(),
            ocr_languages: None,
            ocr_psm: None,
            segmentation_command: None,
            segmentation_args: Vec::new(),
            segmentation_model_path: None,
            segmentation_threshold: DEFAULT_THRESHOLD,
            text_buffer: 0.9,
            initial_font_size: INITIAL_FONT_SIZE,
            font_size_step: FONT_SIZE_STEP,
            min_font_size: MIN_FONT_SIZE,
            font_path: None,
            font_family: None,
            text_color: "#000000".to_string(),
            fill_color: "#ffffff".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSettings>,
    ocr: Option<OcrSettings>,
    segmentation: Option<SegmentationSettings>,
    layout: Option<LayoutSettings>,
    render: Option<RenderSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    source: Option<String>,
    target: Option<String>,
    provider: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    command: Option<String>,
    languages: Option<String>,
    psm: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentationSettings {
    command: Option<String>,
    args: Option<Vec<String>>,
    model_path: Option<String>,
    threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    text_buffer: Option<f32>,
    initial_font_size: Option<u32>,
    font_size_step: Option<u32>,
    min_font_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    font_path: Option<String>,
    font_family: Option<String>,
    text_color: Option<String>,
    fill_color: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translation) = incoming.translation {
            if let Some(source) = non_blank(translation.source) {
                self.source_lang = source;
            }
            if let Some(target) = non_blank(translation.target) {
                self.target_lang = target;
            }
            if let Some(provider) = non_blank(translation.provider) {
                self.provider = provider;
            }
            if let Some(key) = non_blank(translation.api_key) {
                self.api_key = Some(key);
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(command) = non_blank(ocr.command) {
                self.ocr_command = command;
            }
            if let Some(languages) = non_blank(ocr.languages) {
                self.ocr_languages = Some(languages);
            }
            if let Some(psm) = ocr.psm {
                self.ocr_psm = Some(psm);
            }
        }
        if let Some(segmentation) = incoming.segmentation {
            if let Some(command) = non_blank(segmentation.command) {
                self.segmentation_command = Some(command);
            }
            if let Some(args) = segmentation.args {
                self.segmentation_args = args;
            }
            if let Some(path) = non_blank(segmentation.model_path) {
                self.segmentation_model_path = Some(path);
            }
            if let Some(threshold) = segmentation.threshold {
                self.segmentation_threshold = threshold;
            }
        }
        if let Some(layout) = incoming.layout {
            if let Some(buffer) = layout.text_buffer {
                self.text_buffer = buffer;
            }
            if let Some(size) = layout.initial_font_size {
                self.initial_font_size = size;
            }
            if let Some(step) = layout.font_size_step {
                self.font_size_step = step;
            }
            if let Some(size) = layout.min_font_size {
                self.min_font_size = size;
            }
        }
        if let Some(render) = incoming.render {
            if let Some(path) = non_blank(render.font_path) {
                self.font_path = Some(path);
            }
            if let Some(family) = non_blank(render.font_family) {
                self.font_family = Some(family);
            }
            if let Some(color) = non_blank(render.text_color) {
                self.text_color = color;
            }
            if let Some(color) = non_blank(render.fill_color) {
                self.fill_color = color;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.text_buffer > 0.0 && self.text_buffer <= 1.0) {
            return Err(anyhow!(
                "[layout] text_buffer must be in (0, 1], got {}",
                self.text_buffer
            ));
        }
        if self.font_size_step == 0 {
            return Err(anyhow!("[layout] font_size_step must be positive"));
        }
        if self.min_font_size == 0 || self.min_font_size > self.initial_font_size {
            return Err(anyhow!(
                "[layout] min_font_size must be in 1..={}, got {}",
                self.initial_font_size,
                self.min_font_size
            ));
        }
        if !(0.0..=1.0).contains(&self.segmentation_threshold) {
            return Err(anyhow!(
                "[segmentation] threshold must be in [0, 1], got {}",
                self.segmentation_threshold
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".manga-translator-rust"))
        }
    })
}
