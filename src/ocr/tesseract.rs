use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use std::process::Command;
use tracing::{debug, warn};

use super::{TextRecognizer, default_psm, normalize_text};

pub struct TesseractRecognizer {
    program: String,
    languages: String,
    psm: Option<u32>,
}

impl TesseractRecognizer {
    /// Without an explicit `psm` the mode follows the first language once
    /// the language list is final.
    pub fn new(program: impl Into<String>, languages: impl Into<String>, psm: Option<u32>) -> Self {
        Self {
            program: program.into(),
            languages: languages.into(),
            psm,
        }
    }

    /// Keeps only the requested languages tesseract has installed. When the
    /// installed list cannot be read the request is used as-is.
    pub fn with_available_languages(mut self) -> Result<Self> {
        self.languages = normalize_ocr_languages(&self.program, &self.languages)?;
        Ok(self)
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    pub fn psm(&self) -> u32 {
        self.psm.unwrap_or_else(|| default_psm(&self.languages))
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, crop: &RgbImage) -> Result<String> {
        let tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        crop.save_with_format(tmp.path(), image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;

        let output = Command::new(&self.program)
            .arg(tmp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg(self.psm().to_string())
            .output()
            .with_context(|| format!("failed to run {} (is it installed?)", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("tesseract failed: {}", stderr.trim()));
        }
        let text = normalize_text(&String::from_utf8_lossy(&output.stdout));
        debug!("ocr: {:?}", text);
        Ok(text)
    }
}

pub fn list_tesseract_languages(program: &str) -> Result<Vec<String>> {
    let output = Command::new(program)
        .arg("--list-langs")
        .output()
        .with_context(|| format!("failed to run {} --list-langs", program))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_list(&stdout))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_ocr_languages(program: &str, requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    let available = match list_tesseract_languages(program) {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };
    choose_languages(trimmed, &available)
}

fn choose_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in requested.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_list_langs_output() {
        let stdout = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\njpn\njpn_vert\n";
        assert_eq!(parse_language_list(stdout), langs(&["eng", "jpn", "jpn_vert"]));
    }

    #[test]
    fn keeps_installed_languages_only() {
        let available = langs(&["eng", "jpn"]);
        assert_eq!(
            choose_languages("jpn_vert+jpn", &available).unwrap(),
            "jpn"
        );
        assert!(choose_languages("kor", &available).is_err());
    }

    #[test]
    fn psm_follows_languages_unless_set() {
        assert_eq!(TesseractRecognizer::new("tesseract", "jpn_vert+jpn", None).psm(), 5);
        assert_eq!(TesseractRecognizer::new("tesseract", "jpn", None).psm(), 6);
        assert_eq!(TesseractRecognizer::new("tesseract", "jpn_vert", Some(3)).psm(), 3);
    }

    #[test]
    fn missing_binary_is_an_error() {
        let recognizer = TesseractRecognizer::new("definitely-not-tesseract", "eng", Some(6));
        assert!(recognizer.recognize(&RgbImage::new(4, 4)).is_err());
    }
}
