use anyhow::Result;
use image::RgbImage;

mod tesseract;

pub use tesseract::{TesseractRecognizer, list_tesseract_languages};

/// Reads the source-language text of one cropped region.
pub trait TextRecognizer {
    fn recognize(&self, crop: &RgbImage) -> Result<String>;
}

/// Tesseract language string for an ISO 639-1 source code.
pub fn tesseract_languages_for(source_lang: &str) -> String {
    match source_lang.trim().to_ascii_lowercase().as_str() {
        "ja" => "jpn_vert+jpn".to_string(),
        "zh" | "zh-cn" => "chi_sim".to_string(),
        "zh-tw" => "chi_tra".to_string(),
        "ko" => "kor".to_string(),
        "en" => "eng".to_string(),
        other => other.to_string(),
    }
}

/// Default page segmentation mode: single vertical block for vertical
/// scripts, single uniform block otherwise.
pub fn default_psm(languages: &str) -> u32 {
    if languages.split('+').next().unwrap_or_default().ends_with("_vert") {
        5
    } else {
        6
    }
}

/// Collapses whitespace and drops the spaces OCR inserts between CJK
/// characters.
pub(crate) fn normalize_text(raw: &str) -> String {
    let chars: Vec<char> = collapse_whitespace(raw.trim()).chars().collect();
    let mut out = String::with_capacity(raw.len());
    for (idx, ch) in chars.iter().enumerate() {
        if *ch == ' ' {
            let prev = idx.checked_sub(1).map(|i| chars[i]);
            let next = chars.get(idx + 1).copied();
            if let (Some(a), Some(b)) = (prev, next)
                && is_cjk(a)
                && is_cjk(b)
            {
                continue;
            }
        }
        out.push(*ch);
    }
    out
}

fn collapse_whitespace(value: &str) -> String {
    let mut out = String::new();
    let mut last_space = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}

fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3000..=0x303F
            | 0x3040..=0x30FF
            | 0x31F0..=0x31FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xFF00..=0xFFEF
    )
}
