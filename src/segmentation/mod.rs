use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::geometry::{BoundingBox, RegionMask};

mod command;

pub use command::CommandDetector;

/// Test-time score threshold of the speech-bubble model.
pub const DEFAULT_THRESHOLD: f32 = 0.9;

/// One detected text region.
#[derive(Debug, Clone)]
pub struct Detection {
    pub mask: RegionMask,
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Produces the text regions of a page, in detection order.
pub trait RegionDetector {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Detections precomputed into a JSON document on disk.
pub struct DetectionFile {
    path: PathBuf,
    threshold: f32,
}

impl DetectionFile {
    pub fn new(path: impl Into<PathBuf>, threshold: f32) -> Self {
        Self {
            path: path.into(),
            threshold,
        }
    }
}

impl RegionDetector for DetectionFile {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read detections: {}", self.path.display()))?;
        let base_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        parse_detections(
            &content,
            base_dir,
            image.width(),
            image.height(),
            self.threshold,
        )
        .with_context(|| format!("invalid detections: {}", self.path.display()))
    }
}

#[derive(Debug, Deserialize)]
struct DetectionDocument {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    regions: Vec<RegionEntry>,
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    bbox: [i32; 4],
    #[serde(default = "default_score")]
    score: f32,
    #[serde(default)]
    mask: Option<String>,
    #[serde(default)]
    rle: Option<RleMask>,
}

/// COCO uncompressed RLE: `size` is `[height, width]`, runs are
/// column-major and start with `false`.
#[derive(Debug, Deserialize)]
struct RleMask {
    size: [u32; 2],
    counts: Vec<u32>,
}

fn default_score() -> f32 {
    1.0
}

/// Parses a detection document for a `width`x`height` page and keeps the
/// regions scoring at least `threshold`, in document order. Mask paths are
/// resolved against `base_dir`.
pub fn parse_detections(
    json: &str,
    base_dir: &Path,
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<Vec<Detection>> {
    let document: DetectionDocument =
        serde_json::from_str(json).with_context(|| "failed to parse detection JSON")?;
    if let (Some(doc_w), Some(doc_h)) = (document.width, document.height)
        && (doc_w, doc_h) != (width, height)
    {
        return Err(anyhow!(
            "detections are for a {}x{} page but the image is {}x{}",
            doc_w,
            doc_h,
            width,
            height
        ));
    }

    let mut detections = Vec::new();
    for (idx, entry) in document.regions.into_iter().enumerate() {
        if entry.score < threshold {
            debug!(
                "region {} dropped: score {:.3} < {:.3}",
                idx, entry.score, threshold
            );
            continue;
        }
        let mask = match (&entry.mask, &entry.rle) {
            (Some(path), _) => load_mask_png(&base_dir.join(path))?,
            (None, Some(rle)) => decode_rle(rle)?,
            (None, None) => return Err(anyhow!("region {} has neither mask nor rle", idx)),
        };
        if mask.dimensions() != (width, height) {
            return Err(anyhow!(
                "region {} mask is {}x{} but the image is {}x{}",
                idx,
                mask.width(),
                mask.height(),
                width,
                height
            ));
        }
        let [x1, y1, x2, y2] = entry.bbox;
        detections.push(Detection {
            mask,
            bbox: BoundingBox::new(x1, y1, x2, y2),
            score: entry.score,
        });
    }
    Ok(detections)
}

fn load_mask_png(path: &Path) -> Result<RegionMask> {
    let image =
        image::open(path).with_context(|| format!("failed to read mask: {}", path.display()))?;
    Ok(RegionMask::from_luma(&image.to_luma8()))
}

fn decode_rle(rle: &RleMask) -> Result<RegionMask> {
    let [height, width] = rle.size;
    let total = width as usize * height as usize;
    let mut mask = RegionMask::new(width, height);
    let mut offset = 0usize;
    let mut value = false;
    for &run in &rle.counts {
        let end = offset + run as usize;
        if end > total {
            return Err(anyhow!(
                "rle runs cover {} cells but the mask has {}",
                end,
                total
            ));
        }
        if value && height > 0 {
            for idx in offset..end {
                mask.set((idx / height as usize) as u32, (idx % height as usize) as u32, true);
            }
        }
        offset = end;
        value = !value;
    }
    if offset != total {
        return Err(anyhow!(
            "rle runs cover {} cells but the mask has {}",
            offset,
            total
        ));
    }
    Ok(mask)
}
