use anyhow::{Result, anyhow};
use image::{Rgb, RgbImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::erase::DEFAULT_FILL;
use crate::geometry::{BoundingBox, InscribedRect, largest_inscribed_rectangle};
use crate::layout::{LayoutError, LayoutOptions, TextMeasure, layout_text};
use crate::ocr::TextRecognizer;
use crate::render::Canvas;
use crate::segmentation::Detection;
use crate::translators::TextTranslator;

pub const DEFAULT_TEXT_BUFFER: f32 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct CompositeOptions {
    /// Share of the inscribed rectangle's width usable for text.
    pub text_buffer: f32,
    pub fill: Rgb<u8>,
    pub layout: LayoutOptions,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            text_buffer: DEFAULT_TEXT_BUFFER,
            fill: DEFAULT_FILL,
            layout: LayoutOptions::default(),
        }
    }
}

impl CompositeOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.text_buffer > 0.0 && self.text_buffer <= 1.0) {
            return Err(anyhow!(
                "text buffer must be in (0, 1], got {}",
                self.text_buffer
            ));
        }
        if self.layout.font_size_step == 0 {
            return Err(anyhow!("font size step must be positive"));
        }
        if self.layout.min_font_size == 0 || self.layout.min_font_size > self.layout.initial_font_size
        {
            return Err(anyhow!(
                "min font size must be in 1..={}, got {}",
                self.layout.initial_font_size,
                self.layout.min_font_size
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionStatus {
    Rendered { font_size: u32, lines: Vec<String> },
    EmptyMask,
    NoSourceText,
    NoTranslation,
    NoFit { floor: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionReport {
    pub index: usize,
    pub bbox: BoundingBox,
    pub inscribed: Option<InscribedRect>,
    pub source_text: String,
    pub translated_text: Option<String>,
    #[serde(flatten)]
    pub status: RegionStatus,
}

pub struct Composite {
    pub canvas: Canvas,
    pub reports: Vec<RegionReport>,
}

impl Composite {
    pub fn rendered(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| matches!(report.status, RegionStatus::Rendered { .. }))
            .count()
    }
}

/// Drives erase, OCR, translation, layout and drawing for every region of a
/// page, strictly in detection order over one owned canvas.
pub struct Compositor<'a, R: ?Sized, T: ?Sized, M: ?Sized> {
    recognizer: &'a R,
    translator: &'a T,
    measure: &'a M,
    options: CompositeOptions,
}

impl<'a, R, T, M> Compositor<'a, R, T, M>
where
    R: TextRecognizer + ?Sized,
    T: TextTranslator + ?Sized,
    M: TextMeasure + ?Sized,
{
    pub fn new(recognizer: &'a R, translator: &'a T, measure: &'a M, options: CompositeOptions) -> Self {
        Self {
            recognizer,
            translator,
            measure,
            options,
        }
    }

    /// Region-local problems (empty mask, no text, no fit) are recorded in
    /// the reports; collaborator failures abort the page.
    pub async fn translate_image(&self, image: RgbImage, regions: &[Detection]) -> Result<Composite> {
        self.options.validate()?;
        let mut canvas = Canvas::new(image);
        let mut reports = Vec::with_capacity(regions.len());
        for (index, region) in regions.iter().enumerate() {
            let report = self.process_region(index, region, &mut canvas).await?;
            reports.push(report);
        }
        Ok(Composite { canvas, reports })
    }

    async fn process_region(
        &self,
        index: usize,
        region: &Detection,
        canvas: &mut Canvas,
    ) -> Result<RegionReport> {
        canvas.erase(&region.mask, self.options.fill)?;
        let mut report = RegionReport {
            index,
            bbox: region.bbox,
            inscribed: None,
            source_text: String::new(),
            translated_text: None,
            status: RegionStatus::EmptyMask,
        };

        let Some(rect) = largest_inscribed_rectangle(&region.mask) else {
            warn!("region {}: empty mask, skipped", index);
            return Ok(report);
        };
        report.inscribed = Some(rect);

        report.source_text = match canvas.crop(&region.bbox) {
            Some(crop) => self.recognizer.recognize(&crop)?.trim().to_string(),
            None => String::new(),
        };
        if report.source_text.is_empty() {
            warn!("region {}: no source text, left blank", index);
            report.status = RegionStatus::NoSourceText;
            return Ok(report);
        }

        let translated = self
            .translator
            .translate(&report.source_text)
            .await?
            .filter(|text| !text.trim().is_empty());
        let Some(translated) = translated else {
            warn!("region {}: no translation, left blank", index);
            report.status = RegionStatus::NoTranslation;
            return Ok(report);
        };
        debug!(
            "region {}: {:?} -> {:?}",
            index, report.source_text, translated
        );

        let target_width = (rect.width as f32 * self.options.text_buffer).floor();
        let target_height = rect.height as f32;
        report.status = match layout_text(
            &translated,
            target_width,
            target_height,
            self.measure,
            &self.options.layout,
        ) {
            Ok(Some(layout)) => {
                info!(
                    "region {}: {} line(s) at size {}",
                    index,
                    layout.lines.len(),
                    layout.font_size
                );
                let status = RegionStatus::Rendered {
                    font_size: layout.font_size,
                    lines: layout.lines.clone(),
                };
                canvas.draw_text(rect.center(), layout);
                status
            }
            Ok(None) => RegionStatus::NoTranslation,
            Err(LayoutError::NoFit { floor, .. }) => {
                warn!(
                    "region {}: text does not fit {}x{} down to size {}, left blank",
                    index, target_width, target_height, floor
                );
                RegionStatus::NoFit { floor }
            }
        };
        report.translated_text = Some(translated);
        Ok(report)
    }
}
