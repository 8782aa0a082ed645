use anyhow::{Result, anyhow};
use image::{Rgb, RgbImage};

use crate::geometry::{BoundingBox, RegionMask};

/// Blank paper.
pub const DEFAULT_FILL: Rgb<u8> = Rgb([255, 255, 255]);

pub fn erase(image: &RgbImage, mask: &RegionMask, fill: Rgb<u8>) -> Result<RgbImage> {
    let mut output = image.clone();
    erase_in_place(&mut output, mask, fill)?;
    Ok(output)
}

pub fn erase_in_place(image: &mut RgbImage, mask: &RegionMask, fill: Rgb<u8>) -> Result<()> {
    if image.dimensions() != mask.dimensions() {
        return Err(anyhow!(
            "mask is {}x{} but image is {}x{}",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        ));
    }
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if mask.get(x, y) {
            *pixel = fill;
        }
    }
    Ok(())
}

/// Copies the part of `image` covered by `bbox`, or `None` when the box lies
/// outside the image.
pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (x, y, w, h) = bbox.clamp_to(image.width(), image.height())?;
    Some(image::imageops::crop_imm(image, x, y, w, h).to_image())
}

/// Parses `#rrggbb` (or `rrggbb`).
pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!("invalid color '{}', expected #rrggbb", value));
    }
    let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16);
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
