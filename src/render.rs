use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{Rgb, RgbImage, RgbaImage};
use resvg::render;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::erase;
use crate::geometry::{BoundingBox, InscribedRect, RegionMask};
use crate::layout::{LINE_SPACING, TextLayout, TextMeasure};

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub center: (u32, u32),
    pub layout: TextLayout,
}

/// Drawing surface for one page: the running erased image plus the text
/// blocks placed so far. Text is composited over the image only when the
/// canvas is rendered, so crops always see the erased page alone.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbImage,
    texts: Vec<PlacedText>,
}

impl Canvas {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            texts: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn texts(&self) -> &[PlacedText] {
        &self.texts
    }

    pub fn erase(&mut self, mask: &RegionMask, fill: Rgb<u8>) -> Result<()> {
        erase::erase_in_place(&mut self.image, mask, fill)
    }

    pub fn crop(&self, bbox: &BoundingBox) -> Option<RgbImage> {
        erase::crop(&self.image, bbox)
    }

    pub fn draw_text(&mut self, center: (u32, u32), layout: TextLayout) {
        self.texts.push(PlacedText { center, layout });
    }
}

pub struct TextStyle {
    pub color: String,
    pub family: Option<String>,
}

pub fn render_canvas<M: TextMeasure + ?Sized>(
    canvas: &Canvas,
    measure: &M,
    style: &TextStyle,
    font_data: Option<&[u8]>,
) -> Result<RgbImage> {
    if canvas.texts().is_empty() {
        return Ok(canvas.image().clone());
    }
    let (width, height) = canvas.image().dimensions();
    let mut svg = svg_open(width, height, &png_data_uri(canvas.image())?);
    for placed in canvas.texts() {
        svg.push_str(&text_block_svg(placed, measure, style));
    }
    svg.push_str("</svg>");
    let rgba = rasterize_svg(&svg, font_data)?;
    Ok(image::DynamicImage::ImageRgba8(rgba).to_rgb8())
}

/// One `<text>` element; each line is horizontally centred on the anchor and
/// the block as a whole is vertically centred on it.
pub fn text_block_svg<M: TextMeasure + ?Sized>(
    placed: &PlacedText,
    measure: &M,
    style: &TextStyle,
) -> String {
    let font_size = placed.layout.font_size;
    let (cx, cy) = (placed.center.0 as f32, placed.center.1 as f32);
    let bounds = measure.block_bounds(&placed.layout.lines, font_size, (cx, cy));
    let metrics = measure.line_metrics(font_size);
    let advance = metrics.height + LINE_SPACING;

    let mut block = String::new();
    match style.family.as_deref() {
        Some(family) => block.push_str(&format!(
            r#"<text font-size="{size}" fill="{color}" font-family="{family}" text-anchor="middle">"#,
            size = font_size,
            color = escape_xml(&style.color),
            family = escape_xml(family)
        )),
        None => block.push_str(&format!(
            r#"<text font-size="{size}" fill="{color}" text-anchor="middle">"#,
            size = font_size,
            color = escape_xml(&style.color)
        )),
    }
    for (idx, line) in placed.layout.lines.iter().enumerate() {
        let baseline = bounds.top + metrics.ascent + idx as f32 * advance;
        block.push_str(&format!(
            r#"<tspan x="{x}" y="{y}">{text}</tspan>"#,
            x = cx,
            y = baseline,
            text = escape_xml(line)
        ));
    }
    block.push_str("</text>");
    block
}

pub struct DebugRegion<'a> {
    pub bbox: &'a BoundingBox,
    pub inscribed: Option<&'a InscribedRect>,
}

/// Page with detector boxes in green and inscribed rectangles in red.
pub fn render_debug_overlay(image: &RgbImage, regions: &[DebugRegion<'_>]) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let mut svg = svg_open(width, height, &png_data_uri(image)?);
    for region in regions {
        if let Some((x, y, w, h)) = region.bbox.clamp_to(width, height) {
            svg.push_str(&format!(
                r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#00c853" stroke-width="2"/>"##
            ));
        }
        if let Some(rect) = region.inscribed {
            svg.push_str(&format!(
                r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#d50000" stroke-width="2"/>"##,
                x = rect.x,
                y = rect.y,
                w = rect.width,
                h = rect.height
            ));
        }
    }
    svg.push_str("</svg>");
    let rgba = rasterize_svg(&svg, None)?;
    Ok(image::DynamicImage::ImageRgba8(rgba).to_rgb8())
}

pub fn rasterize_svg(svg: &str, font_data: Option<&[u8]>) -> Result<RgbaImage> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
}

pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    let format = image::ImageFormat::from_path(path)
        .map_err(|_| anyhow!("unsupported output image format: {}", path.display()))?;
    image
        .save_with_format(path, format)
        .with_context(|| format!("failed to write image: {}", path.display()))
}

fn svg_open(width: u32, height: u32, image_uri: &str) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = image_uri,
        w = width,
        h = height
    ));
    svg
}

fn png_data_uri(image: &RgbImage) -> Result<String> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode page as PNG")?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(&bytes)))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::HalfEm;

    fn style() -> TextStyle {
        TextStyle {
            color: "#000000".to_string(),
            family: Some("Wild Words".to_string()),
        }
    }

    #[test]
    fn text_block_is_centred_on_anchor() {
        let placed = PlacedText {
            center: (100, 60),
            layout: TextLayout {
                font_size: 20,
                lines: vec!["Tom & Jerry".to_string(), "<run>".to_string()],
            },
        };
        let svg = text_block_svg(&placed, &HalfEm, &style());
        insta::assert_snapshot!(svg, @r##"<text font-size="20" fill="#000000" font-family="Wild Words" text-anchor="middle"><tspan x="100" y="54">Tom &amp; Jerry</tspan><tspan x="100" y="78">&lt;run&gt;</tspan></text>"##);
    }

    #[test]
    fn canvas_without_text_renders_the_erased_page() {
        let image = RgbImage::from_pixel(4, 3, Rgb([9, 9, 9]));
        let mut canvas = Canvas::new(image);
        let mask = RegionMask::from_fn(4, 3, |x, _| x < 2);
        canvas.erase(&mask, Rgb([255, 255, 255])).expect("erase");
        let rendered = render_canvas(&canvas, &HalfEm, &style(), None).expect("render");
        assert_eq!(rendered.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rendered.get_pixel(3, 2), &Rgb([9, 9, 9]));
    }

    #[test]
    fn rasterizes_embedded_page() {
        let image = RgbImage::from_pixel(8, 6, Rgb([200, 10, 10]));
        let mut svg = svg_open(8, 6, &png_data_uri(&image).expect("uri"));
        svg.push_str("</svg>");
        let rgba = rasterize_svg(&svg, None).expect("rasterize");
        assert_eq!(rgba.dimensions(), (8, 6));
        assert_eq!(rgba.get_pixel(4, 3).0[3], 255);
    }

    #[test]
    fn debug_overlay_clamps_detector_boxes() {
        let page = RgbImage::from_pixel(10, 8, Rgb([255, 255, 255]));
        let wild = BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        let outside = BoundingBox::new(50, 50, 60, 60);
        let regions = [
            DebugRegion {
                bbox: &wild,
                inscribed: None,
            },
            DebugRegion {
                bbox: &outside,
                inscribed: None,
            },
        ];
        let overlay = render_debug_overlay(&page, &regions).expect("overlay");
        assert_eq!(overlay.dimensions(), (10, 8));
        assert_ne!(overlay.get_pixel(0, 4), &Rgb([255, 255, 255]));
    }

    #[test]
    fn save_rejects_unknown_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = RgbImage::new(2, 2);
        assert!(save_image(&image, &dir.path().join("page.unknown")).is_err());
        let png = dir.path().join("page.png");
        save_image(&image, &png).expect("save png");
        assert!(png.exists());
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_xml(r#"a<b>"c"&'d'"#), "a&lt;b&gt;&quot;c&quot;&amp;&apos;d&apos;");
    }
}
