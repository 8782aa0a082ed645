use anyhow::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use manga_translator_rust::layout::LineMetrics;
use manga_translator_rust::render::{TextStyle, render_canvas};
use manga_translator_rust::segmentation::DetectionFile;
use manga_translator_rust::translators::TranslateFuture;
use manga_translator_rust::{
    CompositeOptions, Compositor, LayoutOptions, RegionDetector, RegionMask, RegionStatus,
    TextMeasure, TextRecognizer, TextTranslator, largest_inscribed_rectangle, layout_text,
};

const INK: Rgb<u8> = Rgb([20, 20, 20]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

struct Monospace;

impl TextMeasure for Monospace {
    fn line_width(&self, text: &str, font_size: u32) -> f32 {
        text.chars().count() as f32 * font_size as f32 * 0.6
    }

    fn line_metrics(&self, font_size: u32) -> LineMetrics {
        LineMetrics {
            ascent: font_size as f32 * 0.8,
            height: font_size as f32 * 1.2,
        }
    }
}

struct Canned(&'static str);

impl TextRecognizer for Canned {
    fn recognize(&self, _crop: &RgbImage) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct Uppercase;

impl TextTranslator for Uppercase {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move { Ok(Some(format!("{} AND THEN SOME", text.to_uppercase()))) })
    }
}

fn ellipse(cx: f32, cy: f32, rx: f32, ry: f32) -> impl Fn(u32, u32) -> bool {
    move |x, y| {
        let dx = (x as f32 + 0.5 - cx) / rx;
        let dy = (y as f32 + 0.5 - cy) / ry;
        dx * dx + dy * dy <= 1.0
    }
}

#[tokio::test]
async fn bubble_from_detection_file_is_erased_and_filled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let inside = ellipse(150.0, 100.0, 120.0, 80.0);
    let mut mask = GrayImage::new(300, 200);
    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if inside(x, y) {
            *pixel = Luma([255]);
        }
    }
    mask.save(dir.path().join("bubble.png")).expect("save mask");
    let doc = dir.path().join("page.json");
    std::fs::write(
        &doc,
        r#"{"width":300,"height":200,"regions":[
            {"bbox":[30,20,270,180],"score":0.98,"mask":"bubble.png"},
            {"bbox":[0,0,5,5],"score":0.40,"mask":"bubble.png"}
        ]}"#,
    )
    .expect("write doc");

    let page = RgbImage::from_pixel(300, 200, INK);
    let regions = DetectionFile::new(&doc, 0.9).predict(&page).expect("predict");
    assert_eq!(regions.len(), 1);

    let recognizer = Canned("hey");
    let compositor = Compositor::new(
        &recognizer,
        &Uppercase,
        &Monospace,
        CompositeOptions::default(),
    );
    let composite = compositor
        .translate_image(page, &regions)
        .await
        .expect("composite");

    let report = &composite.reports[0];
    let rect = report.inscribed.expect("inscribed rectangle");
    let RegionStatus::Rendered { font_size, lines } = &report.status else {
        panic!("region not rendered: {:?}", report.status);
    };
    assert!(lines.len() > 1);
    let widest = lines
        .iter()
        .map(|line| Monospace.line_width(line, *font_size))
        .fold(0.0f32, f32::max);
    assert!(widest < (rect.width as f32 * 0.9).floor());

    let image = composite.canvas.image();
    for y in 0..200 {
        for x in 0..300 {
            let expected = if inside(x, y) { WHITE } else { INK };
            assert_eq!(image.get_pixel(x, y), &expected, "pixel ({}, {})", x, y);
        }
    }
    assert_eq!(composite.canvas.texts()[0].center, rect.center());
}

#[test]
fn inscribed_rectangle_bounds_the_layout() {
    let inside = ellipse(100.0, 100.0, 90.0, 60.0);
    let mask = RegionMask::from_fn(200, 200, &inside);
    let rect = largest_inscribed_rectangle(&mask).expect("rectangle");
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            assert!(mask.get(x, y));
        }
    }

    let layout = layout_text(
        "a fairly long line of translated dialogue",
        rect.width as f32,
        rect.height as f32,
        &Monospace,
        &LayoutOptions::default(),
    )
    .expect("layout")
    .expect("words");
    let block = Monospace.block_bounds(&layout.lines, layout.font_size, (0.0, 0.0));
    assert!(block.height() < rect.height as f32);
}

#[tokio::test]
async fn page_without_text_renders_unchanged() {
    let page = RgbImage::from_pixel(40, 30, INK);
    let recognizer = Canned("");
    let compositor = Compositor::new(
        &recognizer,
        &Uppercase,
        &Monospace,
        CompositeOptions::default(),
    );
    let composite = compositor
        .translate_image(page.clone(), &[])
        .await
        .expect("composite");
    let style = TextStyle {
        color: "#000000".to_string(),
        family: None,
    };
    let rendered = render_canvas(&composite.canvas, &Monospace, &style, None).expect("render");
    assert_eq!(rendered, page);
}
