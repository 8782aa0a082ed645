use serde::Serialize;
use thiserror::Error;

pub const INITIAL_FONT_SIZE: u32 = 200;
pub const FONT_SIZE_STEP: u32 = 2;
pub const MIN_FONT_SIZE: u32 = 6;

pub const LINE_SPACING: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    /// Baseline offset from the top of a line.
    pub ascent: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockBounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BlockBounds {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

pub trait TextMeasure {
    fn line_width(&self, text: &str, font_size: u32) -> f32;

    fn line_metrics(&self, font_size: u32) -> LineMetrics;

    /// Bounds of `lines` stacked with [`LINE_SPACING`] and centred on `anchor`.
    fn block_bounds(&self, lines: &[String], font_size: u32, anchor: (f32, f32)) -> BlockBounds {
        let metrics = self.line_metrics(font_size);
        let count = lines.len().max(1) as f32;
        let height = count * metrics.height + (count - 1.0) * LINE_SPACING;
        let width = lines
            .iter()
            .map(|line| self.line_width(line, font_size))
            .fold(0.0, f32::max);
        BlockBounds {
            left: anchor.0 - width / 2.0,
            top: anchor.1 - height / 2.0,
            right: anchor.0 + width / 2.0,
            bottom: anchor.1 + height / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutOptions {
    pub initial_font_size: u32,
    pub font_size_step: u32,
    pub min_font_size: u32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            initial_font_size: INITIAL_FONT_SIZE,
            font_size_step: FONT_SIZE_STEP,
            min_font_size: MIN_FONT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextLayout {
    pub font_size: u32,
    pub lines: Vec<String>,
}

impl TextLayout {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("text does not fit {width}x{height} at any font size down to {floor}")]
    NoFit { floor: u32, width: f32, height: f32 },
}

/// Splits on every whitespace character and hyphen; separators are dropped.
pub fn split_words(text: &str) -> Vec<&str> {
    text.split(|ch: char| ch.is_whitespace() || ch == '-')
        .filter(|word| !word.is_empty())
        .collect()
}

/// Finds the largest font size whose greedy wrap of `text` keeps every line
/// narrower than `target_width` and the whole block shorter than
/// `target_height`.
///
/// The font size only ever decreases. A single word that is too wide at the
/// current size shrinks it in place before packing continues, and that
/// smaller size carries into the rest of the pass and into later passes.
/// Returns `Ok(None)` when `text` has no words.
pub fn layout_text<M: TextMeasure + ?Sized>(
    text: &str,
    target_width: f32,
    target_height: f32,
    measure: &M,
    options: &LayoutOptions,
) -> Result<Option<TextLayout>, LayoutError> {
    let words = split_words(text);
    if words.is_empty() {
        return Ok(None);
    }

    let no_fit = || LayoutError::NoFit {
        floor: options.min_font_size,
        width: target_width,
        height: target_height,
    };
    let step_down = |size: u32| {
        let next = size.saturating_sub(options.font_size_step.max(1));
        if next < options.min_font_size.max(1) {
            Err(no_fit())
        } else {
            Ok(next)
        }
    };

    let mut font_size = options.initial_font_size;
    loop {
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in &words {
            while measure.line_width(word, font_size) >= target_width {
                font_size = step_down(font_size)?;
            }
            let candidate = if current.is_empty() {
                (*word).to_string()
            } else {
                format!("{} {}", current, word)
            };
            if measure.line_width(&candidate, font_size) < target_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, (*word).to_string()));
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }

        let bounds = measure.block_bounds(&lines, font_size, (0.0, 0.0));
        if bounds.height() < target_height {
            return Ok(Some(TextLayout { font_size, lines }));
        }
        font_size = step_down(font_size)?;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Every glyph is half an em wide; lines are one em tall.
    pub(crate) struct HalfEm;

    impl TextMeasure for HalfEm {
        fn line_width(&self, text: &str, font_size: u32) -> f32 {
            text.chars().count() as f32 * font_size as f32 * 0.5
        }

        fn line_metrics(&self, font_size: u32) -> LineMetrics {
            LineMetrics {
                ascent: font_size as f32 * 0.8,
                height: font_size as f32,
            }
        }
    }

    fn layout(text: &str, width: f32, height: f32) -> Result<Option<TextLayout>, LayoutError> {
        layout_text(text, width, height, &HalfEm, &LayoutOptions::default())
    }

    #[test]
    fn short_text_stays_on_one_line_at_initial_size() {
        let result = layout("Hello World", 2000.0, 500.0).unwrap().unwrap();
        assert_eq!(result.font_size, INITIAL_FONT_SIZE);
        assert_eq!(result.lines, vec!["Hello World".to_string()]);
    }

    #[test]
    fn empty_text_has_no_layout() {
        assert_eq!(layout("", 500.0, 500.0), Ok(None));
        assert_eq!(layout("  - \n", 500.0, 500.0), Ok(None));
    }

    #[test]
    fn wraps_greedily_at_initial_size() {
        let text = "the quick brown fox jumps over the lazy dog";
        let result = layout(text, 1000.0, 1100.0).unwrap().unwrap();
        assert_eq!(result.font_size, 200);
        insta::assert_snapshot!(result.text(), @r"
        the quick
        brown fox
        jumps
        over the
        lazy dog
        ");
    }

    #[test]
    fn height_bound_forces_smaller_size_and_repack() {
        let text = "the quick brown fox jumps over the lazy dog";
        let result = layout(text, 1000.0, 1000.0).unwrap().unwrap();
        assert_eq!(result.font_size, 196);
        assert_eq!(
            result.lines,
            vec!["the quick", "brown fox", "jumps over", "the lazy", "dog"]
        );
    }

    #[test]
    fn long_word_shrinks_size_before_packing() {
        let result = layout("Supercalifragilistic", 500.0, 1000.0)
            .unwrap()
            .unwrap();
        assert_eq!(result.font_size, 48);
        assert_eq!(result.lines, vec!["Supercalifragilistic".to_string()]);
    }

    #[test]
    fn word_shrink_carries_over_to_following_words() {
        let result = layout("hi Supercalifragilistic ok", 500.0, 1000.0)
            .unwrap()
            .unwrap();
        assert_eq!(result.font_size, 48);
        assert_eq!(result.lines, vec!["hi", "Supercalifragilistic", "ok"]);
    }

    #[test]
    fn hyphens_and_runs_of_whitespace_split_words() {
        assert_eq!(
            split_words("well-known  fact\tthere"),
            vec!["well", "known", "fact", "there"]
        );
        let result = layout("well-known", 2000.0, 500.0).unwrap().unwrap();
        assert_eq!(result.lines, vec!["well known".to_string()]);
    }

    #[test]
    fn result_respects_both_bounds() {
        let text = "Why would anyone leave the door open on a night like this";
        let (width, height) = (320.0, 260.0);
        let result = layout(text, width, height).unwrap().unwrap();
        for line in &result.lines {
            assert!(HalfEm.line_width(line, result.font_size) < width);
        }
        let bounds = HalfEm.block_bounds(&result.lines, result.font_size, (0.0, 0.0));
        assert!(bounds.height() < height);
        assert_eq!(result.lines.join(" "), split_words(text).join(" "));
    }

    #[test]
    fn reports_no_fit_at_floor() {
        let err = layout("Hello World", 2000.0, 5.0).unwrap_err();
        assert_eq!(
            err,
            LayoutError::NoFit {
                floor: MIN_FONT_SIZE,
                width: 2000.0,
                height: 5.0
            }
        );
    }

    #[test]
    fn zero_width_never_fits() {
        assert!(layout("a", 0.0, 500.0).is_err());
    }

    #[test]
    fn custom_options_bound_the_search() {
        let options = LayoutOptions {
            initial_font_size: 40,
            font_size_step: 5,
            min_font_size: 20,
        };
        let result = layout_text("abcdef", 100.0, 500.0, &HalfEm, &options)
            .unwrap()
            .unwrap();
        assert_eq!(result.font_size, 30);
        let err = layout_text("abcdefghijkl", 100.0, 500.0, &HalfEm, &options).unwrap_err();
        assert!(matches!(err, LayoutError::NoFit { floor: 20, .. }));
    }

    #[test]
    fn block_bounds_are_centred_on_anchor() {
        let lines = vec!["abcd".to_string(), "ab".to_string()];
        let bounds = HalfEm.block_bounds(&lines, 10, (50.0, 40.0));
        assert_eq!(bounds.width(), 20.0);
        assert_eq!(bounds.height(), 24.0);
        assert_eq!((bounds.left, bounds.top), (40.0, 28.0));
    }

    #[test]
    fn identical_inputs_give_identical_layouts() {
        let text = "Don't you dare run away from me again";
        assert_eq!(layout(text, 410.0, 300.0), layout(text, 410.0, 300.0));
    }
}
