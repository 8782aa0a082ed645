use anyhow::{Result, anyhow};
use image::GrayImage;
use serde::Serialize;

/// Axis-aligned detector box in image coordinates, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clamps the box to a `width`x`height` image and returns `(x, y, w, h)`,
    /// or `None` when nothing of it remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.clamp(0, width as i32);
        let y1 = self.y1.clamp(0, height as i32);
        let x2 = self.x2.clamp(0, width as i32);
        let y2 = self.y2.clamp(0, height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((
            x1 as u32,
            y1 as u32,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl RegionMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_cells(width: u32, height: u32, cells: Vec<bool>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if cells.len() != expected {
            return Err(anyhow!(
                "mask has {} cells, expected {} for {}x{}",
                cells.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Any non-zero pixel belongs to the region.
    pub fn from_luma(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            cells: image.pixels().map(|pixel| pixel[0] > 0).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.cells[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.index(x, y);
        self.cells[idx] = value;
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|cell| **cell).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|cell| *cell)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InscribedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl InscribedRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Integer centre, rounded towards the top-left.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Largest axis-aligned rectangle made only of `true` cells.
///
/// Scans rows top to bottom, keeping per-column run heights, and solves the
/// largest-rectangle-in-histogram problem for every row with a monotonic
/// stack. Ties keep the first rectangle found in that scan order. Returns
/// `None` when the mask has no `true` cell.
pub fn largest_inscribed_rectangle(mask: &RegionMask) -> Option<InscribedRect> {
    let (width, height) = mask.dimensions();
    let cols = width as usize;
    let mut heights = vec![0u32; cols];
    let mut stack: Vec<usize> = Vec::with_capacity(cols + 1);
    let mut best: Option<InscribedRect> = None;
    let mut best_area = 0u64;

    for y in 0..height {
        for (x, run) in heights.iter_mut().enumerate() {
            *run = if mask.get(x as u32, y) { *run + 1 } else { 0 };
        }

        stack.clear();
        for col in 0..=cols {
            let current = if col < cols { heights[col] } else { 0 };
            while let Some(&top) = stack.last() {
                if heights[top] < current {
                    break;
                }
                stack.pop();
                let bar = heights[top];
                let left = stack.last().map(|idx| idx + 1).unwrap_or(0);
                let span = (col - left) as u32;
                let area = bar as u64 * span as u64;
                if area > best_area {
                    best_area = area;
                    best = Some(InscribedRect {
                        x: left as u32,
                        y: y + 1 - bar,
                        width: span,
                        height: bar,
                    });
                }
            }
            stack.push(col);
        }
    }

    best
}
