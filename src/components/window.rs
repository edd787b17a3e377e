use serde::{Deserialize, Serialize};

/// Pixel window of a single read or write call.
///
/// Axis aligned, inclusive `min`, exclusive `max`, in image pixel
/// coordinates with the origin at the top left pixel. Built from
/// `offset` (top left corner) and `shape` `(width, height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    min: (usize, usize),
    max: (usize, usize),
}

impl Window {
    pub fn new(offset: (usize, usize), shape: (usize, usize)) -> Self {
        Self {
            min: offset,
            max: (offset.0 + shape.0, offset.1 + shape.1),
        }
    }

    pub fn min(&self) -> (usize, usize) {
        self.min
    }

    pub fn max(&self) -> (usize, usize) {
        self.max
    }

    pub fn width(&self) -> usize {
        self.max.0 - self.min.0
    }

    pub fn height(&self) -> usize {
        self.max.1 - self.min.1
    }

    /// Pixel area of the window.
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn fits(&self, cols: usize, rows: usize) -> bool {
        self.max.0 <= cols && self.max.1 <= rows
    }

    pub(crate) fn intersect(&self, other: &Window) -> Option<Window> {
        let min = (self.min.0.max(other.min.0), self.min.1.max(other.min.1));
        let max = (self.max.0.min(other.max.0), self.max.1.min(other.max.1));
        (min.0 < max.0 && min.1 < max.1).then_some(Window { min, max })
    }
}

/// 2D block extent: the tile size of a tiled layout, or
/// (image width, rows per block) of a scanline layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSize {
    pub width: usize,
    pub height: usize,
}

impl BlockSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// True if `origin` falls on the block grid in both axes.
    pub fn is_aligned(&self, origin: (usize, usize)) -> bool {
        origin.0 % self.width == 0 && origin.1 % self.height == 0
    }
}
