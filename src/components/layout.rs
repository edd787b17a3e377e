//! Block layout policy: how an arbitrary caller window maps onto the
//! fixed on-disk block grid.

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::{
    components::window::{BlockSize, Window},
    errors::{RastoreError, Result},
};

/// Storage layout of the payload section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockLayout {
    /// 2D grid of fixed-size tiles. Window origins must align to the grid.
    Tiled { tile: BlockSize },
    /// Horizontal strips of full image-width rows. No alignment constraint.
    Scanline { rows_per_block: usize },
}

impl BlockLayout {
    pub fn is_tiled(&self) -> bool {
        matches!(self, BlockLayout::Tiled { .. })
    }

    /// Effective block extent for an image `cols` pixels wide.
    pub fn block_size(&self, cols: usize) -> BlockSize {
        match *self {
            BlockLayout::Tiled { tile } => tile,
            BlockLayout::Scanline { rows_per_block } => BlockSize::new(cols, rows_per_block),
        }
    }

    pub(crate) fn grid(&self, cols: usize, rows: usize) -> BlockGrid {
        BlockGrid {
            block: self.block_size(cols),
            cols,
            rows,
        }
    }

    /// Alignment constraint shared by both read and write: on a tiled
    /// layout the window origin must fall on the block grid.
    pub(crate) fn check_origin(&self, window: &Window) -> Result<()> {
        if let BlockLayout::Tiled { tile } = *self {
            if !tile.is_aligned(window.min()) {
                return Err(RastoreError::Unaligned(*window, tile));
            }
        }
        Ok(())
    }

    /// Write-side constraint: an aligned tiled window must correspond to
    /// exactly the tile range it covers, so each axis of its max corner
    /// has to be block-aligned or flush with the image boundary. Partial
    /// tiles are never produced by this layer.
    pub(crate) fn check_write_window(
        &self,
        window: &Window,
        cols: usize,
        rows: usize,
    ) -> Result<()> {
        self.check_origin(window)?;
        if let BlockLayout::Tiled { tile } = *self {
            let (mx, my) = window.max();
            if (mx % tile.width != 0 && mx != cols) || (my % tile.height != 0 && my != rows) {
                return Err(RastoreError::RaggedWindow(*window, tile));
            }
        }
        Ok(())
    }
}

/// Geometry of the block grid covering one image.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BlockGrid {
    block: BlockSize,
    cols: usize,
    rows: usize,
}

impl BlockGrid {
    pub fn blocks_x(&self) -> usize {
        self.cols.div_ceil(self.block.width)
    }

    pub fn blocks_y(&self) -> usize {
        self.rows.div_ceil(self.block.height)
    }

    pub fn len(&self) -> usize {
        self.blocks_x() * self.blocks_y()
    }

    /// Row-major linear index of a block.
    pub fn linear(&self, (bx, by): (usize, usize)) -> usize {
        by * self.blocks_x() + bx
    }

    /// Pixel rect of a block, clipped to the image extent at the right
    /// and bottom edges.
    pub fn block_window(&self, (bx, by): (usize, usize)) -> Window {
        let x0 = bx * self.block.width;
        let y0 = by * self.block.height;
        Window::new(
            (x0, y0),
            (
                self.block.width.min(self.cols - x0),
                self.block.height.min(self.rows - y0),
            ),
        )
    }

    /// Inclusive block-index range covering `window`, iterated row-major.
    /// The window must be non-degenerate.
    pub fn coverage(&self, window: &Window) -> impl Iterator<Item = (usize, usize)> {
        let first = (
            window.min().0 / self.block.width,
            window.min().1 / self.block.height,
        );
        let last = (
            (window.max().0 - 1) / self.block.width,
            (window.max().1 - 1) / self.block.height,
        );
        iproduct!(first.1..=last.1, first.0..=last.0).map(|(by, bx)| (bx, by))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiled(width: usize, height: usize) -> BlockLayout {
        BlockLayout::Tiled {
            tile: BlockSize::new(width, height),
        }
    }

    #[test]
    fn scanline_block_spans_full_width() {
        let layout = BlockLayout::Scanline { rows_per_block: 32 };
        assert_eq!(layout.block_size(1000), BlockSize::new(1000, 32));
    }

    #[test]
    fn tiled_origin_must_align() {
        let layout = tiled(512, 512);
        let aligned = Window::new((512, 1024), (512, 512));
        assert!(layout.check_origin(&aligned).is_ok());
        let unaligned = Window::new((100, 100), (2048, 2048));
        assert!(matches!(
            layout.check_origin(&unaligned),
            Err(RastoreError::Unaligned(..))
        ));
    }

    #[test]
    fn scanline_never_constrains_origin() {
        let layout = BlockLayout::Scanline { rows_per_block: 16 };
        assert!(layout.check_origin(&Window::new((7, 13), (100, 5))).is_ok());
    }

    #[test]
    fn write_window_must_cover_whole_tiles() {
        let layout = tiled(512, 512);
        // exact tiles
        assert!(layout
            .check_write_window(&Window::new((0, 0), (1024, 512)), 2000, 2000)
            .is_ok());
        // clipped at the image boundary
        assert!(layout
            .check_write_window(&Window::new((1536, 1536), (464, 464)), 2000, 2000)
            .is_ok());
        // ragged interior max corner
        assert!(matches!(
            layout.check_write_window(&Window::new((0, 0), (1000, 512)), 2000, 2000),
            Err(RastoreError::RaggedWindow(..))
        ));
    }

    #[test]
    fn coverage_is_inclusive_of_the_last_touched_block() {
        let grid = tiled(256, 256).grid(1000, 700);
        assert_eq!(grid.blocks_x(), 4);
        assert_eq!(grid.blocks_y(), 3);
        assert_eq!(grid.len(), 12);
        let covered: Vec<_> = grid.coverage(&Window::new((0, 0), (512, 300))).collect();
        assert_eq!(covered, [(0, 0), (1, 0), (0, 1), (1, 1)]);
        let single: Vec<_> = grid.coverage(&Window::new((256, 256), (256, 256))).collect();
        assert_eq!(single, [(1, 1)]);
    }

    #[test]
    fn edge_blocks_are_clipped() {
        let grid = tiled(256, 256).grid(1000, 700);
        assert_eq!(
            grid.block_window((3, 2)),
            Window::new((768, 512), (232, 188))
        );
        assert_eq!(grid.block_window((0, 0)), Window::new((0, 0), (256, 256)));
    }

    #[test]
    fn linear_index_is_row_major() {
        let grid = tiled(256, 256).grid(1000, 700);
        assert_eq!(grid.linear((0, 0)), 0);
        assert_eq!(grid.linear((3, 0)), 3);
        assert_eq!(grid.linear((0, 1)), 4);
        assert_eq!(grid.linear((3, 2)), 11);
    }
}
