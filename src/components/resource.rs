//! The disk raster resource: a handle bound for reading or writing plus
//! the windowed read/write orchestration on top of the block streams.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{debug, error, info};

use crate::{
    buffer::PlaneBuffer,
    components::{
        channels::{canonical_order, channel_labels, container_enumeration},
        container::{
            Attribute, BlockSink, BlockSource, ContainerHeader, LineOrder, ScanlineSink,
        },
        format::{ChannelType, ImageFormat, PixelFormat},
        layout::BlockLayout,
        window::{BlockSize, Window},
    },
    convert::Sample,
    errors::{RastoreError, Result},
};

/// Default tile extent of a freshly created resource.
pub const DEFAULT_TILE_SIZE: usize = 2048;

/// Backend stream, tagged by binding direction and storage layout.
#[derive(Debug)]
enum Backend {
    TiledRead(BlockSource),
    ScanlineRead(BlockSource),
    TiledWrite(BlockSink),
    ScanlineWrite(ScanlineSink),
}

/// A disk-backed multi-plane float raster, bound to one file for either
/// reading or writing for its whole lifetime.
///
/// `open` and `create` return fresh bound handles, so a handle can never
/// be rebound; reading through a write-bound handle (and vice versa)
/// fails with a logic error. Not synchronized: callers must serialize
/// access to one handle, the intended deployment being one handle per
/// worker over disjoint windows.
#[derive(Debug)]
pub struct DiskRaster {
    path: PathBuf,
    format: ImageFormat,
    layout: BlockLayout,
    /// Channel name per plane, in plane order.
    labels: Vec<String>,
    /// Plane index -> position in the container's channel enumeration.
    plane_to_slot: Vec<usize>,
    /// Inverse of `plane_to_slot`.
    slot_to_plane: Vec<usize>,
    attributes: BTreeMap<String, Attribute>,
    writes_accepted: usize,
    backend: Backend,
}

fn build_header(
    format: &ImageFormat,
    layout: &BlockLayout,
    labels: &[String],
    line_order: LineOrder,
) -> ContainerHeader {
    let block = layout.block_size(format.cols);
    let mut channels = labels.to_vec();
    channels.sort();
    ContainerHeader {
        tiled: layout.is_tiled(),
        line_order,
        cols: format.cols as u32,
        rows: format.rows as u32,
        block_width: block.width as u32,
        block_height: block.height as u32,
        channels,
    }
}

impl DiskRaster {
    /// Bind a file for reading. The layout is discovered from the
    /// header: a tile descriptor makes the resource tiled, otherwise it
    /// reads scanline blocks. Planes take the multi-plane,
    /// single-channel-per-plane interpretation; combined multi-channel
    /// multi-plane images are not representable in this container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let source = BlockSource::open(&path)
            .map_err(|e| RastoreError::io(format!("could not open {}", path.display()), e))?;
        let header = source.header().clone();
        let layout = if header.tiled {
            BlockLayout::Tiled {
                tile: BlockSize::new(header.block_width as usize, header.block_height as usize),
            }
        } else {
            BlockLayout::Scanline {
                rows_per_block: header.block_height as usize,
            }
        };
        let format = ImageFormat {
            cols: header.cols as usize,
            rows: header.rows as usize,
            planes: header.channels.len(),
            pixel_format: PixelFormat::Scalar,
            channel_type: ChannelType::F32,
        };
        let plane_to_slot = canonical_order(&header.channels);
        let mut slot_to_plane = vec![0usize; plane_to_slot.len()];
        for (plane, &slot) in plane_to_slot.iter().enumerate() {
            slot_to_plane[slot] = plane;
        }
        let labels = plane_to_slot
            .iter()
            .map(|&slot| header.channels[slot].clone())
            .collect();
        let attributes = source.attributes().clone();
        info!("{}: open for reading, {:?}, {:?}", path.display(), format, layout);
        let backend = if header.tiled {
            Backend::TiledRead(source)
        } else {
            Backend::ScanlineRead(source)
        };
        Ok(Self {
            path,
            format,
            layout,
            labels,
            plane_to_slot,
            slot_to_plane,
            attributes,
            writes_accepted: 0,
            backend,
        })
    }

    /// Bind a new file for writing, defaulting to a tiled layout of
    /// [DEFAULT_TILE_SIZE] square blocks in increasing line order.
    ///
    /// The stored sample type is always f32 whatever `format` declares,
    /// and the plane count becomes max(planes, channels of the pixel
    /// format). A format that is both multi-plane and multi-channel is
    /// rejected.
    pub fn create(path: impl AsRef<Path>, format: ImageFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = format.validated_for_create()?;
        let labels = channel_labels(format.pixel_format, format.planes);
        let slot_to_plane = container_enumeration(&labels);
        let mut plane_to_slot = vec![0usize; labels.len()];
        for (slot, &plane) in slot_to_plane.iter().enumerate() {
            plane_to_slot[plane] = slot;
        }
        let layout = BlockLayout::Tiled {
            tile: BlockSize::new(DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE),
        };
        let header = build_header(&format, &layout, &labels, LineOrder::Increasing);
        let sink = BlockSink::create(&path, &header)
            .map_err(|e| RastoreError::io(format!("failed to create {}", path.display()), e))?;
        info!("{}: open for writing, {:?}, {:?}", path.display(), format, layout);
        Ok(Self {
            path,
            format,
            layout,
            labels,
            plane_to_slot,
            slot_to_plane,
            attributes: BTreeMap::new(),
            writes_accepted: 0,
            backend: Backend::TiledWrite(sink),
        })
    }

    /// Switch the write side to a tiled layout, discarding the backend
    /// stream and recreating it with a fresh header. With `random_order`
    /// the backend accepts tiles in any submission order without
    /// buffering them for reordering; otherwise out-of-order tiles are
    /// held in memory until their turn.
    ///
    /// Rejected once any block write has been accepted.
    pub fn set_tiled_write(
        &mut self,
        tile_width: usize,
        tile_height: usize,
        random_order: bool,
    ) -> Result<()> {
        self.require_reconfigurable()?;
        if tile_width == 0 || tile_height == 0 {
            return Err(RastoreError::ZeroBlock(BlockSize::new(tile_width, tile_height)));
        }
        self.layout = BlockLayout::Tiled {
            tile: BlockSize::new(tile_width, tile_height),
        };
        let line_order = if random_order {
            LineOrder::Random
        } else {
            LineOrder::Increasing
        };
        self.backend = Backend::TiledWrite(self.rebuild_sink(line_order)?);
        info!(
            "{}: tiled write layout {}x{}, {:?}",
            self.path.display(),
            tile_width,
            tile_height,
            line_order
        );
        Ok(())
    }

    /// Switch the write side to scanline blocks of `rows_per_block`
    /// full-width rows, in increasing line order. Same contract as
    /// [set_tiled_write](Self::set_tiled_write).
    pub fn set_scanline_write(&mut self, rows_per_block: usize) -> Result<()> {
        self.require_reconfigurable()?;
        if rows_per_block == 0 {
            return Err(RastoreError::ZeroBlock(BlockSize::new(self.format.cols, 0)));
        }
        self.layout = BlockLayout::Scanline { rows_per_block };
        let sink = self.rebuild_sink(LineOrder::Increasing)?;
        self.backend = Backend::ScanlineWrite(ScanlineSink::new(
            sink,
            self.format.cols,
            self.format.rows,
            self.format.planes,
            rows_per_block,
        ));
        info!(
            "{}: scanline write layout, {} rows per block",
            self.path.display(),
            rows_per_block
        );
        Ok(())
    }

    fn require_reconfigurable(&self) -> Result<()> {
        match self.backend {
            Backend::TiledWrite(_) | Backend::ScanlineWrite(_) => {
                if self.writes_accepted > 0 {
                    Err(RastoreError::LayoutFrozen(self.writes_accepted))
                } else {
                    Ok(())
                }
            }
            _ => Err(RastoreError::NotBound("writing")),
        }
    }

    fn rebuild_sink(&self, line_order: LineOrder) -> Result<BlockSink> {
        let header = build_header(&self.format, &self.layout, &self.labels, line_order);
        BlockSink::create(&self.path, &header).map_err(|e| {
            RastoreError::io(format!("failed to create {}", self.path.display()), e)
        })
    }

    /// Read `window` into `dest`, converting the stored f32 samples into
    /// the caller's representation.
    ///
    /// `dest` must be shaped `[planes, window.height(), window.width()]`.
    /// On a tiled layout the window origin must fall on the tile grid.
    /// Scanline reads clamp at the image bottom; rows past it are left
    /// zero, as are blocks that were never written.
    pub fn read<T: Sample>(&mut self, dest: &mut PlaneBuffer<T>, window: Window) -> Result<()> {
        let ImageFormat {
            cols, rows, planes, ..
        } = self.format;
        if !matches!(
            self.backend,
            Backend::TiledRead(_) | Backend::ScanlineRead(_)
        ) {
            return Err(RastoreError::NotBound("reading"));
        }
        let expected = [planes, window.height(), window.width()];
        if dest.shape() != expected {
            return Err(RastoreError::ShapeMismatch {
                expected,
                actual: dest.shape(),
            });
        }
        if window.area() == 0 {
            return Ok(());
        }
        self.layout.check_origin(&window)?;
        let tiled = self.layout.is_tiled();
        if window.max().0 > cols || window.min().1 >= rows || (tiled && window.max().1 > rows) {
            return Err(RastoreError::OutOfBounds { window, cols, rows });
        }
        debug!("{}: reading {:?}", self.path.display(), window);
        let clipped = Window::new(
            window.min(),
            (window.width(), window.height().min(rows - window.min().1)),
        );
        let grid = self.layout.grid(cols, rows);
        let area = window.area();
        let mut staging = vec![0f32; planes * area];
        let source = match &mut self.backend {
            Backend::TiledRead(source) | Backend::ScanlineRead(source) => source,
            _ => return Err(RastoreError::NotBound("reading")),
        };
        for (bx, by) in grid.coverage(&clipped) {
            let block_win = grid.block_window((bx, by));
            let len = planes * block_win.area();
            let payload = source
                .read_block(grid.linear((bx, by)), len)
                .map_err(|e| {
                    RastoreError::io(
                        format!(
                            "failed to decode block ({bx},{by}) of {}",
                            self.path.display()
                        ),
                        e,
                    )
                })?;
            let Some(payload) = payload else { continue };
            let Some(isect) = block_win.intersect(&clipped) else {
                continue;
            };
            let width = isect.width();
            for plane in 0..planes {
                let slot = self.plane_to_slot[plane];
                for y in isect.min().1..isect.max().1 {
                    let src = slot * block_win.area()
                        + (y - block_win.min().1) * block_win.width()
                        + (isect.min().0 - block_win.min().0);
                    let dst = plane * area
                        + (y - window.min().1) * window.width()
                        + (isect.min().0 - window.min().0);
                    staging[dst..dst + width].copy_from_slice(&payload[src..src + width]);
                }
            }
        }
        for (out, value) in dest.as_mut_slice().iter_mut().zip(staging) {
            *out = T::from_f32(value);
        }
        Ok(())
    }

    /// Write `src` into `window`, converting the caller's representation
    /// into stored f32 samples.
    ///
    /// `src` must be shaped `[planes, window.height(), window.width()]`.
    /// On a tiled layout the window must start on the tile grid and cover
    /// whole (boundary-clipped) tiles; scanline windows carry no
    /// alignment constraint. Writes are not transactional: a failure may
    /// leave earlier blocks flushed to disk.
    pub fn write<T: Sample>(&mut self, src: &PlaneBuffer<T>, window: Window) -> Result<()> {
        let ImageFormat {
            cols, rows, planes, ..
        } = self.format;
        if !matches!(
            self.backend,
            Backend::TiledWrite(_) | Backend::ScanlineWrite(_)
        ) {
            return Err(RastoreError::NotBound("writing"));
        }
        let expected = [planes, window.height(), window.width()];
        if src.shape() != expected {
            return Err(RastoreError::ShapeMismatch {
                expected,
                actual: src.shape(),
            });
        }
        if window.area() == 0 {
            return Ok(());
        }
        if !window.fits(cols, rows) {
            return Err(RastoreError::OutOfBounds { window, cols, rows });
        }
        self.layout.check_write_window(&window, cols, rows)?;
        debug!("{}: writing {:?}", self.path.display(), window);
        // convert into container channel order
        let area = window.area();
        let mut staging = vec![0f32; planes * area];
        for slot in 0..planes {
            let plane = src.plane(self.slot_to_plane[slot])?;
            for (out, sample) in staging[slot * area..][..area].iter_mut().zip(plane) {
                *out = sample.to_f32();
            }
        }
        let grid = self.layout.grid(cols, rows);
        match &mut self.backend {
            Backend::TiledWrite(sink) => {
                for (bx, by) in grid.coverage(&window) {
                    // an aligned window covers whole clipped tiles, so the
                    // block rect sits entirely inside it
                    let block_win = grid.block_window((bx, by));
                    let width = block_win.width();
                    let mut payload = vec![0f32; planes * block_win.area()];
                    for slot in 0..planes {
                        for y in block_win.min().1..block_win.max().1 {
                            let dst = slot * block_win.area() + (y - block_win.min().1) * width;
                            let src_off = slot * area
                                + (y - window.min().1) * window.width()
                                + (block_win.min().0 - window.min().0);
                            payload[dst..dst + width]
                                .copy_from_slice(&staging[src_off..src_off + width]);
                        }
                    }
                    sink.put_block(grid.linear((bx, by)), payload).map_err(|e| {
                        RastoreError::io(
                            format!(
                                "failed to encode block ({bx},{by}) of {}",
                                self.path.display()
                            ),
                            e,
                        )
                    })?;
                }
            }
            Backend::ScanlineWrite(sink) => {
                sink.put_rows(window.min(), (window.width(), window.height()), &staging)
                    .map_err(|e| {
                        RastoreError::io(
                            format!("failed to encode scanlines of {}", self.path.display()),
                            e,
                        )
                    })?;
            }
            _ => return Err(RastoreError::NotBound("writing")),
        }
        self.writes_accepted += 1;
        Ok(())
    }

    /// The currently effective block size: tile extent on a tiled
    /// layout, (image width, rows per block) on a scanline layout.
    /// Callers use this to pick windows that satisfy tiled alignment.
    pub fn native_block_size(&self) -> BlockSize {
        self.layout.block_size(self.format.cols)
    }

    pub fn format(&self) -> &ImageFormat {
        &self.format
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On-disk channel name of a plane.
    pub fn channel_name(&self, plane: usize) -> Result<&str> {
        self.labels
            .get(plane)
            .map(String::as_str)
            .ok_or(RastoreError::BadPlane {
                index: plane,
                planes: self.labels.len(),
            })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Attribute> {
        &self.attributes
    }

    /// Attach a named attribute to the header. Write-bound handles only;
    /// attributes land in the container when the resource is flushed.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Attribute) -> Result<()> {
        match self.backend {
            Backend::TiledWrite(_) | Backend::ScanlineWrite(_) => {
                self.attributes.insert(name.into(), value);
                Ok(())
            }
            _ => Err(RastoreError::NotBound("writing")),
        }
    }

    fn flush_backend(&mut self) -> Result<()> {
        let context = format!("failed to flush {}", self.path.display());
        match &mut self.backend {
            Backend::TiledWrite(sink) => sink
                .finish(&self.attributes)
                .map_err(|e| RastoreError::io(context, e)),
            Backend::ScanlineWrite(sink) => sink
                .finish(&self.attributes)
                .map_err(|e| RastoreError::io(context, e)),
            _ => Ok(()),
        }
    }

    /// Consume the handle, flushing buffered blocks and finalizing the
    /// container. Dropping does the same but can only log a failure.
    pub fn close(mut self) -> Result<()> {
        self.flush_backend()
    }
}

impl Drop for DiskRaster {
    fn drop(&mut self) {
        if let Err(e) = self.flush_backend() {
            error!("{}: flush on drop failed: {e}", self.path.display());
        }
    }
}
