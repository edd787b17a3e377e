//! Windowed read/write access to tiled and scanline multi-plane float
//! rasters on disk.
//!
//! A [DiskRaster] binds one file for either reading or writing and
//! reconciles arbitrary caller windows against the fixed on-disk block
//! grid: a 2D grid of fixed-size tiles (window origins must align to the
//! grid) or a sequence of full-width scanline blocks (no alignment
//! constraint). Samples are stored as 32-bit floats whatever the caller's
//! in-memory representation; conversion happens at the [Sample] boundary.
//! Channel identity survives a save/reload cycle even though the
//! container enumerates channels by name rather than in save order.
//!
//! ```no_run
//! use rastore::{DiskRaster, ImageFormat, PixelFormat, PlaneBuffer, Window};
//!
//! # fn main() -> rastore::Result<()> {
//! let format = ImageFormat::new(4096, 4096, 1, PixelFormat::Scalar);
//! let mut writer = DiskRaster::create("terrain.rbs", format)?;
//! let tile = PlaneBuffer::<f32>::zeroed(1, 2048, 2048);
//! writer.write(&tile, Window::new((0, 0), (2048, 2048)))?;
//! writer.close()?;
//!
//! let mut reader = DiskRaster::open("terrain.rbs")?;
//! let mut dest = PlaneBuffer::<f32>::zeroed(1, 2048, 2048);
//! reader.read(&mut dest, Window::new((0, 0), (2048, 2048)))?;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod components;
mod convert;
mod errors;

pub use buffer::PlaneBuffer;
pub use components::{
    container::Attribute,
    format::{ChannelType, ImageFormat, PixelFormat},
    layout::BlockLayout,
    resource::{DiskRaster, DEFAULT_TILE_SIZE},
    window::{BlockSize, Window},
};
pub use convert::Sample;
pub use errors::{RastoreError, Result};
