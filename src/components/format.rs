use serde::{Deserialize, Serialize};

use crate::errors::{RastoreError, Result};

/// Semantic interpretation of the channels within one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Scalar,
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl PixelFormat {
    /// Channel count implied by the pixel format.
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Scalar | PixelFormat::Gray => 1,
            PixelFormat::GrayAlpha => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Sample type of the stored data. The container always stores 32-bit
/// floats; narrower or wider caller representations are converted at the
/// [Sample](crate::Sample) boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    F32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFormat {
    pub cols: usize,
    pub rows: usize,
    pub planes: usize,
    pub pixel_format: PixelFormat,
    pub channel_type: ChannelType,
}

impl ImageFormat {
    pub fn new(cols: usize, rows: usize, planes: usize, pixel_format: PixelFormat) -> Self {
        Self {
            cols,
            rows,
            planes,
            pixel_format,
            channel_type: ChannelType::F32,
        }
    }

    /// The larger of the declared plane count and the channel count
    /// implied by the pixel format.
    pub fn effective_planes(&self) -> usize {
        self.planes.max(self.pixel_format.channels()).max(1)
    }

    /// Normalize a caller-supplied format for creation: plane-encoded and
    /// channel-encoded multiplicity are mutually exclusive, the plane
    /// count becomes effective, and the sample type is forced to f32.
    pub(crate) fn validated_for_create(mut self) -> Result<Self> {
        if self.cols == 0 || self.rows == 0 {
            return Err(RastoreError::EmptyImage(self.cols, self.rows));
        }
        if self.planes > 1 && self.pixel_format.channels() > 1 {
            return Err(RastoreError::PlaneChannelConflict);
        }
        self.planes = self.effective_planes();
        self.channel_type = ChannelType::F32;
        Ok(self)
    }
}
