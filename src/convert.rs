//! Sample conversion at the resource boundary.
//!
//! The container stores 32-bit floats regardless of the caller's pixel
//! representation; conversion is stateless and knows nothing about block
//! layout. Integer samples use full-range normalization.

use std::fmt::Debug;

use num_traits::Zero;

pub trait Sample: Copy + Zero + PartialEq + Debug + Send + Sync + 'static {
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl Sample for f32 {
    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}

impl Sample for f64 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        f64::from(value)
    }
}

impl Sample for u8 {
    fn to_f32(self) -> f32 {
        f32::from(self) / f32::from(u8::MAX)
    }

    fn from_f32(value: f32) -> Self {
        (value.clamp(0.0, 1.0) * f32::from(u8::MAX)).round() as u8
    }
}

impl Sample for u16 {
    fn to_f32(self) -> f32 {
        f32::from(self) / f32::from(u16::MAX)
    }

    fn from_f32(value: f32) -> Self {
        (value.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16
    }
}
