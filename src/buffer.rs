use num_traits::Zero;

use crate::errors::{RastoreError, Result};

/// Multi-plane pixel buffer.
///
/// Plane-major storage, row-major within each plane. Shape is
/// `[planes, height, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneBuffer<T> {
    data: Box<[T]>,
    planes: usize,
    height: usize,
    width: usize,
}

impl<T: Zero + Clone> PlaneBuffer<T> {
    pub fn zeroed(planes: usize, height: usize, width: usize) -> Self {
        Self {
            data: vec![T::zero(); planes * height * width].into_boxed_slice(),
            planes,
            height,
            width,
        }
    }
}

impl<T> PlaneBuffer<T> {
    pub fn from_vec(data: Vec<T>, planes: usize, height: usize, width: usize) -> Result<Self> {
        if data.len() != planes * height * width {
            return Err(RastoreError::BufferLength {
                shape: [planes, height, width],
                actual: data.len(),
            });
        }
        Ok(Self {
            data: data.into_boxed_slice(),
            planes,
            height,
            width,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.planes, self.height, self.width]
    }

    pub fn planes(&self) -> usize {
        self.planes
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn plane(&self, index: usize) -> Result<&[T]> {
        let len = self.height * self.width;
        self.data
            .get(index * len..(index + 1) * len)
            .ok_or(RastoreError::BadPlane {
                index,
                planes: self.planes,
            })
    }

    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [T]> {
        let len = self.height * self.width;
        self.data
            .get_mut(index * len..(index + 1) * len)
            .ok_or(RastoreError::BadPlane {
                index,
                planes: self.planes,
            })
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data.into_vec()
    }
}
