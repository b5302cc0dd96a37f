// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Snapshots of pixel buffer memory as row-major numeric arrays.

use crate::{
    buffer::{with_locked_access, ImageBuffer, LockMode},
    error::{Error, Result},
};
use bytemuck::Pod;
use std::{mem::size_of, ops::Index};
use tracing::warn;

/// Owned `height` x `width` array of values copied out of a pixel buffer.
///
/// The values are a snapshot; the map shares no memory with the buffer it
/// came from. Rows are indexed first, so `map[r][c]` is row `r`, column `c`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedMap<T> {
    width: usize,
    height: usize,
    values: Vec<T>,
}

impl<T> TypedMap<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if col < self.width {
            self.values.get(row * self.width + col)
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[T]> {
        if row < self.height {
            Some(&self.values[row * self.width..(row + 1) * self.width])
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[T]> + '_ {
        (0..self.height).map(move |r| &self.values[r * self.width..(r + 1) * self.width])
    }

    /// Values in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<T> {
        self.values
    }
}

impl<T: Clone> TypedMap<T> {
    /// Nested rows, the shape consumers serialising depth maps expect.
    pub fn to_rows(&self) -> Vec<Vec<T>> {
        self.rows().map(<[T]>::to_vec).collect()
    }
}

impl<T> Index<usize> for TypedMap<T> {
    type Output = [T];

    fn index(&self, row: usize) -> &[T] {
        assert!(row < self.height, "row {row} out of range for {} rows", self.height);
        &self.values[row * self.width..(row + 1) * self.width]
    }
}

impl<T> Index<(usize, usize)> for TypedMap<T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self[row][col]
    }
}

/// Copies the first plane of `image` into a [`TypedMap`].
///
/// See [`extract_plane`].
pub fn extract<T: Pod, B: ImageBuffer + ?Sized>(image: &B) -> Result<TypedMap<T>> {
    extract_plane(image, 0)
}

/// Copies a 32-bit float depth (or disparity) buffer into a depth map.
pub fn depth_map<B: ImageBuffer + ?Sized>(image: &B) -> Result<TypedMap<f32>> {
    extract(image)
}

/// Copies one plane of `image` into a [`TypedMap`] of `T`.
///
/// The plane is read as a flat run of `T` values, so `map[r][c]` is element
/// `r * width + c` of the plane. Values are not scaled or converted.
///
/// Rows are assumed to be unpadded. When the plane's stride is wider than
/// `width` elements the same flat indexing is applied and a warning is
/// logged; the values will then be skewed by the padding.
///
/// # Errors
///
/// - [`Error::TypeMismatch`] / [`Error::LockFailure`] from locking the
///   buffer.
/// - [`Error::PlaneOutOfRange`] if `plane` does not exist.
/// - [`Error::FormatMismatch`] if `T` is not exactly as wide as the plane's
///   elements. The check happens before any memory is read.
///
/// # Example
///
/// ```
/// use depth_buffers::{extract, HostPixelBuffer, PixelFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let depth = HostPixelBuffer::from_elements(3, 2, PixelFormat::DepthFloat32, &[0.5f32; 6])?;
/// let map = extract::<f32, _>(&depth)?;
/// assert_eq!(map.height(), 2);
/// assert_eq!(map[1][2], 0.5);
/// # Ok(())
/// # }
/// ```
pub fn extract_plane<T: Pod, B: ImageBuffer + ?Sized>(
    image: &B,
    plane: usize,
) -> Result<TypedMap<T>> {
    with_locked_access(image, LockMode::ReadOnly, |locked| {
        let geometry = locked.plane(plane)?;
        let format = locked.pixel_format();
        let native = format
            .bytes_per_element(plane)
            .ok_or(Error::PlaneOutOfRange {
                plane,
                plane_count: format.plane_count(),
            })?;
        if size_of::<T>() != native {
            return Err(Error::FormatMismatch {
                format,
                requested: size_of::<T>(),
                native,
            });
        }

        let (width, height) = (geometry.width, geometry.height);
        if geometry.bytes_per_row != width * native {
            warn!(
                "{format} plane {plane} rows are padded ({} bytes per row for {width} elements), \
                 extracted values are not row aligned",
                geometry.bytes_per_row
            );
        }

        let bytes = &locked.plane_bytes(plane)?[..width * height * native];
        let values = match bytemuck::try_cast_slice::<u8, T>(bytes) {
            Ok(flat) => flat.to_vec(),
            Err(_) => bytes
                .chunks_exact(native)
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        };

        Ok(TypedMap {
            width,
            height,
            values,
        })
    })
}
