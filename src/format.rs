// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;

/// Four character code identifying a raw pixel layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0 {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl From<FourCC> for u32 {
    fn from(value: FourCC) -> Self {
        u32::from_be_bytes(value.0)
    }
}

/// 32-bit float depth in meters
pub const FDEP: FourCC = FourCC(*b"fdep");

/// 16-bit float depth in meters
pub const HDEP: FourCC = FourCC(*b"hdep");

/// 32-bit float disparity
pub const FDIS: FourCC = FourCC(*b"fdis");

/// Single 8-bit component (depth confidence)
pub const L008: FourCC = FourCC(*b"L008");

/// YCbCr 4:2:0 bi-planar, 8-bit, video range
pub const YUV420V: FourCC = FourCC(*b"420v");

/// YCbCr 4:2:0 bi-planar, 8-bit, full range
pub const YUV420F: FourCC = FourCC(*b"420f");

/// YCbCr 4:2:0 bi-planar, 10-bit samples in 16-bit containers, video range
pub const X420: FourCC = FourCC(*b"x420");

/// Layout of a single plane relative to the full frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes occupied by one element (all components of one sample site).
    pub bytes_per_element: usize,
    /// Horizontal subsampling divisor.
    pub x_divisor: usize,
    /// Vertical subsampling divisor.
    pub y_divisor: usize,
}

const fn plane(bytes_per_element: usize, x_divisor: usize, y_divisor: usize) -> PlaneLayout {
    PlaneLayout {
        bytes_per_element,
        x_divisor,
        y_divisor,
    }
}

const DEPTH32_PLANES: [PlaneLayout; 1] = [plane(4, 1, 1)];
const DEPTH16_PLANES: [PlaneLayout; 1] = [plane(2, 1, 1)];
const GRAY8_PLANES: [PlaneLayout; 1] = [plane(1, 1, 1)];
const NV12_PLANES: [PlaneLayout; 2] = [plane(1, 1, 1), plane(2, 2, 2)];
const P010_PLANES: [PlaneLayout; 2] = [plane(2, 1, 1), plane(4, 2, 2)];

/// Raw pixel formats produced by the depth capture pipeline.
///
/// The set is closed: depth sensors deliver one of the single plane float
/// or confidence formats, the color camera delivers one of the bi-planar
/// YCbCr formats.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit float depth
    DepthFloat32,
    /// 16-bit float depth
    DepthFloat16,
    /// 32-bit float disparity
    DisparityFloat32,
    /// 8-bit single component, used for confidence maps
    OneComponent8,
    /// 8-bit 4:2:0 luma plane plus interleaved CbCr plane, video range
    Yuv420BiPlanar8VideoRange,
    /// 8-bit 4:2:0 luma plane plus interleaved CbCr plane, full range
    Yuv420BiPlanar8FullRange,
    /// 10-bit 4:2:0 bi-planar stored in 16-bit containers, video range
    Yuv420BiPlanar10VideoRange,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::DepthFloat32,
        PixelFormat::DepthFloat16,
        PixelFormat::DisparityFloat32,
        PixelFormat::OneComponent8,
        PixelFormat::Yuv420BiPlanar8VideoRange,
        PixelFormat::Yuv420BiPlanar8FullRange,
        PixelFormat::Yuv420BiPlanar10VideoRange,
    ];

    pub const fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::DepthFloat32 => FDEP,
            PixelFormat::DepthFloat16 => HDEP,
            PixelFormat::DisparityFloat32 => FDIS,
            PixelFormat::OneComponent8 => L008,
            PixelFormat::Yuv420BiPlanar8VideoRange => YUV420V,
            PixelFormat::Yuv420BiPlanar8FullRange => YUV420F,
            PixelFormat::Yuv420BiPlanar10VideoRange => X420,
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.fourcc() == fourcc)
    }

    /// Per-plane layouts, in plane order.
    pub const fn planes(self) -> &'static [PlaneLayout] {
        match self {
            PixelFormat::DepthFloat32 | PixelFormat::DisparityFloat32 => &DEPTH32_PLANES,
            PixelFormat::DepthFloat16 => &DEPTH16_PLANES,
            PixelFormat::OneComponent8 => &GRAY8_PLANES,
            PixelFormat::Yuv420BiPlanar8VideoRange | PixelFormat::Yuv420BiPlanar8FullRange => {
                &NV12_PLANES
            }
            PixelFormat::Yuv420BiPlanar10VideoRange => &P010_PLANES,
        }
    }

    pub const fn plane_count(self) -> usize {
        self.planes().len()
    }

    pub const fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    /// Native element width in bytes of `plane`, or `None` when the format
    /// has no such plane.
    pub fn bytes_per_element(self, plane: usize) -> Option<usize> {
        self.planes().get(plane).map(|p| p.bytes_per_element)
    }

    /// Dimensions in elements of `plane` for a `width`x`height` frame.
    /// Subsampled planes round up so odd sizes keep their last column/row.
    pub fn plane_dimensions(self, width: usize, height: usize, plane: usize) -> Option<(usize, usize)> {
        self.planes()
            .get(plane)
            .map(|p| (width.div_ceil(p.x_divisor), height.div_ceil(p.y_divisor)))
    }

    /// Smallest legal row stride of `plane` for a frame `width` pixels wide.
    ///
    /// `None` when the format has no such plane or the stride does not fit
    /// in a `usize`.
    pub fn min_bytes_per_row(self, width: usize, plane: usize) -> Option<usize> {
        let p = self.planes().get(plane)?;
        width.div_ceil(p.x_divisor).checked_mul(p.bytes_per_element)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fourcc().fmt(f)
    }
}

impl TryFrom<FourCC> for PixelFormat {
    type Error = FourCC;

    fn try_from(value: FourCC) -> Result<Self, Self::Error> {
        PixelFormat::from_fourcc(value).ok_or(value)
    }
}

/// Geometry of one plane of a pixel buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneGeometry {
    /// Plane width in elements
    pub width: usize,
    /// Plane height in rows
    pub height: usize,
    /// Row stride in bytes, including any padding
    pub bytes_per_row: usize,
}

impl PlaneGeometry {
    /// Total bytes spanned by the plane.
    pub fn len(&self) -> usize {
        self.height * self.bytes_per_row
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
