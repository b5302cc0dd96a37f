// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::{entries, patterned, LockLog, Recorded, TextureHandle};
use depth_buffers::{
    with_locked_access, Attachments, BufferSpec, Error, HostPixelBuffer, ImageBuffer, LockMode,
    LockedBuffer, PixelBuffer, PixelFormat, PlaneGeometry,
};
use std::{
    error::Error as StdError,
    panic::{catch_unwind, AssertUnwindSafe},
    ptr::null_mut,
};

#[test]
fn test_locked_geometry() -> Result<(), Box<dyn StdError>> {
    let spec =
        BufferSpec::new(1920, 1440, PixelFormat::Yuv420BiPlanar8FullRange).with_row_alignment(64);
    let buffer = HostPixelBuffer::new(&spec)?;

    let (width, height, bpr, planes, format) =
        with_locked_access(&buffer, LockMode::ReadOnly, |locked| {
            assert!(!locked.base_address().is_null());
            Ok((
                locked.width(),
                locked.height(),
                locked.bytes_per_row(),
                locked.plane_count(),
                locked.pixel_format(),
            ))
        })?;

    assert_eq!((width, height), (1920, 1440));
    assert_eq!(bpr, 1920);
    assert_eq!(planes, 2);
    assert_eq!(format, PixelFormat::Yuv420BiPlanar8FullRange);
    assert_eq!(
        buffer.plane_geometry(1),
        Some(PlaneGeometry {
            width: 960,
            height: 720,
            bytes_per_row: 1920
        })
    );
    assert!(!buffer.is_locked());
    Ok(())
}

#[test]
fn test_not_a_pixel_buffer() {
    let res = with_locked_access(&TextureHandle, LockMode::ReadOnly, |_| Ok(()));
    assert!(matches!(res, Err(Error::TypeMismatch(_))));
}

#[test]
fn test_unlocked_after_error() -> Result<(), Box<dyn StdError>> {
    let buffer = patterned(&BufferSpec::new(8, 8, PixelFormat::DepthFloat32))?;

    let res: Result<(), _> = with_locked_access(&buffer, LockMode::ReadWrite, |_| {
        Err(Error::TypeMismatch("caller gave up".to_string()))
    });
    assert!(res.is_err());
    assert!(!buffer.is_locked());

    // a write lock is available again once the failed scope is gone
    with_locked_access(&buffer, LockMode::ReadWrite, |_| Ok(()))?;
    Ok(())
}

#[test]
fn test_unlocked_after_panic() -> Result<(), Box<dyn StdError>> {
    let buffer = HostPixelBuffer::new(&BufferSpec::new(4, 4, PixelFormat::OneComponent8))?;

    let res = catch_unwind(AssertUnwindSafe(|| {
        with_locked_access(&buffer, LockMode::ReadOnly, |_| -> depth_buffers::Result<()> {
            panic!("frame handler failed")
        })
    }));
    assert!(res.is_err());
    assert!(!buffer.is_locked());
    Ok(())
}

#[test]
fn test_write_requires_write_lock() -> Result<(), Box<dyn StdError>> {
    let buffer = HostPixelBuffer::new(&BufferSpec::new(4, 4, PixelFormat::OneComponent8))?;
    let res = with_locked_access(&buffer, LockMode::ReadOnly, |locked| {
        locked.plane_bytes_mut(0).map(|_| ())
    });
    assert!(matches!(res, Err(Error::LockFailure(_))));
    Ok(())
}

#[test]
fn test_conflicting_lock() -> Result<(), Box<dyn StdError>> {
    let buffer = HostPixelBuffer::new(&BufferSpec::new(4, 4, PixelFormat::DepthFloat32))?;
    let writer = LockedBuffer::lock(&buffer, LockMode::ReadWrite)?;

    let res = with_locked_access(&buffer, LockMode::ReadOnly, |_| Ok(()));
    assert!(matches!(res, Err(Error::LockFailure(_))));

    writer.unlock()?;
    with_locked_access(&buffer, LockMode::ReadOnly, |_| Ok(()))?;
    Ok(())
}

#[test]
fn test_plane_out_of_range() -> Result<(), Box<dyn StdError>> {
    let buffer = HostPixelBuffer::new(&BufferSpec::new(4, 4, PixelFormat::DepthFloat32))?;
    let res = with_locked_access(&buffer, LockMode::ReadOnly, |locked| {
        locked.plane_bytes(1).map(|_| ())
    });
    assert!(matches!(
        res,
        Err(Error::PlaneOutOfRange {
            plane: 1,
            plane_count: 1
        })
    ));
    Ok(())
}

#[test]
fn test_contents_must_match_geometry() {
    let spec = BufferSpec::new(4, 2, PixelFormat::OneComponent8);
    assert!(matches!(
        HostPixelBuffer::with_contents(&spec, &[&[0u8; 7]]),
        Err(Error::TypeMismatch(_))
    ));
    assert!(matches!(
        HostPixelBuffer::with_contents(&spec, &[&[0u8; 8], &[0u8; 8]]),
        Err(Error::TypeMismatch(_))
    ));
    assert!(matches!(
        HostPixelBuffer::from_elements(2, 2, PixelFormat::DepthFloat32, &[0u16; 4]),
        Err(Error::FormatMismatch {
            requested: 2,
            native: 4,
            ..
        })
    ));
}

#[test]
fn test_attachments_at_creation() -> Result<(), Box<dyn StdError>> {
    let attachments: Attachments = [
        (depth_buffers::buffer::COLOR_PRIMARIES, "P3_D65"),
        (depth_buffers::buffer::YCBCR_MATRIX, "ITU_R_709_2"),
    ]
    .into_iter()
    .collect();
    let spec = BufferSpec::new(8, 8, PixelFormat::Yuv420BiPlanar8VideoRange)
        .with_attachments(attachments.clone());
    let mut buffer = HostPixelBuffer::new(&spec)?;
    assert_eq!(buffer.attachments(), &attachments);

    buffer.set_attachment("GammaLevel", 2.2);
    assert_eq!(buffer.attachments().len(), 3);
    Ok(())
}

/// Pixel buffer whose lock call always fails.
struct Unlockable;

unsafe impl PixelBuffer for Unlockable {
    fn width(&self) -> usize {
        2
    }

    fn height(&self) -> usize {
        2
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::DepthFloat32
    }

    fn plane_geometry(&self, plane: usize) -> Option<PlaneGeometry> {
        (plane == 0).then_some(PlaneGeometry {
            width: 2,
            height: 2,
            bytes_per_row: 8,
        })
    }

    fn attachments(&self) -> &Attachments {
        static EMPTY: std::sync::OnceLock<Attachments> = std::sync::OnceLock::new();
        EMPTY.get_or_init(Attachments::new)
    }

    fn lock_base_address(&self, _mode: LockMode) -> depth_buffers::Result<()> {
        Err(Error::LockFailure("device busy".to_string()))
    }

    fn unlock_base_address(&self, _mode: LockMode) -> depth_buffers::Result<()> {
        panic!("never locked")
    }

    fn plane_base_address(&self, _plane: usize) -> *mut u8 {
        null_mut()
    }
}

impl ImageBuffer for Unlockable {
    fn as_pixel_buffer(&self) -> Option<&dyn PixelBuffer> {
        Some(self)
    }
}

#[test]
fn test_lock_failure() {
    let res = with_locked_access(&Unlockable, LockMode::ReadOnly, |_| Ok(()));
    assert!(matches!(res, Err(Error::LockFailure(_))));
    assert!(matches!(
        depth_buffers::extract::<f32, _>(&Unlockable),
        Err(Error::LockFailure(_))
    ));
}

/// Pixel buffer reporting fewer planes than its format has.
struct Truncated(HostPixelBuffer);

unsafe impl PixelBuffer for Truncated {
    fn width(&self) -> usize {
        self.0.width()
    }

    fn height(&self) -> usize {
        self.0.height()
    }

    fn pixel_format(&self) -> PixelFormat {
        self.0.pixel_format()
    }

    fn plane_count(&self) -> usize {
        1
    }

    fn plane_geometry(&self, plane: usize) -> Option<PlaneGeometry> {
        self.0.plane_geometry(plane)
    }

    fn attachments(&self) -> &Attachments {
        self.0.attachments()
    }

    fn lock_base_address(&self, mode: LockMode) -> depth_buffers::Result<()> {
        self.0.lock_base_address(mode)
    }

    fn unlock_base_address(&self, mode: LockMode) -> depth_buffers::Result<()> {
        self.0.unlock_base_address(mode)
    }

    fn plane_base_address(&self, plane: usize) -> *mut u8 {
        self.0.plane_base_address(plane)
    }
}

impl ImageBuffer for Truncated {
    fn as_pixel_buffer(&self) -> Option<&dyn PixelBuffer> {
        Some(self)
    }
}

#[test]
fn test_inconsistent_geometry() -> Result<(), Box<dyn StdError>> {
    let inner = HostPixelBuffer::new(&BufferSpec::new(8, 8, PixelFormat::Yuv420BiPlanar8FullRange))?;
    let truncated = Truncated(inner);
    let res = with_locked_access(&truncated, LockMode::ReadOnly, |_| Ok(()));
    assert!(matches!(res, Err(Error::TypeMismatch(_))));
    assert!(!truncated.0.is_locked());
    Ok(())
}

#[test]
fn test_unlock_failure() -> Result<(), Box<dyn StdError>> {
    let log = LockLog::default();
    let inner = HostPixelBuffer::new(&BufferSpec::new(4, 4, PixelFormat::DepthFloat32))?;
    let buffer = Recorded::new(inner, "frame", &log).failing_unlock();

    let res = with_locked_access(&buffer, LockMode::ReadOnly, |locked| Ok(locked.width()));
    assert!(matches!(res, Err(Error::LockFailure(_))));
    assert!(matches!(
        depth_buffers::depth_map(&buffer),
        Err(Error::LockFailure(_))
    ));
    assert_eq!(
        entries(&log),
        ["lock frame", "unlock frame", "lock frame", "unlock frame"]
    );
    Ok(())
}

#[test]
fn test_huge_width_is_rejected() {
    let spec = BufferSpec::new(1 << 62, 1, PixelFormat::DepthFloat32);
    assert!(matches!(
        HostPixelBuffer::new(&spec),
        Err(Error::AllocationFailure { .. })
    ));
}
