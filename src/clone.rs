// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Deep copies of pixel buffers.

use crate::{
    buffer::{BufferAllocator, BufferSpec, ImageBuffer, LockMode, LockedBuffer, PixelBuffer},
    error::{Error, Result},
};
use tracing::debug;

/// Copies `image` into a new buffer obtained from `allocator`.
///
/// The copy has the source's width, height, pixel format, per-plane row
/// strides and attachments, and its own memory. Attachments are handed to
/// the allocator with the creation request rather than set afterwards.
///
/// The source is only read and is never retained past the call.
///
/// # Errors
///
/// - [`Error::TypeMismatch`] if `image` is not a pixel buffer.
/// - [`Error::AllocationFailure`] if the allocator fails or hands back a
///   buffer whose geometry differs from the request. No partially copied
///   buffer is ever returned.
/// - [`Error::LockFailure`] if either buffer cannot be locked.
///
/// # Example
///
/// ```
/// use depth_buffers::{clone_buffer, BufferSpec, HostAllocator, HostPixelBuffer, PixelBuffer, PixelFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let frame = HostPixelBuffer::new(&BufferSpec::new(1920, 1440, PixelFormat::Yuv420BiPlanar8FullRange))?;
/// let copy = clone_buffer(&HostAllocator::new(), &frame)?;
/// assert_eq!(copy.plane_count(), 2);
/// assert_eq!(copy.bytes_per_row(), frame.bytes_per_row());
/// # Ok(())
/// # }
/// ```
pub fn clone_buffer<A, B>(allocator: &A, image: &B) -> Result<A::Buffer>
where
    A: BufferAllocator + ?Sized,
    B: ImageBuffer + ?Sized,
{
    let source = image.as_pixel_buffer().ok_or_else(|| {
        Error::TypeMismatch("image buffer is not backed by pixel memory".to_string())
    })?;

    // geometry and attachments are metadata, no lock needed
    let spec = BufferSpec::matching(source);
    let copy = allocator.allocate(&spec)?;
    check_geometry(&spec, &copy)?;

    copy_planes(source, &copy)?;
    debug!(
        "cloned {}x{} {} buffer with {} planes",
        spec.width(),
        spec.height(),
        spec.format(),
        spec.plane_count()
    );
    Ok(copy)
}

fn check_geometry(spec: &BufferSpec, copy: &dyn PixelBuffer) -> Result<()> {
    let same = copy.width() == spec.width()
        && copy.height() == spec.height()
        && copy.pixel_format() == spec.format()
        && copy.plane_count() == spec.plane_count()
        && (0..spec.plane_count()).all(|p| copy.plane_geometry(p) == spec.plane_geometry(p));
    if same {
        Ok(())
    } else {
        Err(spec.allocation_error("allocator returned a buffer with different geometry"))
    }
}

/// Copies every plane of `source` into `dest`.
///
/// The source is always locked before the destination and the destination
/// released before the source.
fn copy_planes(source: &dyn PixelBuffer, dest: &dyn PixelBuffer) -> Result<()> {
    let mut src = LockedBuffer::lock(source, LockMode::ReadOnly)?;
    let mut dst = LockedBuffer::lock(dest, LockMode::ReadWrite)?;

    src.with_cpu_access(|src| {
        dst.with_cpu_access(|dst| {
            if src.plane_count() == 1 {
                copy_plane(src, dst, 0)
            } else {
                // planes differ in geometry (chroma is subsampled), query each one
                (0..src.plane_count()).try_for_each(|plane| copy_plane(src, dst, plane))
            }
        })
    })?;

    let released = dst.unlock();
    src.unlock()?;
    released
}

/// Copies one plane; geometry equality was checked after allocation.
fn copy_plane(src: &LockedBuffer<'_>, dst: &mut LockedBuffer<'_>, plane: usize) -> Result<()> {
    let from = src.plane_bytes(plane)?;
    dst.plane_bytes_mut(plane)?.copy_from_slice(from);
    Ok(())
}
