// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel buffers backed by process heap memory.

use crate::{
    buffer::{
        Attachments, BufferAllocator, BufferSpec, ImageBuffer, LockMode, LockState, PixelBuffer,
        PlaneSlot, PLANE_ALIGNMENT,
    },
    error::{Error, Result},
    format::{PixelFormat, PlaneGeometry},
};
use core::fmt;
use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    ptr::{null_mut, NonNull},
};
use tracing::debug;

/// Heap allocated pixel buffer.
///
/// All planes live in one zero-initialised allocation, each plane starting
/// on a [`PLANE_ALIGNMENT`] boundary. The memory is freed when the buffer is
/// dropped.
///
/// # Example
///
/// ```
/// use depth_buffers::{BufferSpec, HostPixelBuffer, PixelBuffer, PixelFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let spec = BufferSpec::new(256, 192, PixelFormat::DepthFloat32).with_row_alignment(64);
/// let depth = HostPixelBuffer::new(&spec)?;
/// assert_eq!(depth.bytes_per_row(), 1024);
/// # Ok(())
/// # }
/// ```
pub struct HostPixelBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    width: usize,
    height: usize,
    format: PixelFormat,
    planes: Vec<PlaneSlot>,
    attachments: Attachments,
    lock: LockState,
}

// SAFETY: the allocation is exclusively owned and every access to it goes
// through the lock protocol in `LockState`.
unsafe impl Send for HostPixelBuffer {}
unsafe impl Sync for HostPixelBuffer {}

impl HostPixelBuffer {
    /// Allocates a zeroed buffer described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the requested strides are too
    /// small for the format or the memory cannot be allocated.
    pub fn new(spec: &BufferSpec) -> Result<Self> {
        let layouts = spec.layout()?;
        let layout = Layout::from_size_align(layouts.len, PLANE_ALIGNMENT)
            .map_err(|e| spec.allocation_error(e.to_string()))?;
        let ptr = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: layout has a non-zero size.
            NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or_else(|| {
                spec.allocation_error(format!("out of memory for {} bytes", layout.size()))
            })?
        };
        debug!(
            "host buffer alloc'd {}x{} {} {} bytes",
            spec.width(),
            spec.height(),
            spec.format(),
            layout.size()
        );
        Ok(Self {
            ptr,
            layout,
            width: spec.width(),
            height: spec.height(),
            format: spec.format(),
            planes: layouts.planes,
            attachments: spec.attachments().clone(),
            lock: LockState::default(),
        })
    }

    /// Allocates a buffer and fills each plane from `planes`.
    ///
    /// Every slice must hold exactly `height * bytes_per_row` bytes of its
    /// plane, padding included.
    pub fn with_contents(spec: &BufferSpec, planes: &[&[u8]]) -> Result<Self> {
        if planes.len() != spec.plane_count() {
            return Err(Error::TypeMismatch(format!(
                "{} planes supplied for a {} plane {} buffer",
                planes.len(),
                spec.plane_count(),
                spec.format()
            )));
        }
        let buffer = Self::new(spec)?;
        for (plane, (slot, data)) in buffer.planes.iter().zip(planes).enumerate() {
            if data.len() != slot.geometry.len() {
                return Err(Error::TypeMismatch(format!(
                    "plane {plane} holds {} bytes, expected {}",
                    data.len(),
                    slot.geometry.len()
                )));
            }
            if !data.is_empty() {
                // SAFETY: the buffer is not yet shared, the slot lies inside
                // the allocation and the lengths were checked above.
                unsafe {
                    buffer
                        .ptr
                        .as_ptr()
                        .add(slot.offset)
                        .copy_from_nonoverlapping(data.as_ptr(), data.len());
                }
            }
        }
        Ok(buffer)
    }

    /// Builds a packed single plane buffer from row-major elements.
    ///
    /// # Errors
    ///
    /// - [`Error::FormatMismatch`] if `T` is not as wide as the format's
    ///   elements.
    /// - [`Error::TypeMismatch`] if `values` does not hold `width * height`
    ///   elements or the format has more than one plane.
    pub fn from_elements<T: bytemuck::Pod>(
        width: usize,
        height: usize,
        format: PixelFormat,
        values: &[T],
    ) -> Result<Self> {
        if format.is_planar() {
            return Err(Error::TypeMismatch(format!(
                "{format} has {} planes",
                format.plane_count()
            )));
        }
        let native = format.bytes_per_element(0).unwrap_or(0);
        if std::mem::size_of::<T>() != native {
            return Err(Error::FormatMismatch {
                format,
                requested: std::mem::size_of::<T>(),
                native,
            });
        }
        if values.len() != width * height {
            return Err(Error::TypeMismatch(format!(
                "{} elements supplied for a {width}x{height} buffer",
                values.len()
            )));
        }
        let spec = BufferSpec::new(width, height, format);
        Self::with_contents(&spec, &[bytemuck::cast_slice(values)])
    }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attachments.insert(key, value);
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Bytes spanned by the allocation, including inter-plane alignment.
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

unsafe impl PixelBuffer for HostPixelBuffer {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane_geometry(&self, plane: usize) -> Option<PlaneGeometry> {
        self.planes.get(plane).map(|slot| slot.geometry)
    }

    fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    fn lock_base_address(&self, mode: LockMode) -> Result<()> {
        self.lock.acquire(mode)
    }

    fn unlock_base_address(&self, mode: LockMode) -> Result<()> {
        self.lock.release(mode)
    }

    fn plane_base_address(&self, plane: usize) -> *mut u8 {
        match self.planes.get(plane) {
            // SAFETY: slot offsets were computed from the allocation's layout.
            Some(slot) => unsafe { self.ptr.as_ptr().add(slot.offset) },
            None => null_mut(),
        }
    }
}

impl ImageBuffer for HostPixelBuffer {
    fn as_pixel_buffer(&self) -> Option<&dyn PixelBuffer> {
        Some(self)
    }
}

impl Drop for HostPixelBuffer {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `new` with this exact layout.
            unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
        }
        debug!("host buffer freed")
    }
}

impl fmt::Debug for HostPixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HostPixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes)
            .field("attachments", &self.attachments)
            .finish()
    }
}

impl fmt::Display for HostPixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} planes:{} size:{}",
            self.width,
            self.height,
            self.format,
            self.planes.len(),
            self.size()
        )
    }
}

/// Allocator for [`HostPixelBuffer`]s.
///
/// An optional ceiling on a single allocation stands in for the bounded
/// memory pools of capture devices; requests above it fail with
/// [`Error::AllocationFailure`].
#[derive(Clone, Debug, Default)]
pub struct HostAllocator {
    max_allocation: Option<usize>,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_allocation(bytes: usize) -> Self {
        Self {
            max_allocation: Some(bytes),
        }
    }
}

impl BufferAllocator for HostAllocator {
    type Buffer = HostPixelBuffer;

    fn allocate(&self, spec: &BufferSpec) -> Result<HostPixelBuffer> {
        if let Some(max) = self.max_allocation {
            let len = spec.layout()?.len;
            if len > max {
                return Err(spec.allocation_error(format!(
                    "{len} bytes exceeds the {max} byte allocation limit"
                )));
            }
        }
        HostPixelBuffer::new(spec)
    }
}
