// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel buffers backed by Linux DMA heap memory.
//!
//! DMA buffers can be shared with other processes and hardware blocks by
//! file descriptor. CPU access goes through `dma-buf`'s mapped buffer so
//! every read or write of the memory is bracketed by a cache sync; locking
//! a [`DmaPixelBuffer`] only claims it.

use crate::{
    buffer::{
        Attachments, BufferAllocator, BufferSpec, ImageBuffer, LockMode, LockState, PixelBuffer,
        PlaneSlot,
    },
    error::{Error, Result},
    format::{PixelFormat, PlaneGeometry},
};
use core::fmt;
use dma_buf::{DmaBuf, MappedDmaBuf};
use dma_heap::Heap;
use std::{
    cell::UnsafeCell,
    error::Error as StdError,
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
    ptr::null_mut,
    sync::atomic::{AtomicPtr, Ordering},
};
use tracing::debug;

pub use dma_heap::HeapKind;

fn mapping_extent(
    pix: &[u8],
    _: Option<()>,
) -> Result<(*mut u8, usize), Box<dyn StdError>> {
    Ok((pix.as_ptr().cast_mut(), pix.len()))
}

/// Publishes the mapping address handed out for this access, then runs the
/// caller's closure.
fn read_access(
    pix: &[u8],
    access: Option<(&AtomicPtr<u8>, &mut dyn FnMut())>,
) -> Result<(), Box<dyn StdError>> {
    if let Some((base, f)) = access {
        base.store(pix.as_ptr().cast_mut(), Ordering::Release);
        f();
    }
    Ok(())
}

fn write_access(
    pix: &mut [u8],
    access: Option<(&AtomicPtr<u8>, &mut dyn FnMut())>,
) -> Result<(), Box<dyn StdError>> {
    if let Some((base, f)) = access {
        base.store(pix.as_mut_ptr(), Ordering::Release);
        f();
    }
    Ok(())
}

/// DMA heap backed pixel buffer.
///
/// The buffer is mapped into the process for its whole lifetime and
/// unmapped on drop. Dropping the buffer closes this process's handles to
/// the DMA buffer; other holders of the memory are unaffected.
pub struct DmaPixelBuffer {
    fd: OwnedFd,
    mapped: UnsafeCell<MappedDmaBuf>,
    base: AtomicPtr<u8>,
    len: usize,
    width: usize,
    height: usize,
    format: PixelFormat,
    planes: Vec<PlaneSlot>,
    attachments: Attachments,
    lock: LockState,
}

// SAFETY: the mapping is owned by this value and accessed only through the
// lock protocol; a mutable view of it is only taken under the exclusive
// write lock.
unsafe impl Send for DmaPixelBuffer {}
unsafe impl Sync for DmaPixelBuffer {}

impl DmaPixelBuffer {
    /// Wraps a DMA buffer owned elsewhere, such as a camera capture buffer.
    ///
    /// The descriptor is duplicated, so the caller keeps ownership of `fd`.
    /// `spec` describes the layout of the memory behind it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the descriptor cannot be
    /// duplicated or mapped, or if it is too small for `spec`.
    pub fn from_fd(fd: BorrowedFd<'_>, spec: &BufferSpec) -> Result<Self> {
        let layouts = spec.layout()?;
        let fd = fd
            .try_clone_to_owned()
            .map_err(|e| Error::TypeMismatch(format!("cannot duplicate fd: {e}")))?;
        Self::map(fd, spec, layouts.planes, layouts.len)
            .map_err(|e| Error::TypeMismatch(format!("cannot map dma buffer: {e}")))
    }

    fn map(
        fd: OwnedFd,
        spec: &BufferSpec,
        planes: Vec<PlaneSlot>,
        len: usize,
    ) -> Result<Self, Box<dyn StdError>> {
        if len == 0 {
            return Err("cannot map an empty buffer".into());
        }
        let mapped = DmaBuf::from(fd.try_clone()?).memory_map()?;
        let (base, size) = mapped.read(mapping_extent, None)?;
        if size < len {
            return Err(format!("dma buffer holds {size} bytes, layout requires {len}").into());
        }
        Ok(Self {
            fd,
            mapped: UnsafeCell::new(mapped),
            base: AtomicPtr::new(base),
            len,
            width: spec.width(),
            height: spec.height(),
            format: spec.format(),
            planes,
            attachments: spec.attachments().clone(),
            lock: LockState::default(),
        })
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    pub fn raw_fd(&self) -> i32 {
        self.fd.as_raw_fd()
    }

    /// Bytes of the buffer covered by the plane layout.
    pub fn size(&self) -> usize {
        self.len
    }

    /// Byte offset of `plane` from the start of the DMA buffer.
    pub fn plane_offset(&self, plane: usize) -> Option<usize> {
        self.planes.get(plane).map(|slot| slot.offset)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

unsafe impl PixelBuffer for DmaPixelBuffer {
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
            // SAFETY: slot offsets lie within the mapping.
            Some(slot) => unsafe { self.base.load(Ordering::Acquire).add(slot.offset) },
            None => null_mut(),
        }
    }

    unsafe fn cpu_access(&self, mode: LockMode, f: &mut dyn FnMut()) -> Result<()> {
        let res = match mode {
            LockMode::ReadOnly => {
                // SAFETY: readers share the mapping; a writer cannot hold
                // the lock at the same time.
                let mapped = unsafe { &*self.mapped.get() };
                mapped
                    .read(read_access, Some((&self.base, f)))
                    .map_err(|e| e.to_string())
            }
            LockMode::ReadWrite => {
                // SAFETY: the caller holds the exclusive write lock.
                let mapped = unsafe { &mut *self.mapped.get() };
                mapped
                    .write(write_access, Some((&self.base, f)))
                    .map_err(|e| e.to_string())
            }
        };
        res.map_err(|e| Error::LockFailure(format!("dma-buf cpu access: {e}")))
    }
}

impl ImageBuffer for DmaPixelBuffer {
    fn as_pixel_buffer(&self) -> Option<&dyn PixelBuffer> {
        Some(self)
    }
}

impl Drop for DmaPixelBuffer {
    fn drop(&mut self) {
        debug!("dma buffer freed")
    }
}

impl fmt::Debug for DmaPixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DmaPixelBuffer")
            .field("fd", &self.fd)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes)
            .finish()
    }
}

impl fmt::Display for DmaPixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} fd:{:?}",
            self.width, self.height, self.format, self.fd
        )
    }
}

/// Allocator drawing [`DmaPixelBuffer`]s from a DMA heap.
///
/// # Example
///
/// ```no_run
/// use depth_buffers::{clone_buffer, dma::DmaAllocator, HostPixelBuffer, PixelFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let depth = HostPixelBuffer::from_elements(256, 192, PixelFormat::DepthFloat32, &[0.0f32; 256 * 192])?;
/// let heap = DmaAllocator::cma()?;
/// let shared = clone_buffer(&heap, &depth)?;
/// println!("{shared}");
/// # Ok(())
/// # }
/// ```
pub struct DmaAllocator {
    heap: Heap,
}

impl DmaAllocator {
    /// Opens the DMA heap of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the heap device under `/dev/dma_heap` cannot be
    /// opened.
    pub fn new(kind: HeapKind) -> Result<Self, Box<dyn StdError>> {
        let heap = Heap::new(kind)?;
        Ok(Self { heap })
    }

    /// Opens the contiguous memory (CMA) heap.
    pub fn cma() -> Result<Self, Box<dyn StdError>> {
        Self::new(HeapKind::Cma)
    }
}

impl BufferAllocator for DmaAllocator {
    type Buffer = DmaPixelBuffer;

    fn allocate(&self, spec: &BufferSpec) -> Result<DmaPixelBuffer> {
        let layouts = spec.layout()?;
        if layouts.len == 0 {
            return Err(spec.allocation_error("dma heap cannot allocate an empty buffer"));
        }
        let fd = self
            .heap
            .allocate(layouts.len)
            .map_err(|e| spec.allocation_error(e.to_string()))?;
        let buffer = DmaPixelBuffer::map(fd, spec, layouts.planes, layouts.len)
            .map_err(|e| spec.allocation_error(format!("memory map failed: {e}")))?;
        debug!("dma buffer alloc'd {buffer}");
        Ok(buffer)
    }
}
