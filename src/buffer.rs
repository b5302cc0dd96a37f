// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel buffer handles and scoped access to their memory.
//!
//! Buffers are owned by whoever captured them; this module only borrows
//! them. Memory is reachable exclusively through a [`LockedBuffer`] guard,
//! which releases the lock when it goes out of scope regardless of how the
//! scope is left.

use crate::{
    error::{Error, Result},
    format::{PixelFormat, PlaneGeometry},
};
use std::{
    collections::BTreeMap,
    fmt,
    mem::ManuallyDrop,
    slice::{from_raw_parts, from_raw_parts_mut},
    sync::atomic::{AtomicIsize, Ordering},
};
use tracing::{debug, warn};

/// Alignment of every plane's base address in buffers allocated by this
/// crate.
pub const PLANE_ALIGNMENT: usize = 64;

/// Attachment key for the color primaries descriptor.
pub const COLOR_PRIMARIES: &str = "ColorPrimaries";

/// Attachment key for the transfer function descriptor.
pub const TRANSFER_FUNCTION: &str = "TransferFunction";

/// Attachment key for the YCbCr matrix descriptor.
pub const YCBCR_MATRIX: &str = "YCbCrMatrix";

/// Attachment key for the chroma siting descriptor.
pub const CHROMA_LOCATION: &str = "ChromaLocationTopField";

/// Format and colorimetry metadata carried alongside the pixels.
///
/// Values are kept as JSON values so descriptors of any shape travel with
/// the buffer unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attachments(BTreeMap<String, serde_json::Value>);

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.clone().into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for Attachments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// How a buffer's memory will be accessed while locked.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Shared access; the memory must not be written.
    ReadOnly,
    /// Exclusive access; the memory may be written.
    ReadWrite,
}

/// Opaque handle to image storage handed over by the capture subsystem.
///
/// Not every image handle is backed by CPU addressable pixel memory;
/// [`as_pixel_buffer`](ImageBuffer::as_pixel_buffer) returns `None` for
/// those and every operation in this crate rejects them with
/// [`Error::TypeMismatch`].
pub trait ImageBuffer {
    fn as_pixel_buffer(&self) -> Option<&dyn PixelBuffer>;
}

/// A 2D pixel buffer with one or more planes.
///
/// Geometry and attachment queries never touch pixel memory and may be
/// made without locking.
///
/// # Safety
///
/// Implementors must guarantee that between a successful
/// [`lock_base_address`](PixelBuffer::lock_base_address) and the matching
/// [`unlock_base_address`](PixelBuffer::unlock_base_address):
/// - `plane_base_address(p)` points to at least
///   `plane_geometry(p).height * plane_geometry(p).bytes_per_row` bytes
///   for every plane `p` below `plane_count()`.
/// - Planes do not overlap each other.
/// - Memory is not written by anyone else while a lock is held, and a
///   [`LockMode::ReadWrite`] lock is granted to at most one holder with no
///   concurrent readers.
/// - Geometry reported by the buffer does not change while it is locked.
pub unsafe trait PixelBuffer {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn pixel_format(&self) -> PixelFormat;

    fn plane_count(&self) -> usize {
        self.pixel_format().plane_count()
    }

    /// Geometry of `plane`, or `None` past the last plane.
    fn plane_geometry(&self, plane: usize) -> Option<PlaneGeometry>;

    /// Row stride of the first plane.
    fn bytes_per_row(&self) -> usize {
        self.plane_geometry(0).map_or(0, |p| p.bytes_per_row)
    }

    fn attachments(&self) -> &Attachments;

    fn lock_base_address(&self, mode: LockMode) -> Result<()>;

    fn unlock_base_address(&self, mode: LockMode) -> Result<()>;

    /// Base address of `plane`. Only meaningful while the buffer is locked.
    fn plane_base_address(&self, plane: usize) -> *mut u8;

    /// Runs `f` with CPU access to the buffer's memory made coherent for
    /// `mode`. The default runs `f` directly.
    ///
    /// Implementors must call `f` exactly once on success.
    ///
    /// # Safety
    ///
    /// The caller must hold a lock on the buffer in `mode` for the whole
    /// call.
    unsafe fn cpu_access(&self, mode: LockMode, f: &mut dyn FnMut()) -> Result<()> {
        let _ = mode;
        f();
        Ok(())
    }
}

/// Creates pixel buffers from a [`BufferSpec`].
pub trait BufferAllocator {
    type Buffer: PixelBuffer;

    fn allocate(&self, spec: &BufferSpec) -> Result<Self::Buffer>;
}

/// Creation request for a pixel buffer.
///
/// Attachments are part of the request because allocators consume them at
/// creation time.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferSpec {
    width: usize,
    height: usize,
    format: PixelFormat,
    bytes_per_row: Vec<usize>,
    attachments: Attachments,
}

impl BufferSpec {
    /// Request for a buffer with tightly packed rows and no attachments.
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        let bytes_per_row = (0..format.plane_count())
            .map(|plane| format.min_bytes_per_row(width, plane).unwrap_or(0))
            .collect();
        Self {
            width,
            height,
            format,
            bytes_per_row,
            attachments: Attachments::new(),
        }
    }

    /// Request reproducing `source`'s geometry and attachments.
    ///
    /// Only metadata is read, the source is not locked.
    pub fn matching(source: &dyn PixelBuffer) -> Self {
        let format = source.pixel_format();
        let width = source.width();
        let bytes_per_row = (0..source.plane_count())
            .map(|plane| match source.plane_geometry(plane) {
                Some(geometry) => geometry.bytes_per_row,
                None => format.min_bytes_per_row(width, plane).unwrap_or(0),
            })
            .collect();
        Self {
            width,
            height: source.height(),
            format,
            bytes_per_row,
            attachments: source.attachments().clone(),
        }
    }

    /// Rounds every plane's row stride up to a multiple of `alignment`.
    pub fn with_row_alignment(mut self, alignment: usize) -> Self {
        if alignment > 1 {
            for bpr in self.bytes_per_row.iter_mut() {
                // an overflowing stride is left for `layout` to reject
                *bpr = bpr.checked_next_multiple_of(alignment).unwrap_or(usize::MAX);
            }
        }
        self
    }

    /// Overrides the row stride of one plane. Out of range planes are ignored.
    pub fn with_bytes_per_row(mut self, plane: usize, bytes_per_row: usize) -> Self {
        if let Some(bpr) = self.bytes_per_row.get_mut(plane) {
            *bpr = bytes_per_row;
        }
        self
    }

    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn plane_count(&self) -> usize {
        self.bytes_per_row.len()
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn plane_geometry(&self, plane: usize) -> Option<PlaneGeometry> {
        let (width, height) = self
            .format
            .plane_dimensions(self.width, self.height, plane)?;
        Some(PlaneGeometry {
            width,
            height,
            bytes_per_row: *self.bytes_per_row.get(plane)?,
        })
    }

    pub(crate) fn allocation_error(&self, reason: impl Into<String>) -> Error {
        Error::AllocationFailure {
            width: self.width,
            height: self.height,
            format: self.format,
            reason: reason.into(),
        }
    }

    /// Places each plane at a [`PLANE_ALIGNMENT`] boundary and returns the
    /// plane offsets with the total byte length of the backing store.
    pub(crate) fn layout(&self) -> Result<PlaneLayouts> {
        let mut planes = Vec::with_capacity(self.plane_count());
        let mut len = 0usize;
        for plane in 0..self.plane_count() {
            let geometry = self
                .plane_geometry(plane)
                .ok_or_else(|| self.allocation_error(format!("format has no plane {plane}")))?;
            let min = self
                .format
                .min_bytes_per_row(self.width, plane)
                .ok_or_else(|| self.allocation_error("size overflow"))?;
            if geometry.bytes_per_row < min {
                return Err(self.allocation_error(format!(
                    "plane {plane} stride {} is below the minimum {min}",
                    geometry.bytes_per_row
                )));
            }
            let offset = len
                .checked_next_multiple_of(PLANE_ALIGNMENT)
                .ok_or_else(|| self.allocation_error("size overflow"))?;
            let plane_len = geometry
                .height
                .checked_mul(geometry.bytes_per_row)
                .ok_or_else(|| self.allocation_error("size overflow"))?;
            len = offset
                .checked_add(plane_len)
                .ok_or_else(|| self.allocation_error("size overflow"))?;
            planes.push(PlaneSlot { offset, geometry });
        }
        Ok(PlaneLayouts { planes, len })
    }
}

/// Location of one plane inside a single backing allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct PlaneSlot {
    pub offset: usize,
    pub geometry: PlaneGeometry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PlaneLayouts {
    pub planes: Vec<PlaneSlot>,
    pub len: usize,
}

const WRITER: isize = -1;

/// Reader/writer lock state of a buffer: a count of readers, or `-1` while
/// a writer holds it. Never blocks; a conflicting request fails.
#[derive(Debug, Default)]
pub(crate) struct LockState(AtomicIsize);

impl LockState {
    pub fn acquire(&self, mode: LockMode) -> Result<()> {
        match mode {
            LockMode::ReadOnly => self
                .0
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                    (s >= 0).then_some(s + 1)
                })
                .map(|_| ())
                .map_err(|_| Error::LockFailure("buffer is locked for writing".to_string())),
            LockMode::ReadWrite => self
                .0
                .compare_exchange(0, WRITER, Ordering::AcqRel, Ordering::Acquire)
                .map(|_| ())
                .map_err(|s| {
                    Error::LockFailure(if s == WRITER {
                        "buffer is already locked for writing".to_string()
                    } else {
                        format!("buffer is locked by {s} readers")
                    })
                }),
        }
    }

    pub fn release(&self, mode: LockMode) -> Result<()> {
        match mode {
            LockMode::ReadOnly => self
                .0
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                    (s > 0).then_some(s - 1)
                })
                .map(|_| ())
                .map_err(|_| Error::LockFailure("buffer is not locked for reading".to_string())),
            LockMode::ReadWrite => self
                .0
                .compare_exchange(WRITER, 0, Ordering::AcqRel, Ordering::Acquire)
                .map(|_| ())
                .map_err(|_| Error::LockFailure("buffer is not locked for writing".to_string())),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }
}

/// Rejects buffers whose reported geometry cannot describe valid memory.
fn validate(buffer: &dyn PixelBuffer) -> Result<()> {
    let format = buffer.pixel_format();
    let plane_count = buffer.plane_count();
    if plane_count == 0 || plane_count != format.plane_count() {
        return Err(Error::TypeMismatch(format!(
            "{format} buffer reports {plane_count} planes, expected {}",
            format.plane_count()
        )));
    }
    for plane in 0..plane_count {
        let geometry = buffer.plane_geometry(plane).ok_or_else(|| {
            Error::TypeMismatch(format!("{format} buffer has no geometry for plane {plane}"))
        })?;
        let expected = format.plane_dimensions(buffer.width(), buffer.height(), plane);
        if Some((geometry.width, geometry.height)) != expected {
            return Err(Error::TypeMismatch(format!(
                "plane {plane} is {}x{}, expected {:?} for a {}x{} {format} buffer",
                geometry.width,
                geometry.height,
                expected,
                buffer.width(),
                buffer.height()
            )));
        }
        let min = format
            .min_bytes_per_row(buffer.width(), plane)
            .ok_or_else(|| {
                Error::TypeMismatch(format!(
                    "plane {plane} of a {} pixel wide {format} buffer overflows",
                    buffer.width()
                ))
            })?;
        if geometry.bytes_per_row < min {
            return Err(Error::TypeMismatch(format!(
                "plane {plane} stride {} is below the minimum {min}",
                geometry.bytes_per_row
            )));
        }
        if geometry.height.checked_mul(geometry.bytes_per_row).is_none() {
            return Err(Error::TypeMismatch(format!(
                "plane {plane} size overflows ({} rows of {} bytes)",
                geometry.height, geometry.bytes_per_row
            )));
        }
    }
    Ok(())
}

/// Scoped access to a locked pixel buffer.
///
/// The buffer is unlocked when the guard is dropped. Use
/// [`unlock`](LockedBuffer::unlock) to observe an unlock failure instead
/// of having it logged.
pub struct LockedBuffer<'a> {
    buffer: &'a dyn PixelBuffer,
    mode: LockMode,
}

impl<'a> LockedBuffer<'a> {
    /// Validates `buffer`'s geometry and locks its base address.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if the reported geometry is inconsistent
    ///   with the pixel format.
    /// - [`Error::LockFailure`] if the lock is refused or the buffer hands
    ///   out a null base address.
    pub fn lock(buffer: &'a dyn PixelBuffer, mode: LockMode) -> Result<Self> {
        validate(buffer)?;
        buffer.lock_base_address(mode)?;
        let locked = Self { buffer, mode };

        for plane in 0..buffer.plane_count() {
            let empty = buffer.plane_geometry(plane).map_or(true, |g| g.is_empty());
            if !empty && buffer.plane_base_address(plane).is_null() {
                // dropping the guard releases the lock taken above
                return Err(Error::LockFailure(format!(
                    "plane {plane} base address is null"
                )));
            }
        }

        debug!(
            "locked {}x{} {} buffer {:?}",
            buffer.width(),
            buffer.height(),
            buffer.pixel_format(),
            mode
        );
        Ok(locked)
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn width(&self) -> usize {
        self.buffer.width()
    }

    pub fn height(&self) -> usize {
        self.buffer.height()
    }

    pub fn bytes_per_row(&self) -> usize {
        self.buffer.bytes_per_row()
    }

    pub fn plane_count(&self) -> usize {
        self.buffer.plane_count()
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.buffer.pixel_format()
    }

    pub fn attachments(&self) -> &Attachments {
        self.buffer.attachments()
    }

    pub fn plane(&self, plane: usize) -> Result<PlaneGeometry> {
        self.buffer
            .plane_geometry(plane)
            .filter(|_| plane < self.plane_count())
            .ok_or(Error::PlaneOutOfRange {
                plane,
                plane_count: self.plane_count(),
            })
    }

    /// Base address of the first plane.
    pub fn base_address(&self) -> *const u8 {
        self.buffer.plane_base_address(0)
    }

    /// Memory of `plane`, `height * bytes_per_row` bytes long.
    pub fn plane_bytes(&self, plane: usize) -> Result<&[u8]> {
        let geometry = self.plane(plane)?;
        if geometry.is_empty() {
            return Ok(&[]);
        }
        let ptr = self.buffer.plane_base_address(plane);
        // SAFETY: the buffer is locked and PixelBuffer guarantees the plane
        // spans `geometry.len()` bytes until it is unlocked, which cannot
        // happen while this borrow of the guard is alive.
        Ok(unsafe { from_raw_parts(ptr, geometry.len()) })
    }

    /// Writable memory of `plane`. Requires a [`LockMode::ReadWrite`] lock.
    pub fn plane_bytes_mut(&mut self, plane: usize) -> Result<&mut [u8]> {
        if self.mode != LockMode::ReadWrite {
            return Err(Error::LockFailure(
                "buffer is locked read-only".to_string(),
            ));
        }
        let geometry = self.plane(plane)?;
        if geometry.is_empty() {
            return Ok(&mut []);
        }
        let ptr = self.buffer.plane_base_address(plane);
        // SAFETY: as for `plane_bytes`; the write lock is exclusive and the
        // `&mut self` receiver keeps this the only view handed out by the
        // guard.
        Ok(unsafe { from_raw_parts_mut(ptr, geometry.len()) })
    }

    /// Runs `f` inside the buffer's CPU access bracket.
    ///
    /// Plain memory needs none; DMA buffers synchronise their caches
    /// around `f`.
    pub fn with_cpu_access<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let (buffer, mode) = (self.buffer, self.mode);
        let mut f = Some(f);
        let mut value = None;
        // SAFETY: this guard holds the lock in `mode` until it is dropped.
        unsafe {
            buffer.cpu_access(mode, &mut || {
                if let Some(f) = f.take() {
                    value = Some(f(&mut *self));
                }
            })
        }?;
        value.unwrap_or_else(|| Err(Error::LockFailure("cpu access was not granted".to_string())))
    }

    /// Unlocks the buffer, reporting a failed unlock to the caller.
    pub fn unlock(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        this.buffer.unlock_base_address(this.mode)
    }
}

impl Drop for LockedBuffer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.buffer.unlock_base_address(self.mode) {
            warn!("unlock failed: {e}");
        }
    }
}

impl fmt::Debug for LockedBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LockedBuffer")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.pixel_format())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Runs `f` with `image` locked in `mode`.
///
/// The lock is taken before any memory is read and released on every exit
/// path, including `f` failing or panicking.
///
/// # Errors
///
/// - [`Error::TypeMismatch`] if `image` is not a pixel buffer or its
///   geometry is inconsistent.
/// - [`Error::LockFailure`] if locking or unlocking fails.
/// - Any error returned by `f`.
pub fn with_locked_access<B, R, F>(image: &B, mode: LockMode, f: F) -> Result<R>
where
    B: ImageBuffer + ?Sized,
    F: FnOnce(&mut LockedBuffer<'_>) -> Result<R>,
{
    let buffer = image.as_pixel_buffer().ok_or_else(|| {
        Error::TypeMismatch("image buffer is not backed by pixel memory".to_string())
    })?;
    let mut locked = LockedBuffer::lock(buffer, mode)?;
    let value = locked.with_cpu_access(f)?;
    locked.unlock()?;
    Ok(value)
}
