// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

#![allow(dead_code)]

use depth_buffers::{
    with_locked_access, Attachments, BufferAllocator, BufferSpec, Error, HostPixelBuffer,
    ImageBuffer, LockMode, PixelBuffer, PixelFormat, PlaneGeometry, Result,
};
use std::sync::{Arc, Mutex};

pub const SIZES: [(usize, usize); 7] = [
    (1, 1),
    (2, 2),
    (3, 5),
    (16, 9),
    (127, 33),
    (128, 128),
    (256, 192),
];

/// Byte written at `index` of `plane` by [`patterned`].
pub fn pattern(plane: usize, index: usize) -> u8 {
    (plane * 101 + index * 7 + index / 251) as u8
}

/// Allocates a buffer for `spec` and fills every plane, padding included,
/// with a plane specific pattern.
pub fn patterned(spec: &BufferSpec) -> Result<HostPixelBuffer> {
    let buffer = HostPixelBuffer::new(spec)?;
    with_locked_access(&buffer, LockMode::ReadWrite, |locked| {
        for plane in 0..locked.plane_count() {
            for (i, b) in locked.plane_bytes_mut(plane)?.iter_mut().enumerate() {
                *b = pattern(plane, i);
            }
        }
        Ok(())
    })?;
    Ok(buffer)
}

/// Copies out every plane's bytes.
pub fn plane_contents<B: ImageBuffer + ?Sized>(image: &B) -> Result<Vec<Vec<u8>>> {
    with_locked_access(image, LockMode::ReadOnly, |locked| {
        (0..locked.plane_count())
            .map(|plane| locked.plane_bytes(plane).map(<[u8]>::to_vec))
            .collect()
    })
}

/// Handle to image storage that has no CPU pixel memory.
pub struct TextureHandle;

impl ImageBuffer for TextureHandle {
    fn as_pixel_buffer(&self) -> Option<&dyn PixelBuffer> {
        None
    }
}

/// Shared record of lock calls made on [`Recorded`] buffers.
pub type LockLog = Arc<Mutex<Vec<String>>>;

/// Host buffer that records successful lock calls and every unlock call
/// under its name.
pub struct Recorded {
    pub inner: HostPixelBuffer,
    name: &'static str,
    log: LockLog,
    fail_lock: bool,
    fail_unlock: bool,
}

impl Recorded {
    pub fn new(inner: HostPixelBuffer, name: &'static str, log: &LockLog) -> Self {
        Self {
            inner,
            name,
            log: Arc::clone(log),
            fail_lock: false,
            fail_unlock: false,
        }
    }

    /// Refuses every lock request.
    pub fn failing_lock(mut self) -> Self {
        self.fail_lock = true;
        self
    }

    /// Releases the lock but reports the unlock as failed.
    pub fn failing_unlock(mut self) -> Self {
        self.fail_unlock = true;
        self
    }

    fn record(&self, event: &str) {
        if let Ok(mut log) = self.log.lock() {
            log.push(format!("{event} {}", self.name));
        }
    }
}

pub fn entries(log: &LockLog) -> Vec<String> {
    log.lock().map(|log| log.clone()).unwrap_or_default()
}

unsafe impl PixelBuffer for Recorded {
    fn width(&self) -> usize {
        self.inner.width()
    }

    fn height(&self) -> usize {
        self.inner.height()
    }

    fn pixel_format(&self) -> PixelFormat {
        self.inner.pixel_format()
    }

    fn plane_count(&self) -> usize {
        self.inner.plane_count()
    }

    fn plane_geometry(&self, plane: usize) -> Option<PlaneGeometry> {
        self.inner.plane_geometry(plane)
    }

    fn attachments(&self) -> &Attachments {
        self.inner.attachments()
    }

    fn lock_base_address(&self, mode: LockMode) -> Result<()> {
        if self.fail_lock {
            return Err(Error::LockFailure(format!("{} is busy", self.name)));
        }
        self.inner.lock_base_address(mode)?;
        self.record("lock");
        Ok(())
    }

    fn unlock_base_address(&self, mode: LockMode) -> Result<()> {
        self.record("unlock");
        self.inner.unlock_base_address(mode)?;
        if self.fail_unlock {
            return Err(Error::LockFailure(format!("{} did not unlock", self.name)));
        }
        Ok(())
    }

    fn plane_base_address(&self, plane: usize) -> *mut u8 {
        self.inner.plane_base_address(plane)
    }
}

impl ImageBuffer for Recorded {
    fn as_pixel_buffer(&self) -> Option<&dyn PixelBuffer> {
        Some(self)
    }
}

/// Allocator handing out [`Recorded`] host buffers named `dst`.
pub struct RecordingAllocator {
    pub log: LockLog,
    pub fail_lock: bool,
    pub fail_unlock: bool,
}

impl RecordingAllocator {
    pub fn new(log: &LockLog) -> Self {
        Self {
            log: Arc::clone(log),
            fail_lock: false,
            fail_unlock: false,
        }
    }
}

impl BufferAllocator for RecordingAllocator {
    type Buffer = Recorded;

    fn allocate(&self, spec: &BufferSpec) -> Result<Recorded> {
        let mut buffer = Recorded::new(HostPixelBuffer::new(spec)?, "dst", &self.log);
        buffer.fail_lock = self.fail_lock;
        buffer.fail_unlock = self.fail_unlock;
        Ok(buffer)
    }
}
