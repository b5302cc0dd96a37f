// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::format::PixelFormat;

/// Failures reported by buffer access, extraction and cloning.
///
/// None of these are recovered internally; the capture pipeline decides
/// whether to drop the frame, retry on the next one or stop the session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The handle does not refer to a usable pixel buffer.
    #[error("not a pixel buffer: {0}")]
    TypeMismatch(String),

    /// Locking (or unlocking) the buffer's base address did not succeed.
    #[error("pixel buffer lock failed: {0}")]
    LockFailure(String),

    /// The destination buffer could not be created.
    #[error("failed to allocate {width}x{height} {format} buffer: {reason}")]
    AllocationFailure {
        width: usize,
        height: usize,
        format: PixelFormat,
        reason: String,
    },

    /// The requested element type does not match the buffer's element width.
    #[error("{requested} byte elements requested from {format} buffer with {native} byte elements")]
    FormatMismatch {
        format: PixelFormat,
        requested: usize,
        native: usize,
    },

    /// The plane index is past the buffer's last plane.
    #[error("plane {plane} requested from buffer with {plane_count} planes")]
    PlaneOutOfRange { plane: usize, plane_count: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
