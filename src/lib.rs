// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # Depth Buffers
//!
//! This library provides the low-level conversions between raw pixel
//! buffers delivered by a depth capture pipeline and forms the rest of the
//! application can use: typed 2D arrays copied out of depth frames, and
//! independent deep copies of single and multi-plane buffers.
//!
//! ## Features
//!
//! - **Scoped Access**: Buffer memory is only reachable through a lock
//!   guard that unlocks on every exit path.
//! - **Typed Extraction**: Copy a plane into a row-major [`TypedMap`] of any
//!   `bytemuck::Pod` type whose width matches the plane's elements.
//! - **Cloning**: Copy a buffer plane by plane into a new buffer with the
//!   same geometry and attachments, from any [`BufferAllocator`].
//! - **DMA Buffers**: Allocate from or wrap Linux DMA heap buffers for
//!   zero-copy sharing with other processes.
//!
//! ## Example
//!
//! ```
//! use depth_buffers::{clone_buffer, depth_map, HostAllocator, HostPixelBuffer, PixelFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
//! let frame = HostPixelBuffer::from_elements(3, 4, PixelFormat::DepthFloat32, &values)?;
//!
//! // Keep the frame beyond the capture callback
//! let kept = clone_buffer(&HostAllocator::new(), &frame)?;
//!
//! // Snapshot it as a depth map
//! let depth = depth_map(&kept)?;
//! assert_eq!(depth[2][1], 7.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Ownership
//!
//! Input buffers are always borrowed and never freed or written by this
//! crate. Every [`TypedMap`] and cloned buffer returned is owned by the
//! caller and shares no memory with its source.
//!
//! ## Safety
//!
//! Reinterpreting buffer memory is confined to [`buffer::LockedBuffer`],
//! the buffer backends, and `bytemuck` casts in [`extract`]. Implementing
//! [`PixelBuffer`] is `unsafe` because the lock guard trusts the memory
//! extents a buffer reports.

pub mod buffer;
pub mod clone;
pub mod dma;
pub mod error;
pub mod extract;
pub mod format;
pub mod host;

pub use buffer::{
    with_locked_access, Attachments, BufferAllocator, BufferSpec, ImageBuffer, LockMode,
    LockedBuffer, PixelBuffer,
};
pub use clone::clone_buffer;
pub use error::{Error, Result};
pub use extract::{depth_map, extract, extract_plane, TypedMap};
pub use format::{FourCC, PixelFormat, PlaneGeometry};
pub use host::{HostAllocator, HostPixelBuffer};
