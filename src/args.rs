// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use depth_buffers::PixelFormat;
use std::path::PathBuf;

/// Raw frame pixel formats accepted on the command line.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum FormatSetting {
    /// 32-bit float depth (fdep)
    Depth32,
    /// 16-bit float depth (hdep)
    Depth16,
    /// 32-bit float disparity (fdis)
    Disparity32,
    /// 8-bit confidence (L008)
    Confidence8,
    /// 8-bit 4:2:0 bi-planar YCbCr, video range (420v)
    Yuv420v,
    /// 8-bit 4:2:0 bi-planar YCbCr, full range (420f)
    Yuv420f,
    /// 10-bit 4:2:0 bi-planar YCbCr in 16-bit containers (x420)
    Yuv420x10,
}

impl From<FormatSetting> for PixelFormat {
    fn from(value: FormatSetting) -> Self {
        match value {
            FormatSetting::Depth32 => PixelFormat::DepthFloat32,
            FormatSetting::Depth16 => PixelFormat::DepthFloat16,
            FormatSetting::Disparity32 => PixelFormat::DisparityFloat32,
            FormatSetting::Confidence8 => PixelFormat::OneComponent8,
            FormatSetting::Yuv420v => PixelFormat::Yuv420BiPlanar8VideoRange,
            FormatSetting::Yuv420f => PixelFormat::Yuv420BiPlanar8FullRange,
            FormatSetting::Yuv420x10 => PixelFormat::Yuv420BiPlanar10VideoRange,
        }
    }
}

/// What to do with the loaded frame.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum Action {
    /// Print the frame's first plane as rows of numbers
    Extract,
    /// Clone the frame and report whether the copy matches
    Clone,
    /// Print the frame's geometry
    Info,
}

/// Command-line arguments for the depth buffer tool.
///
/// Loads a raw frame dump (planes stored back to back, rows including any
/// padding) and runs extraction or cloning on it. Arguments can be given on
/// the command line or through environment variables.
///
/// # Example
///
/// ```bash
/// depth-buffers --input depth.bin --size 256 192 --format depth32 > depth.json
///
/// export FORMAT=yuv420f
/// depth-buffers --input color.bin --size 1920 1440 --action clone
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Raw frame file
    #[arg(short, long, env = "INPUT")]
    pub input: PathBuf,

    /// Frame resolution in pixels (width height)
    #[arg(
        long,
        env = "FRAME_SIZE",
        default_value = "256 192",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub size: Vec<usize>,

    /// Frame pixel format
    #[arg(short, long, env = "FORMAT", default_value = "depth32", value_enum)]
    pub format: FormatSetting,

    /// Row stride alignment in bytes used by the dump (1 for packed rows)
    #[arg(long, env = "ROW_ALIGNMENT", default_value = "1")]
    pub row_alignment: usize,

    /// Operation to run on the frame
    #[arg(short, long, env = "ACTION", default_value = "extract", value_enum)]
    pub action: Action,

    /// Write JSON output to this file instead of stdout
    #[arg(short, long, env = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn width(&self) -> usize {
        self.size[0]
    }

    pub fn height(&self) -> usize {
        self.size[1]
    }
}
