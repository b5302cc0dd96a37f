// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::{Action, Args};
use clap::Parser;
use depth_buffers::{
    clone_buffer, extract, with_locked_access, BufferSpec, HostAllocator, HostPixelBuffer,
    LockMode, PixelBuffer, PixelFormat,
};
use serde_json::json;
use std::{
    error::Error,
    fs::{self, File},
    io::{self, Write},
    time::Instant,
};
use tracing::{debug, info, warn, Level};

mod args;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let format = PixelFormat::from(args.format);
    let spec = BufferSpec::new(args.width(), args.height(), format)
        .with_row_alignment(args.row_alignment);
    let data = fs::read(&args.input)?;
    let frame = load_frame(&spec, &data)?;
    info!("loaded {} from {}", frame, args.input.display());

    let report = match args.action {
        Action::Extract => extract_report(&frame)?,
        Action::Clone => clone_report(&frame)?,
        Action::Info => geometry(&frame),
    };

    match &args.output {
        Some(path) => serde_json::to_writer(File::create(path)?, &report)?,
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer(&mut stdout, &report)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

/// Splits a dump holding the planes back to back into a host buffer.
fn load_frame(spec: &BufferSpec, data: &[u8]) -> Result<HostPixelBuffer, Box<dyn Error>> {
    let mut planes = Vec::with_capacity(spec.plane_count());
    let mut rest = data;
    for plane in 0..spec.plane_count() {
        let len = spec.plane_geometry(plane).map_or(0, |g| g.len());
        if rest.len() < len {
            return Err(format!(
                "frame holds {} bytes, {} {}x{} needs at least {} more for plane {plane}",
                data.len(),
                spec.format(),
                spec.width(),
                spec.height(),
                len - rest.len()
            )
            .into());
        }
        let (head, tail) = rest.split_at(len);
        planes.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        warn!("ignoring {} trailing bytes", rest.len());
    }
    Ok(HostPixelBuffer::with_contents(spec, &planes)?)
}

fn extract_report(frame: &HostPixelBuffer) -> Result<serde_json::Value, Box<dyn Error>> {
    let now = Instant::now();
    let rows = match frame.pixel_format() {
        PixelFormat::DepthFloat32 | PixelFormat::DisparityFloat32 => {
            json!(extract::<f32, _>(frame)?.to_rows())
        }
        // half floats are reported as raw bit patterns
        PixelFormat::DepthFloat16 | PixelFormat::Yuv420BiPlanar10VideoRange => {
            json!(extract::<u16, _>(frame)?.to_rows())
        }
        PixelFormat::OneComponent8
        | PixelFormat::Yuv420BiPlanar8VideoRange
        | PixelFormat::Yuv420BiPlanar8FullRange => json!(extract::<u8, _>(frame)?.to_rows()),
    };
    debug!("extract: {:?}", now.elapsed());
    Ok(rows)
}

fn clone_report(frame: &HostPixelBuffer) -> Result<serde_json::Value, Box<dyn Error>> {
    let now = Instant::now();
    let copy = clone_buffer(&HostAllocator::new(), frame)?;
    debug!("clone: {:?}", now.elapsed());

    let identical = with_locked_access(frame, LockMode::ReadOnly, |src| {
        with_locked_access(&copy, LockMode::ReadOnly, |dst| {
            (0..src.plane_count())
                .map(|plane| -> depth_buffers::Result<bool> {
                    Ok(src.plane_bytes(plane)? == dst.plane_bytes(plane)?)
                })
                .collect::<depth_buffers::Result<Vec<bool>>>()
        })
    })?;

    Ok(json!({
        "source": geometry(frame),
        "copy": geometry(&copy),
        "identical": identical,
    }))
}

fn geometry(buffer: &dyn PixelBuffer) -> serde_json::Value {
    let planes: Vec<_> = (0..buffer.plane_count())
        .filter_map(|plane| buffer.plane_geometry(plane))
        .map(|g| {
            json!({
                "width": g.width,
                "height": g.height,
                "bytes_per_row": g.bytes_per_row,
            })
        })
        .collect();
    json!({
        "width": buffer.width(),
        "height": buffer.height(),
        "format": buffer.pixel_format().to_string(),
        "bytes_per_row": buffer.bytes_per_row(),
        "planes": planes,
        "attachments": buffer.attachments().to_json(),
    })
}
