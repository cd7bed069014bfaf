//! The per-worker render target: named float buffers (`R`, `G`, `B`
//! always present), merge, and PNG output (`spec.md` §3, §6).
//!
//! EXR is the format `spec.md` §6 names for the final output, but EXR
//! I/O is explicitly out of scope (`spec.md` §1); `ImageSink` is the
//! abstract boundary and [`PngSink`] is the in-tree implementation.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AssetError;
use crate::pipeline::{BufferOp, BufferOpKind};

/// A named float buffer, `width * height` pixels wide, one `f32` per
/// pixel (single-channel; multi-channel shader writes land in several
/// buffers, e.g. `R`/`G`/`B`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Buffer {
    data: Vec<f32>,
}

impl Buffer {
    fn zeroed(len: usize) -> Self {
        Self { data: vec![0.0; len] }
    }
}

/// The render target for one worker's assigned x-range (or the merged
/// whole after `SYNC_IMAGE`). Pixels outside the worker's assigned
/// range stay at zero until merge (`spec.md` §3 invariant 5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    width: u32,
    height: u32,
    buffers: HashMap<String, Buffer>,
}

impl Image {
    pub fn new(width: u32, height: u32, buffer_names: &[String]) -> Self {
        let len = (width * height) as usize;
        let buffers = buffer_names
            .iter()
            .map(|name| (name.clone(), Buffer::zeroed(len)))
            .collect();
        Self { width, height, buffers }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn get(&self, buffer: &str, x: u32, y: u32) -> Option<f32> {
        self.buffers.get(buffer).map(|b| b.data[self.index(x, y)])
    }

    /// Applies a single pending [`BufferOp`] to pixel `(x, y)` — `Write`
    /// overwrites (order-undefined against other writes to the same
    /// pixel, `spec.md` §5), `Accumulate` adds (commutative, safe under
    /// any ray ordering).
    pub fn apply(&mut self, x: u32, y: u32, op: &BufferOp) {
        let idx = self.index(x, y);
        let value = op.value[0];
        let Some(buffer) = self.buffers.get_mut(op.name()) else {
            return;
        };
        match op.kind {
            BufferOpKind::Write => buffer.data[idx] = value,
            BufferOpKind::Accumulate => buffer.data[idx] += value,
        }
    }

    /// Pixel-wise accumulation of `other` into `self`, used by the
    /// renderer to merge per-worker partial images (`spec.md` §4.5
    /// `RENDER_STOP`). A no-op when `other` is an all-zero image
    /// (`spec.md` §8 idempotence property).
    pub fn merge(&mut self, other: &Image) {
        for (name, buffer) in &other.buffers {
            if let Some(mine) = self.buffers.get_mut(name) {
                for (dst, src) in mine.data.iter_mut().zip(buffer.data.iter()) {
                    *dst += src;
                }
            }
        }
    }
}

/// The abstract final-image sink; EXR is out of scope, so only a PNG
/// implementation is provided (`spec.md` §1, §6).
pub trait ImageSink {
    fn write(image: &Image, path: &Path) -> Result<(), AssetError>;
}

/// Writes `R`/`G`/`B` (clamped to `[0, 1]`) as an 8-bit PNG.
pub struct PngSink;

impl ImageSink for PngSink {
    fn write(image: &Image, path: &Path) -> Result<(), AssetError> {
        let width = image.width();
        let height = image.height();
        let mut buffer = image::RgbImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let r = image.get("R", x, y).unwrap_or(0.0);
                let g = image.get("G", x, y).unwrap_or(0.0);
                let b = image.get("B", x, y).unwrap_or(0.0);
                let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
                buffer.put_pixel(x, y, image::Rgb([to_u8(r), to_u8(g), to_u8(b)]));
            }
        }

        buffer.save(path).map_err(|e| AssetError::MalformedMesh {
            id: 0,
            reason: format!("failed writing image: {e}"),
        })
    }
}
