//! Source texture loading and sampling
//!
//! The compositor samples one decoded RGBA image. Loading is synchronous:
//! either the texture decodes and is ready before the first frame, or
//! startup fails. `ready()` is the explicit gate the compositor consults.

use anyhow::{Context, Result};
use std::path::Path;

/// A decoded source image plus its pixel dimensions.
#[derive(Debug, Clone)]
pub struct SourceTexture {
    width: u32,
    height: u32,
    /// Tightly packed RGBA8 rows.
    pixels: Vec<u8>,
}

impl SourceTexture {
    /// Decode an image file into RGBA8. Fails loudly; there is no deferred
    /// or partial load.
    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("Failed to load source image from {:?}", path))?
            .to_rgba8();

        let (width, height) = img.dimensions();
        tracing::info!("Loaded source texture {:?}: {}x{}", path, width, height);

        Ok(Self {
            width,
            height,
            pixels: img.into_raw(),
        })
    }

    /// Wrap an existing RGBA8 buffer. The buffer length must match the
    /// dimensions for the texture to report ready.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the texture is usable for sampling.
    pub fn ready(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == (self.width as usize * self.height as usize * 4)
    }

    /// Bilinear sample at normalized coordinates, edge-clamped.
    ///
    /// `u`/`v` outside `[0, 1]` clamp to the border texel.
    #[inline]
    pub fn sample_bilinear(&self, u: f64, v: f64) -> [u8; 4] {
        let w = self.width as usize;
        let h = self.height as usize;

        let x = (u.clamp(0.0, 1.0) * (w - 1) as f64).max(0.0);
        let y = (v.clamp(0.0, 1.0) * (h - 1) as f64).max(0.0);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(w - 1);
        let y1 = (y0 + 1).min(h - 1);

        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let stride = w * 4;
        let mut result = [0u8; 4];

        for c in 0..4 {
            let p00 = self.pixels[y0 * stride + x0 * 4 + c] as f64;
            let p10 = self.pixels[y0 * stride + x1 * 4 + c] as f64;
            let p01 = self.pixels[y1 * stride + x0 * 4 + c] as f64;
            let p11 = self.pixels[y1 * stride + x1 * 4 + c] as f64;

            let value = p00 * (1.0 - fx) * (1.0 - fy)
                + p10 * fx * (1.0 - fy)
                + p01 * (1.0 - fx) * fy
                + p11 * fx * fy;

            result[c] = value.round().clamp(0.0, 255.0) as u8;
        }

        result
    }
}
