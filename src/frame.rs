//! Decoded video frames and per-spot patch extraction.
//!
//! - `Frame`: RGB24 pixel buffer tagged with its capture sequence number.
//! - `PatchSize`: the classifier's expected input shape.
//!
//! Patches are cropped from the spot region (clamped to the frame), resized,
//! and flattened channel-first with values scaled to `[0, 1]`, the layout the
//! occupancy models take as input.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::registry::Rect;

/// Default classifier input edge length in pixels.
pub const DEFAULT_PATCH_EDGE: u32 = 28;

/// Width and height of the tensor handed to the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchSize {
    pub width: u32,
    pub height: u32,
}

impl PatchSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of `f32` values in a CHW RGB tensor of this size.
    pub fn tensor_len(&self) -> usize {
        3 * self.width as usize * self.height as usize
    }
}

impl Default for PatchSize {
    fn default() -> Self {
        Self::new(DEFAULT_PATCH_EDGE, DEFAULT_PATCH_EDGE)
    }
}

/// One decoded frame. Pixels are tightly packed RGB24 rows.
pub struct Frame {
    image: RgbImage,
    pub width: u32,
    pub height: u32,
    /// Capture order within the session, starting at 1.
    pub sequence: u64,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        Ok(Self {
            image,
            width,
            height,
            sequence,
        })
    }

    pub fn byte_len(&self) -> usize {
        self.image.as_raw().len()
    }

    /// Crop `region`, resize it to `size`, and return a CHW tensor.
    ///
    /// Regions partially outside the frame are clamped. A region with no
    /// overlap is an error.
    pub fn patch_tensor(&self, region: &Rect, size: PatchSize) -> Result<Vec<f32>> {
        let clamped = region.clamp_to(self.width, self.height).ok_or_else(|| {
            anyhow!(
                "region {} lies outside the {}x{} frame",
                region,
                self.width,
                self.height
            )
        })?;

        let crop = imageops::crop_imm(
            &self.image,
            clamped.x,
            clamped.y,
            clamped.width,
            clamped.height,
        )
        .to_image();
        let patch = imageops::resize(&crop, size.width, size.height, FilterType::Triangle);

        let plane = (size.width * size.height) as usize;
        let mut tensor = vec![0.0f32; size.tensor_len()];
        for (x, y, pixel) in patch.enumerate_pixels() {
            let offset = (y * size.width + x) as usize;
            for channel in 0..3 {
                tensor[channel * plane + offset] = pixel[channel] as f32 / 255.0;
            }
        }
        Ok(tensor)
    }
}
