//! Letterbox preprocessing.
//!
//! An arbitrary aspect-ratio image is scaled uniformly to fit a square
//! `target_size x target_size` canvas, centered, with black borders. The
//! scale and offsets are returned as a [`Letterbox`] so that network outputs
//! can be mapped back to the original image, and original-space boxes can be
//! mapped forward into other square model inputs (the depth map).

use anyhow::{anyhow, Result};
use image::{imageops, Rgb, RgbImage};

/// Geometric transform from original image space to square network input space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub x_offset: u32,
    pub y_offset: u32,
    pub scale: f32,
    pub target_size: u32,
}

impl Letterbox {
    /// Compute the transform for an image of `width x height`.
    pub fn fit(width: u32, height: u32, target_size: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot letterbox a {}x{} image", width, height));
        }
        if target_size == 0 {
            return Err(anyhow!("letterbox target size must be greater than zero"));
        }
        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let (scaled_w, scaled_h) = scaled_dims(width, height, scale, target_size);
        Ok(Self {
            x_offset: (target_size - scaled_w) / 2,
            y_offset: (target_size - scaled_h) / 2,
            scale,
            target_size,
        })
    }

    /// Original-space point to target-space point.
    pub fn forward_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.x_offset as f32,
            y * self.scale + self.y_offset as f32,
        )
    }

    /// Target-space point back to original space.
    pub fn inverse_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.x_offset as f32) / self.scale,
            (y - self.y_offset as f32) / self.scale,
        )
    }

    /// Target-space length back to original space. Sizes carry no offset.
    pub fn inverse_length(&self, v: f32) -> f32 {
        v / self.scale
    }
}

fn scaled_dims(width: u32, height: u32, scale: f32, target_size: u32) -> (u32, u32) {
    let w = ((width as f32 * scale) as u32).clamp(1, target_size);
    let h = ((height as f32 * scale) as u32).clamp(1, target_size);
    (w, h)
}

/// Network input buffer plus the transform that produced it.
#[derive(Debug)]
pub struct PreprocessResult {
    /// Interleaved RGB floats in `[0, 1]`, laid out as `[1, T, T, 3]`.
    pub input: Vec<f32>,
    pub transform: Letterbox,
}

/// Letterbox `image` into a `target_size` square and serialize it as normalized floats.
pub fn preprocess(image: &RgbImage, target_size: u32) -> Result<PreprocessResult> {
    let (width, height) = image.dimensions();
    let transform = Letterbox::fit(width, height, target_size)?;
    let (scaled_w, scaled_h) = scaled_dims(width, height, transform.scale, target_size);

    log::debug!(
        "letterbox {}x{} -> {}x{} in {}x{} (offset {},{})",
        width,
        height,
        scaled_w,
        scaled_h,
        target_size,
        target_size,
        transform.x_offset,
        transform.y_offset
    );

    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([0, 0, 0]));
    if (scaled_w, scaled_h) == (width, height) {
        imageops::replace(
            &mut canvas,
            image,
            transform.x_offset as i64,
            transform.y_offset as i64,
        );
    } else {
        let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);
        imageops::replace(
            &mut canvas,
            &resized,
            transform.x_offset as i64,
            transform.y_offset as i64,
        );
    }

    let input = canvas
        .into_raw()
        .into_iter()
        .map(|channel| channel as f32 / 255.0)
        .collect();

    Ok(PreprocessResult { input, transform })
}
