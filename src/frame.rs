//! Camera frame container and normalization to upright RGB.
//!
//! Camera sources deliver either packed RGB24 or NV12 (YUV 4:2:0, interleaved
//! chroma) buffers together with the sensor rotation. Everything downstream of
//! this module works on an upright `RgbImage`.

use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Nv12,
}

/// Clockwise rotation needed to bring a sensor frame upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Map a rotation in degrees (as reported by camera metadata) to a `Rotation`.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            other => Err(anyhow!("unsupported frame rotation {} degrees", other)),
        }
    }
}

/// One captured frame, as handed over by the frame source.
pub struct Frame {
    pub id: u64,
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
}

impl Frame {
    pub fn new(
        id: u64,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        rotation: Rotation,
    ) -> Self {
        Self {
            id,
            pixels,
            width,
            height,
            format,
            rotation,
        }
    }

    /// Wrap an already upright RGB image.
    pub fn from_rgb_image(id: u64, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            id,
            pixels: image.into_raw(),
            width,
            height,
            format: PixelFormat::Rgb24,
            rotation: Rotation::None,
        }
    }

    /// Decode to RGB and apply the frame rotation.
    pub fn to_upright_rgb(&self) -> Result<RgbImage> {
        let rgb = normalize_to_rgb(&self.pixels, self.width, self.height, self.format)?;
        let image = RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", self.width, self.height))?;
        Ok(match self.rotation {
            Rotation::None => image,
            Rotation::Cw90 => imageops::rotate90(&image),
            Rotation::Cw180 => imageops::rotate180(&image),
            Rotation::Cw270 => imageops::rotate270(&image),
        })
    }
}

pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame has zero dimension {}x{}", width, height));
    }
    match format {
        PixelFormat::Rgb24 => {
            let expected = (width as usize)
                .checked_mul(height as usize)
                .and_then(|v| v.checked_mul(3))
                .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
            if pixels.len() != expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            Ok(pixels.to_vec())
        }
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height),
    }
}

/// NV12: full-resolution luma plane followed by an interleaved `UV` plane at
/// half resolution in both axes. Each chroma row serves two luma rows and each
/// `UV` pair serves two horizontally adjacent pixels.
fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 || h % 2 != 0 {
        return Err(anyhow!("NV12 frame must have even dimensions, got {}x{}", w, h));
    }
    let luma_len = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = luma_len
        .checked_add(luma_len / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let (luma, chroma) = pixels.split_at(luma_len);
    let mut rgb = vec![0u8; luma_len * 3];
    for ((luma_pair, rgb_pair), uv_row) in luma
        .chunks_exact(2 * w)
        .zip(rgb.chunks_exact_mut(2 * w * 3))
        .zip(chroma.chunks_exact(w))
    {
        for (luma_row, rgb_row) in luma_pair.chunks_exact(w).zip(rgb_pair.chunks_exact_mut(w * 3)) {
            for ((y, out), uv) in luma_row
                .iter()
                .zip(rgb_row.chunks_exact_mut(3))
                .zip(uv_row.chunks_exact(2).flat_map(|uv| [uv, uv]))
            {
                out.copy_from_slice(&yuv_to_rgb(*y, uv[0], uv[1]));
            }
        }
    }

    Ok(rgb)
}

/// Full-range BT.601 conversion.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        to_channel(y + 1.402 * v),
        to_channel(y - 0.344_136 * u - 0.714_136 * v),
        to_channel(y + 1.772 * u),
    ]
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_mid_gray_decodes_to_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn nv12_chroma_is_shared_by_two_by_two_blocks() -> Result<()> {
        // 4x2 luma, one chroma row: left block pure red chroma, right block neutral
        let mut nv12 = vec![100u8; 8];
        nv12.extend_from_slice(&[128, 200, 128, 128]);
        let rgb = normalize_to_rgb(&nv12, 4, 2, PixelFormat::Nv12)?;

        let red = yuv_to_rgb(100, 128, 200);
        assert!(red[0] > red[1] && red[0] > red[2]);
        for row in 0..2 {
            for col in 0..4 {
                let px = &rgb[(row * 4 + col) * 3..(row * 4 + col) * 3 + 3];
                if col < 2 {
                    assert_eq!(px, red);
                } else {
                    assert_eq!(px, [100, 100, 100]);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn nv12_rejects_odd_dimensions_and_bad_length() {
        assert!(normalize_to_rgb(&[0u8; 9], 3, 2, PixelFormat::Nv12).is_err());
        assert!(normalize_to_rgb(&[0u8; 5], 2, 2, PixelFormat::Nv12).is_err());
    }

    #[test]
    fn rgb_length_is_validated() {
        assert!(normalize_to_rgb(&[0u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert!(normalize_to_rgb(&[0u8; 9], 1, 3, PixelFormat::Rgb24).is_ok());
    }

    #[test]
    fn rotation_swaps_dimensions() -> Result<()> {
        let frame = Frame::new(
            1,
            vec![0u8; 4 * 2 * 3],
            4,
            2,
            PixelFormat::Rgb24,
            Rotation::from_degrees(90)?,
        );
        let upright = frame.to_upright_rgb()?;
        assert_eq!(upright.dimensions(), (2, 4));
        Ok(())
    }

    #[test]
    fn rotation_degrees_are_normalized() {
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Cw270);
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Cw90);
        assert!(Rotation::from_degrees(45).is_err());
    }
}
