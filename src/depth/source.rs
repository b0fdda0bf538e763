use anyhow::{anyhow, Result};

use crate::detect::RawTensor;

/// Per-pixel depth accessor.
pub trait DepthSource {
    /// `(width, height)` in samples.
    fn dimensions(&self) -> (usize, usize);

    /// Depth at `(x, y)`, or `None` when out of bounds or the source has no reading there.
    fn sample(&self, x: usize, y: usize) -> Option<f32>;
}

/// Dense depth map emitted by a depth-estimation model.
///
/// Values are passed through unchanged, in whatever unit the model emits.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return Err(anyhow!(
                "depth map {}x{} needs {} samples, got {}",
                width,
                height,
                width.saturating_mul(height),
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build from a model output of shape `[1, H, W]`, `[1, H, W, 1]` or `[H, W]`.
    pub fn from_tensor(tensor: RawTensor) -> Result<Self> {
        let (height, width) = match tensor.shape.as_slice() {
            [h, w] | [1, h, w] | [1, h, w, 1] => (*h, *w),
            other => return Err(anyhow!("unsupported depth tensor shape {:?}", other)),
        };
        Self::new(width, height, tensor.data)
    }
}

impl DepthSource for DepthMap {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn sample(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }
}

/// 16-bit hardware depth image in millimeters.
///
/// Samples are little-endian `u16`, rows are `row_stride` bytes apart. A zero
/// sample means the sensor has no reading for that pixel. Readings are
/// converted to meters here, so fused distances are always in meters.
///
/// The buffer may be borrowed (`&[u8]`) for synchronous use or owned
/// (`Vec<u8>`) to travel with a frame to the background worker.
#[derive(Clone, Debug)]
pub struct SensorDepth<B = Vec<u8>> {
    bytes: B,
    width: usize,
    height: usize,
    row_stride: usize,
}

impl<B: AsRef<[u8]>> SensorDepth<B> {
    pub fn new(bytes: B, width: usize, height: usize, row_stride: usize) -> Result<Self> {
        if row_stride < width.saturating_mul(2) {
            return Err(anyhow!(
                "row stride {} too small for {} 16-bit samples",
                row_stride,
                width
            ));
        }
        let needed = if height == 0 {
            0
        } else {
            (height - 1)
                .checked_mul(row_stride)
                .and_then(|v| v.checked_add(width * 2))
                .ok_or_else(|| anyhow!("sensor depth dimensions overflow"))?
        };
        if bytes.as_ref().len() < needed {
            return Err(anyhow!(
                "sensor depth buffer has {} bytes, needs {}",
                bytes.as_ref().len(),
                needed
            ));
        }
        Ok(Self {
            bytes,
            width,
            height,
            row_stride,
        })
    }

    /// Raw reading in millimeters.
    pub fn millimeters(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y * self.row_stride + x * 2;
        let raw = self.bytes.as_ref().get(offset..offset + 2)?;
        Some(u16::from_le_bytes([raw[0], raw[1]]))
    }
}

impl<B: AsRef<[u8]>> DepthSource for SensorDepth<B> {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn sample(&self, x: usize, y: usize) -> Option<f32> {
        match self.millimeters(x, y)? {
            0 => None,
            mm => Some(mm as f32 / 1000.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_map_accepts_model_shapes() {
        for shape in [vec![2, 3], vec![1, 2, 3], vec![1, 2, 3, 1]] {
            let map = DepthMap::from_tensor(RawTensor {
                shape,
                data: (0..6).map(|v| v as f32).collect(),
            })
            .unwrap();
            assert_eq!(map.dimensions(), (3, 2));
            assert_eq!(map.sample(2, 1), Some(5.0));
            assert_eq!(map.sample(3, 0), None);
        }
        assert!(DepthMap::from_tensor(RawTensor {
            shape: vec![1, 3, 2, 2],
            data: vec![0.0; 12],
        })
        .is_err());
    }

    #[test]
    fn sensor_depth_converts_millimeters_and_skips_zero() {
        // 2x2 image, stride 6 bytes (2 bytes padding per row)
        let mut bytes = vec![0u8; 12];
        bytes[0..2].copy_from_slice(&1500u16.to_le_bytes());
        bytes[6..8].copy_from_slice(&250u16.to_le_bytes());
        bytes[8..10].copy_from_slice(&0u16.to_le_bytes());
        bytes[2..4].copy_from_slice(&600u16.to_le_bytes());
        let depth = SensorDepth::new(&bytes, 2, 2, 6).unwrap();

        assert_eq!(depth.sample(0, 0), Some(1.5));
        assert_eq!(depth.sample(1, 0), Some(0.6));
        assert_eq!(depth.sample(0, 1), Some(0.25));
        assert_eq!(depth.sample(1, 1), None);
        assert_eq!(depth.millimeters(1, 1), Some(0));
        assert_eq!(depth.sample(2, 0), None);
    }

    #[test]
    fn owned_and_borrowed_buffers_read_alike() {
        let bytes: Vec<u8> = [700u16, 0, 900, 1100]
            .iter()
            .flat_map(|mm| mm.to_le_bytes())
            .collect();
        let borrowed = SensorDepth::new(bytes.as_slice(), 2, 2, 4).unwrap();
        let owned = SensorDepth::new(bytes.clone(), 2, 2, 4).unwrap();
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(borrowed.sample(x, y), owned.sample(x, y));
        }
        assert_eq!(owned.sample(1, 1), Some(1.1));
    }

    #[test]
    fn sensor_depth_validates_buffer_size() {
        assert!(SensorDepth::new(&[0u8; 7], 2, 2, 4).is_err());
        assert!(SensorDepth::new(&[0u8; 8], 2, 2, 3).is_err());
        assert!(SensorDepth::new(&[0u8; 8], 2, 2, 4).is_ok());
    }
}
