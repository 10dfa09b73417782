//! Pooling and resampling layers
//!
//! Average pooling for DenseNet transitions, global average pooling for the
//! super-resolution discriminator head, and pixel shuffle for sub-pixel
//! up-sampling in the super-resolution generator.

use ndarray::{s, Array4, ArrayView4};
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use super::conv::check_window;
use super::traits::{LayerKind, Module};

/// 2D Average Pooling Layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AvgPool2d {
    /// Pooling window size
    pub pool_size: (usize, usize),

    /// Stride for pooling
    pub stride: (usize, usize),
}

impl AvgPool2d {
    /// Create a new 2D average pooling layer; the stride defaults to the window
    pub fn new(pool_size: (usize, usize), stride: Option<(usize, usize)>) -> Self {
        AvgPool2d {
            pool_size,
            stride: stride.unwrap_or(pool_size),
        }
    }
}

impl Module for AvgPool2d {
    fn kind(&self) -> LayerKind {
        LayerKind::Pooling
    }

    fn name(&self) -> String {
        format!("AvgPool2d(kernel_size={:?}, stride={:?})", self.pool_size, self.stride)
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_window("AvgPool2d", self.pool_size, self.stride)?;
        let (batch_size, channels, in_height, in_width) = input.dim();
        if in_height < self.pool_size.0 || in_width < self.pool_size.1 {
            return Err(NetError::dimension_mismatch(
                format!("spatial size of at least {:?}", self.pool_size),
                format!("({}, {})", in_height, in_width),
            ));
        }

        let out_height = (in_height - self.pool_size.0) / self.stride.0 + 1;
        let out_width = (in_width - self.pool_size.1) / self.stride.1 + 1;
        let pool_area = (self.pool_size.0 * self.pool_size.1) as f32;

        let mut output = Array4::zeros((batch_size, channels, out_height, out_width));
        for b in 0..batch_size {
            for c in 0..channels {
                for oh in 0..out_height {
                    for ow in 0..out_width {
                        let h_start = oh * self.stride.0;
                        let w_start = ow * self.stride.1;
                        let window = input.slice(s![
                            b,
                            c,
                            h_start..h_start + self.pool_size.0,
                            w_start..w_start + self.pool_size.1
                        ]);
                        output[[b, c, oh, ow]] = window.sum() / pool_area;
                    }
                }
            }
        }

        Ok(output)
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// Global average pooling to a `1x1` map (adaptive average pool of size 1)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GlobalAvgPool2d;

impl GlobalAvgPool2d {
    pub fn new() -> Self {
        GlobalAvgPool2d
    }
}

impl Module for GlobalAvgPool2d {
    fn kind(&self) -> LayerKind {
        LayerKind::Pooling
    }

    fn name(&self) -> String {
        "AdaptiveAvgPool2d(output_size=1)".to_string()
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch_size, channels, height, width) = input.dim();
        let area = (height * width).max(1) as f32;
        let mut output = Array4::zeros((batch_size, channels, 1, 1));
        for b in 0..batch_size {
            for c in 0..channels {
                output[[b, c, 0, 0]] = input.slice(s![b, c, .., ..]).sum() / area;
            }
        }
        Ok(output)
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// Rearranges `[N, C*r*r, H, W]` into `[N, C, H*r, W*r]`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PixelShuffle {
    pub upscale_factor: usize,
}

impl PixelShuffle {
    pub fn new(upscale_factor: usize) -> Self {
        PixelShuffle { upscale_factor }
    }
}

impl Module for PixelShuffle {
    fn kind(&self) -> LayerKind {
        LayerKind::Pooling
    }

    fn name(&self) -> String {
        format!("PixelShuffle(upscale_factor={})", self.upscale_factor)
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let r = self.upscale_factor;
        let (batch_size, channels, height, width) = input.dim();
        if r == 0 || channels % (r * r) != 0 {
            return Err(NetError::dimension_mismatch(
                format!("channels divisible by {}", r * r),
                format!("{} channels", channels),
            ));
        }

        let out_channels = channels / (r * r);
        let mut output = Array4::zeros((batch_size, out_channels, height * r, width * r));
        for b in 0..batch_size {
            for c in 0..channels {
                let oc = c / (r * r);
                let offset = c % (r * r);
                let (dy, dx) = (offset / r, offset % r);
                for h in 0..height {
                    for w in 0..width {
                        output[[b, oc, h * r + dy, w * r + dx]] = input[[b, c, h, w]];
                    }
                }
            }
        }
        Ok(output)
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
