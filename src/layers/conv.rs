//! Convolutional layers for processing spatial data
//!
//! This module provides the 2D convolution and transposed convolution used by
//! every generator and discriminator topology. Weights follow the usual
//! framework layout so that fan computations in
//! [`initialization`](super::initialization) agree with it:
//! `Conv2d` stores `[out_channels, in_channels, kh, kw]` and `ConvTranspose2d`
//! stores `[in_channels, out_channels, kh, kw]`.

use ndarray::{s, Array1, Array2, Array4, ArrayView2, ArrayView4, Axis};
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use super::traits::{expect_channels, LayerKind, Module, ParamsMut};

/// Spectral normalization state for one weight tensor.
///
/// Keeps the left and right singular vector estimates between calls. During
/// training every forward performs one power iteration before measuring
/// sigma; in inference the stored vectors are used as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectralNorm {
    pub u: Array1<f32>,
    pub v: Array1<f32>,
    pub eps: f32,
}

impl SpectralNorm {
    pub fn new(rows: usize, cols: usize) -> Self {
        let eps = 1e-12;
        SpectralNorm {
            u: normalize(Array1::random(rows, StandardNormal), eps),
            v: normalize(Array1::random(cols, StandardNormal), eps),
            eps,
        }
    }

    /// Estimate the largest singular value of `weight`, refining the
    /// singular vectors first when `update` is set.
    pub fn sigma(&mut self, weight: ArrayView2<f32>, update: bool) -> f32 {
        if update {
            self.v = normalize(weight.t().dot(&self.u), self.eps);
            self.u = normalize(weight.dot(&self.v), self.eps);
        }
        self.u.dot(&weight.dot(&self.v))
    }
}

fn normalize(x: Array1<f32>, eps: f32) -> Array1<f32> {
    let norm = x.dot(&x).sqrt().max(eps);
    x / norm
}

fn default_weight(shape: (usize, usize, usize, usize), fan_in: usize) -> Array4<f32> {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    Array4::random(shape, Uniform::new(-bound, bound))
}

fn default_bias(size: usize, fan_in: usize) -> Array1<f32> {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    Array1::random(size, Uniform::new(-bound, bound))
}

/// Kernel and stride must both be non-zero in each direction
pub(crate) fn check_window(layer: &str, kernel_size: (usize, usize), stride: (usize, usize)) -> Result<()> {
    if kernel_size.0 == 0 || kernel_size.1 == 0 || stride.0 == 0 || stride.1 == 0 {
        return Err(NetError::invalid_parameter(
            layer.to_string(),
            format!("kernel {:?} and stride {:?} must be non-zero", kernel_size, stride),
        ));
    }
    Ok(())
}

/// Weight divided by its spectral norm when spectral normalization is on.
fn effective_weight(
    weight: &Array4<f32>,
    spectral: Option<&mut SpectralNorm>,
    transposed: bool,
    training: bool,
) -> Result<Array4<f32>> {
    let sn = match spectral {
        Some(sn) => sn,
        None => return Ok(weight.clone()),
    };
    let view = if transposed {
        weight.view().permuted_axes([1, 0, 2, 3])
    } else {
        weight.view()
    };
    let rows = view.shape()[0];
    let cols = view.len() / rows.max(1);
    let matrix = view
        .as_standard_layout()
        .into_owned()
        .into_shape((rows, cols))
        .map_err(|e| NetError::Numerical(e.to_string()))?;
    let sigma = sn.sigma(matrix.view(), training);
    if !sigma.is_finite() || sigma.abs() < sn.eps {
        return Err(NetError::Numerical(format!("spectral norm sigma is {}", sigma)));
    }
    Ok(weight / sigma)
}

/// Pad input with zeros
fn pad_input(input: ArrayView4<f32>, padding: (usize, usize)) -> Array4<f32> {
    if padding == (0, 0) {
        return input.to_owned();
    }
    let (batch_size, channels, height, width) = input.dim();
    let mut padded = Array4::zeros((batch_size, channels, height + 2 * padding.0, width + 2 * padding.1));
    padded
        .slice_mut(s![.., .., padding.0..padding.0 + height, padding.1..padding.1 + width])
        .assign(&input);
    padded
}

/// 2D Convolutional Layer
///
/// Applies 2D convolution over an input composed of several input planes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conv2d {
    /// Convolution kernels `[out_channels, in_channels, kernel_height, kernel_width]`
    pub weight: Array4<f32>,

    /// Bias terms for each output channel
    pub bias: Option<Array1<f32>>,

    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: (usize, usize),
    pub stride: (usize, usize),
    pub padding: (usize, usize),

    /// Spectral normalization applied to the weight at forward time
    pub spectral: Option<SpectralNorm>,

    training: bool,
}

impl Conv2d {
    /// Create a square-kernel convolution with framework-default uniform weights
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Self {
        let fan_in = in_channels * kernel_size * kernel_size;
        Conv2d {
            weight: default_weight((out_channels, in_channels, kernel_size, kernel_size), fan_in),
            bias: bias.then(|| default_bias(out_channels, fan_in)),
            in_channels,
            out_channels,
            kernel_size: (kernel_size, kernel_size),
            stride: (stride, stride),
            padding: (padding, padding),
            spectral: None,
            training: true,
        }
    }

    /// Enable or disable spectral normalization of the weight
    pub fn with_spectral_norm(mut self, enabled: bool) -> Self {
        self.spectral = enabled.then(|| {
            SpectralNorm::new(self.out_channels, self.in_channels * self.kernel_size.0 * self.kernel_size.1)
        });
        self
    }

    /// Output spatial size for an input of `(height, width)`
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        check_window("Conv2d", self.kernel_size, self.stride)?;
        let padded_h = height + 2 * self.padding.0;
        let padded_w = width + 2 * self.padding.1;
        if padded_h < self.kernel_size.0 || padded_w < self.kernel_size.1 {
            return Err(NetError::dimension_mismatch(
                format!("spatial size of at least {:?} after padding", self.kernel_size),
                format!("({}, {})", padded_h, padded_w),
            ));
        }
        Ok((
            (padded_h - self.kernel_size.0) / self.stride.0 + 1,
            (padded_w - self.kernel_size.1) / self.stride.1 + 1,
        ))
    }

    /// Perform 2D convolution via an im2col matrix product
    fn convolve2d(&self, input: ArrayView4<f32>, weight: &Array4<f32>) -> Result<Array4<f32>> {
        let (batch_size, _, in_height, in_width) = input.dim();
        let (out_height, out_width) = self.output_size(in_height, in_width)?;
        let (kh, kw) = self.kernel_size;
        let patch = self.in_channels * kh * kw;

        let padded = pad_input(input, self.padding);
        let weight_mat = weight
            .view()
            .into_shape((self.out_channels, patch))
            .map_err(|e| NetError::Numerical(e.to_string()))?;

        let mut output = Array4::zeros((batch_size, self.out_channels, out_height, out_width));
        for b in 0..batch_size {
            let mut cols = Array2::<f32>::zeros((patch, out_height * out_width));
            for ic in 0..self.in_channels {
                for ki in 0..kh {
                    for kj in 0..kw {
                        let row = (ic * kh + ki) * kw + kj;
                        for oh in 0..out_height {
                            let ih = oh * self.stride.0 + ki;
                            for ow in 0..out_width {
                                cols[[row, oh * out_width + ow]] = padded[[b, ic, ih, ow * self.stride.1 + kj]];
                            }
                        }
                    }
                }
            }

            let mut result = weight_mat.dot(&cols);
            if let Some(bias) = &self.bias {
                result += &bias.view().insert_axis(Axis(1));
            }
            let result = result
                .into_shape((self.out_channels, out_height, out_width))
                .map_err(|e| NetError::Numerical(e.to_string()))?;
            output.index_axis_mut(Axis(0), b).assign(&result);
        }

        Ok(output)
    }
}

impl Module for Conv2d {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv
    }

    fn name(&self) -> String {
        let mut name = format!(
            "Conv2d({}, {}, kernel_size={:?}, stride={:?}, padding={:?}",
            self.in_channels, self.out_channels, self.kernel_size, self.stride, self.padding
        );
        if self.bias.is_none() {
            name.push_str(", bias=False");
        }
        if self.spectral.is_some() {
            name.push_str(", spectral_norm=True");
        }
        name.push(')');
        name
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        expect_channels("Conv2d", &input, self.in_channels)?;
        let weight = effective_weight(&self.weight, self.spectral.as_mut(), false, self.training)?;
        self.convolve2d(input, &weight)
    }

    fn params_mut(&mut self) -> Option<ParamsMut<'_>> {
        Some(ParamsMut {
            weight: self.weight.view_mut().into_dyn(),
            bias: self.bias.as_mut().map(|b| b.view_mut()),
        })
    }

    fn own_parameters(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// 2D Transposed Convolution
///
/// The up-sampling counterpart of [`Conv2d`]; with kernel 4, stride 2 and
/// padding 1 it exactly doubles the spatial size.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConvTranspose2d {
    /// Kernels `[in_channels, out_channels, kernel_height, kernel_width]`
    pub weight: Array4<f32>,
    pub bias: Option<Array1<f32>>,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: (usize, usize),
    pub stride: (usize, usize),
    pub padding: (usize, usize),
    pub spectral: Option<SpectralNorm>,
    training: bool,
}

impl ConvTranspose2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Self {
        // dim 1 of the stored weight is the output channel
        let fan_in = out_channels * kernel_size * kernel_size;
        ConvTranspose2d {
            weight: default_weight((in_channels, out_channels, kernel_size, kernel_size), fan_in),
            bias: bias.then(|| default_bias(out_channels, fan_in)),
            in_channels,
            out_channels,
            kernel_size: (kernel_size, kernel_size),
            stride: (stride, stride),
            padding: (padding, padding),
            spectral: None,
            training: true,
        }
    }

    pub fn with_spectral_norm(mut self, enabled: bool) -> Self {
        self.spectral = enabled.then(|| {
            SpectralNorm::new(self.out_channels, self.in_channels * self.kernel_size.0 * self.kernel_size.1)
        });
        self
    }

    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        check_window("ConvTranspose2d", self.kernel_size, self.stride)?;
        if height == 0 || width == 0 {
            return Err(NetError::dimension_mismatch("non-empty spatial input", "zero-sized input"));
        }
        let full_h = (height - 1) * self.stride.0 + self.kernel_size.0;
        let full_w = (width - 1) * self.stride.1 + self.kernel_size.1;
        if full_h <= 2 * self.padding.0 || full_w <= 2 * self.padding.1 {
            return Err(NetError::dimension_mismatch(
                format!("output larger than twice the padding {:?}", self.padding),
                format!("({}, {})", full_h, full_w),
            ));
        }
        Ok((full_h - 2 * self.padding.0, full_w - 2 * self.padding.1))
    }

    /// Scatter-add each input pixel's kernel response (col2im)
    fn convolve_transpose2d(&self, input: ArrayView4<f32>, weight: &Array4<f32>) -> Result<Array4<f32>> {
        let (batch_size, _, in_height, in_width) = input.dim();
        let (out_height, out_width) = self.output_size(in_height, in_width)?;
        let (kh, kw) = self.kernel_size;
        let full_h = (in_height - 1) * self.stride.0 + kh;
        let full_w = (in_width - 1) * self.stride.1 + kw;
        let patch = self.out_channels * kh * kw;

        let weight_mat = weight
            .view()
            .into_shape((self.in_channels, patch))
            .map_err(|e| NetError::Numerical(e.to_string()))?;

        let mut output = Array4::zeros((batch_size, self.out_channels, out_height, out_width));
        for b in 0..batch_size {
            let x = input
                .index_axis(Axis(0), b)
                .as_standard_layout()
                .into_owned()
                .into_shape((self.in_channels, in_height * in_width))
                .map_err(|e| NetError::Numerical(e.to_string()))?;
            let cols = weight_mat.t().dot(&x);

            let mut full = ndarray::Array3::<f32>::zeros((self.out_channels, full_h, full_w));
            for oc in 0..self.out_channels {
                for ki in 0..kh {
                    for kj in 0..kw {
                        let row = (oc * kh + ki) * kw + kj;
                        for ih in 0..in_height {
                            let oh = ih * self.stride.0 + ki;
                            for iw in 0..in_width {
                                full[[oc, oh, iw * self.stride.1 + kj]] += cols[[row, ih * in_width + iw]];
                            }
                        }
                    }
                }
            }

            let mut cropped = full
                .slice(s![
                    ..,
                    self.padding.0..self.padding.0 + out_height,
                    self.padding.1..self.padding.1 + out_width
                ])
                .to_owned();
            if let Some(bias) = &self.bias {
                for (oc, mut plane) in cropped.axis_iter_mut(Axis(0)).enumerate() {
                    plane += bias[oc];
                }
            }
            output.index_axis_mut(Axis(0), b).assign(&cropped);
        }

        Ok(output)
    }
}

impl Module for ConvTranspose2d {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv
    }

    fn name(&self) -> String {
        let mut name = format!(
            "ConvTranspose2d({}, {}, kernel_size={:?}, stride={:?}, padding={:?}",
            self.in_channels, self.out_channels, self.kernel_size, self.stride, self.padding
        );
        if self.bias.is_none() {
            name.push_str(", bias=False");
        }
        if self.spectral.is_some() {
            name.push_str(", spectral_norm=True");
        }
        name.push(')');
        name
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        expect_channels("ConvTranspose2d", &input, self.in_channels)?;
        let weight = effective_weight(&self.weight, self.spectral.as_mut(), true, self.training)?;
        self.convolve_transpose2d(input, &weight)
    }

    fn params_mut(&mut self) -> Option<ParamsMut<'_>> {
        Some(ParamsMut {
            weight: self.weight.view_mut().into_dyn(),
            bias: self.bias.as_mut().map(|b| b.view_mut()),
        })
    }

    fn own_parameters(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
