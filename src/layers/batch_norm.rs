use ndarray::{Array1, Array4, ArrayView4, Axis};
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use super::traits::{expect_channels, LayerKind, Module, ParamsMut};

/// Batch Normalization over NCHW feature maps
///
/// Normalizes each channel across the batch and spatial dimensions to have
/// mean 0 and variance 1, then scales and shifts using learnable parameters
/// gamma and beta. Running statistics are tracked for inference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchNorm2d {
    /// Scale parameter (gamma)
    pub gamma: Array1<f32>,

    /// Shift parameter (beta)
    pub beta: Array1<f32>,

    /// Running mean for inference
    pub running_mean: Array1<f32>,

    /// Running (unbiased) variance for inference
    pub running_var: Array1<f32>,

    /// Weight of the newest batch in the running statistics
    pub momentum: f32,

    /// Small constant for numerical stability
    pub epsilon: f32,

    /// Whether we're in training mode
    pub training: bool,
}

impl BatchNorm2d {
    /// Create a new batch normalization layer with the framework defaults
    /// (momentum 0.1, epsilon 1e-5)
    pub fn new(num_features: usize) -> Self {
        Self::with_params(num_features, 0.1, 1e-5)
    }

    pub fn with_params(num_features: usize, momentum: f32, epsilon: f32) -> Self {
        BatchNorm2d {
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            momentum,
            epsilon,
            training: true,
        }
    }

    pub fn num_features(&self) -> usize {
        self.gamma.len()
    }

    fn batch_norm_forward(&mut self, inputs: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch_size, _, height, width) = inputs.dim();
        let count = batch_size * height * width;
        if self.training && count < 2 {
            return Err(NetError::invalid_parameter(
                "input".to_string(),
                format!(
                    "BatchNorm2d needs more than 1 value per channel when training, got input of shape {:?}",
                    inputs.shape()
                ),
            ));
        }
        let mut output = inputs.to_owned();

        for (c, mut channel) in output.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, std) = if self.training {
                // Training mode: use batch statistics
                let mean = channel.mean().unwrap_or(0.0);
                let var = channel.mapv(|v| (v - mean).powi(2)).sum() / count as f32;

                let unbiased = var * count as f32 / (count - 1) as f32;
                self.running_mean[c] = (1.0 - self.momentum) * self.running_mean[c] + self.momentum * mean;
                self.running_var[c] = (1.0 - self.momentum) * self.running_var[c] + self.momentum * unbiased;

                (mean, (var + self.epsilon).sqrt())
            } else {
                // Inference mode: use running statistics
                (self.running_mean[c], (self.running_var[c] + self.epsilon).sqrt())
            };

            let (gamma, beta) = (self.gamma[c], self.beta[c]);
            channel.mapv_inplace(|v| gamma * (v - mean) / std + beta);
        }

        Ok(output)
    }
}

impl Module for BatchNorm2d {
    fn kind(&self) -> LayerKind {
        LayerKind::BatchNorm
    }

    fn name(&self) -> String {
        format!(
            "BatchNorm2d({}, eps={}, momentum={}, affine=True, track_running_stats=True)",
            self.num_features(),
            self.epsilon,
            self.momentum
        )
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        expect_channels("BatchNorm2d", &input, self.num_features())?;
        self.batch_norm_forward(input)
    }

    fn params_mut(&mut self) -> Option<ParamsMut<'_>> {
        Some(ParamsMut {
            weight: self.gamma.view_mut().into_dyn(),
            bias: Some(self.beta.view_mut()),
        })
    }

    fn own_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// Instance Normalization over NCHW feature maps
///
/// Each sample's channel is normalized over its own spatial extent. The layer
/// is affine but keeps no running statistics, so training and inference
/// behave identically.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceNorm2d {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub epsilon: f32,
}

impl InstanceNorm2d {
    pub fn new(num_features: usize) -> Self {
        InstanceNorm2d {
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            epsilon: 1e-5,
        }
    }

    pub fn num_features(&self) -> usize {
        self.gamma.len()
    }
}

impl Module for InstanceNorm2d {
    fn kind(&self) -> LayerKind {
        LayerKind::InstanceNorm
    }

    fn name(&self) -> String {
        format!(
            "InstanceNorm2d({}, eps={}, affine=True, track_running_stats=False)",
            self.num_features(),
            self.epsilon
        )
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        expect_channels("InstanceNorm2d", &input, self.num_features())?;
        let mut output = input.to_owned();
        for mut sample in output.axis_iter_mut(Axis(0)) {
            for (c, mut plane) in sample.axis_iter_mut(Axis(0)).enumerate() {
                let n = plane.len().max(1) as f32;
                let mean = plane.sum() / n;
                let var = plane.mapv(|v| (v - mean).powi(2)).sum() / n;
                let std = (var + self.epsilon).sqrt();
                let (gamma, beta) = (self.gamma[c], self.beta[c]);
                plane.mapv_inplace(|v| gamma * (v - mean) / std + beta);
            }
        }
        Ok(output)
    }

    fn params_mut(&mut self) -> Option<ParamsMut<'_>> {
        Some(ParamsMut {
            weight: self.gamma.view_mut().into_dyn(),
            bias: Some(self.beta.view_mut()),
        })
    }

    fn own_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
