use ndarray::{Array4, ArrayView4};
use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::layers::traits::{LayerKind, Module};

/// An enumeration of the element-wise activation functions used by the
/// generator and discriminator topologies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Sigmoid,
    Tanh,
    LeakyRelu { alpha: f32 },
}

impl Activation {
    /// The slope used on the down path of U-Nets and throughout PatchGAN
    pub const fn leaky() -> Self {
        Activation::LeakyRelu { alpha: 0.2 }
    }

    /// Apply the activation function to a single value.
    #[inline]
    pub fn apply_scalar(&self, v: f32) -> f32 {
        match self {
            Activation::Relu => v.max(0.0),
            Activation::Linear => v,
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::Tanh => v.tanh(),
            Activation::LeakyRelu { alpha } => {
                if v > 0.0 { v } else { alpha * v }
            }
        }
    }

    /// Apply the activation function to a batch of feature maps in-place.
    pub fn apply_4d(&self, inputs: &mut Array4<f32>) {
        if let Activation::Linear = self {
            return;
        }
        let act = *self;
        inputs.mapv_inplace(|v| act.apply_scalar(v));
    }
}

impl Module for Activation {
    fn kind(&self) -> LayerKind {
        LayerKind::Activation
    }

    fn name(&self) -> String {
        match self {
            Activation::Relu => "ReLU(inplace=True)".to_string(),
            Activation::Linear => "Identity()".to_string(),
            Activation::Sigmoid => "Sigmoid()".to_string(),
            Activation::Tanh => "Tanh()".to_string(),
            Activation::LeakyRelu { alpha } => format!("LeakyReLU(negative_slope={}, inplace=True)", alpha),
        }
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut output = input.to_owned();
        self.apply_4d(&mut output);
        Ok(output)
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(*self)
    }
}
