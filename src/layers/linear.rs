use ndarray::{Array1, Array2, Array4, ArrayView4, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use super::traits::{LayerKind, Module, ParamsMut};

/// A fully connected layer.
///
/// Inputs are flattened per sample (`channels * height * width` features) and
/// the output is returned as `[batch, out_features, 1, 1]` so that linear
/// heads can sit at the end of convolutional stacks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Linear {
    /// `[out_features, in_features]`
    pub weight: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

impl Linear {
    /// Create a new linear layer. The weights and biases are drawn from
    /// `U(-1/sqrt(in_features), 1/sqrt(in_features))`.
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        Linear {
            weight: Array2::random((out_features, in_features), Uniform::new(-bound, bound)),
            bias: bias.then(|| Array1::random(out_features, Uniform::new(-bound, bound))),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }
}

impl Module for Linear {
    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    fn name(&self) -> String {
        format!(
            "Linear(in_features={}, out_features={}, bias={})",
            self.in_features(),
            self.out_features(),
            if self.bias.is_some() { "True" } else { "False" }
        )
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let batch_size = input.shape()[0];
        let features = input.len() / batch_size.max(1);
        if features != self.in_features() {
            return Err(NetError::dimension_mismatch(
                format!("{} features per sample", self.in_features()),
                format!("{} features", features),
            ));
        }
        let flat = input
            .as_standard_layout()
            .into_owned()
            .into_shape((batch_size, features))
            .map_err(|e| NetError::Numerical(e.to_string()))?;

        let mut outputs = flat.dot(&self.weight.t());
        if let Some(bias) = &self.bias {
            outputs += &bias.view().insert_axis(Axis(0));
        }
        let out_features = self.out_features();
        outputs
            .into_shape((batch_size, out_features, 1, 1))
            .map_err(|e| NetError::Numerical(e.to_string()))
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

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
