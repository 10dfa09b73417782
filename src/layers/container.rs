use ndarray::{concatenate, Array4, ArrayView4, Axis};

use crate::error::{NetError, Result};
use super::traits::{LayerKind, Module};

/// Concatenate feature maps along the channel axis
pub fn concat_channels(parts: &[ArrayView4<f32>]) -> Result<Array4<f32>> {
    concatenate(Axis(1), parts).map_err(|e| {
        let shapes: Vec<_> = parts.iter().map(|p| format!("{:?}", p.shape())).collect();
        NetError::dimension_mismatch(
            "matching batch and spatial sizes".to_string(),
            format!("{} ({})", shapes.join(" + "), e),
        )
    })
}

/// Runs its layers one after another
#[derive(Clone, Debug, Default)]
pub struct Sequential {
    pub layers: Vec<Box<dyn Module>>,
}

impl Sequential {
    pub fn new() -> Self {
        Sequential { layers: Vec::new() }
    }

    /// Append a layer (builder style)
    pub fn add<M: Module + 'static>(mut self, layer: M) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Append an already boxed layer
    pub fn add_boxed(mut self, layer: Box<dyn Module>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Append an optional layer; `None` is skipped
    pub fn add_opt(self, layer: Option<Box<dyn Module>>) -> Self {
        match layer {
            Some(layer) => self.add_boxed(layer),
            None => self,
        }
    }

    pub fn push(&mut self, layer: Box<dyn Module>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Module for Sequential {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        "Sequential".to_string()
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut x = input.to_owned();
        for layer in self.layers.iter_mut() {
            x = layer.forward(x.view())?;
        }
        Ok(x)
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        for layer in &self.layers {
            f(layer.as_ref());
        }
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        for layer in self.layers.iter_mut() {
            f(layer.as_mut());
        }
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// `x + body(x)`
#[derive(Clone, Debug)]
pub struct Residual {
    pub body: Sequential,
}

impl Residual {
    pub fn new(body: Sequential) -> Self {
        Residual { body }
    }
}

impl Module for Residual {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        "Residual".to_string()
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let out = self.body.forward(input)?;
        if out.shape() != input.shape() {
            return Err(NetError::dimension_mismatch(
                format!("residual output {:?}", input.shape()),
                format!("{:?}", out.shape()),
            ));
        }
        Ok(out + &input)
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        f(&self.body);
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        f(&mut self.body);
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// `concat(x, body(x))` along channels, the dense connection of DenseNet
#[derive(Clone, Debug)]
pub struct DenseConcat {
    pub body: Sequential,
}

impl DenseConcat {
    pub fn new(body: Sequential) -> Self {
        DenseConcat { body }
    }
}

impl Module for DenseConcat {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        "DenseLayer".to_string()
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let out = self.body.forward(input)?;
        concat_channels(&[input.view(), out.view()])
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        f(&self.body);
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        f(&mut self.body);
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
