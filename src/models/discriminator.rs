//! Patch-level discriminators for the inpainting GAN.

use ndarray::{Array4, ArrayView4};

use crate::activations::Activation;
use crate::error::{NetError, Result};
use crate::layers::{AvgPool2d, Conv2d, DenseConcat, LayerKind, Module, NormLayer, Sequential};

/// PatchGAN discriminator.
///
/// `n_layers` stride-2 convolutions (the first without normalization), one
/// stride-1 convolution, and a final stride-1 convolution to a single-channel
/// map of patch scores. Channel widths grow as `ndf * min(2^n, 8)`.
#[derive(Clone, Debug)]
pub struct NLayerDiscriminator {
    pub input_nc: usize,
    pub n_layers: usize,
    pub model: Sequential,
}

impl NLayerDiscriminator {
    pub fn new(
        input_nc: usize,
        ndf: usize,
        n_layers: usize,
        norm: Option<NormLayer>,
        use_sigmoid: bool,
        use_spectral_norm: bool,
    ) -> Result<Self> {
        if input_nc == 0 || ndf == 0 {
            return Err(NetError::invalid_parameter("channels", "channel counts must be greater than 0"));
        }
        let bias = NormLayer::conv_bias(norm);
        let (kw, padw) = (4, 1);
        let conv = |i: usize, o: usize, stride: usize, bias: bool| {
            Conv2d::new(i, o, kw, stride, padw, bias).with_spectral_norm(use_spectral_norm)
        };

        let mut model = Sequential::new()
            .add(conv(input_nc, ndf, 2, true))
            .add(Activation::leaky());

        let mut nf_mult = 1;
        for n in 1..n_layers {
            let nf_mult_prev = nf_mult;
            nf_mult = 1usize << n.min(3);
            model = model
                .add(conv(ndf * nf_mult_prev, ndf * nf_mult, 2, bias))
                .add_opt(norm.map(|l| l.build(ndf * nf_mult)))
                .add(Activation::leaky());
        }

        let nf_mult_prev = nf_mult;
        nf_mult = 1usize << n_layers.min(3);
        model = model
            .add(conv(ndf * nf_mult_prev, ndf * nf_mult, 1, bias))
            .add_opt(norm.map(|l| l.build(ndf * nf_mult)))
            .add(Activation::leaky())
            .add(conv(ndf * nf_mult, 1, 1, true));

        if use_sigmoid {
            model = model.add(Activation::Sigmoid);
        }

        Ok(NLayerDiscriminator { input_nc, n_layers, model })
    }
}

impl Module for NLayerDiscriminator {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        format!("NLayerDiscriminator(input_nc={}, n_layers={})", self.input_nc, self.n_layers)
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.model.forward(input)
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        f(&self.model);
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        f(&mut self.model);
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// Dense layers per stage of [`DenseNetDiscriminator`]
const DENSE_LAYERS_PER_BLOCK: usize = 2;

/// DenseNet-style discriminator.
///
/// After a stride-2 stem, each of the `n_layers` stages is a dense block
/// (every layer's output is concatenated onto its input, growing the width
/// by `ndf / 2` per layer) followed by a transition: normalization, a `1x1`
/// convolution capped at `ndf * 8` channels, and `2x2` average pooling. A
/// final `4x4` convolution produces the patch scores.
#[derive(Clone, Debug)]
pub struct DenseNetDiscriminator {
    pub input_nc: usize,
    pub n_layers: usize,
    pub model: Sequential,
}

impl DenseNetDiscriminator {
    pub fn new(
        input_nc: usize,
        ndf: usize,
        n_layers: usize,
        norm: Option<NormLayer>,
        use_sigmoid: bool,
        use_spectral_norm: bool,
    ) -> Result<Self> {
        if input_nc == 0 || ndf == 0 {
            return Err(NetError::invalid_parameter("channels", "channel counts must be greater than 0"));
        }
        let bias = NormLayer::conv_bias(norm);
        let growth = (ndf / 2).max(1);

        let mut model = Sequential::new()
            .add(Conv2d::new(input_nc, ndf, 4, 2, 1, true).with_spectral_norm(use_spectral_norm))
            .add(Activation::leaky());

        let mut channels = ndf;
        for _ in 0..n_layers {
            for _ in 0..DENSE_LAYERS_PER_BLOCK {
                let body = Sequential::new()
                    .add_opt(norm.map(|l| l.build(channels)))
                    .add(Activation::leaky())
                    .add(Conv2d::new(channels, growth, 3, 1, 1, bias).with_spectral_norm(use_spectral_norm));
                model = model.add(DenseConcat::new(body));
                channels += growth;
            }

            let out_channels = channels.min(ndf * 8);
            model = model
                .add_opt(norm.map(|l| l.build(channels)))
                .add(Activation::leaky())
                .add(Conv2d::new(channels, out_channels, 1, 1, 0, bias).with_spectral_norm(use_spectral_norm))
                .add(AvgPool2d::new((2, 2), None));
            channels = out_channels;
        }

        model = model.add(Conv2d::new(channels, 1, 4, 1, 1, true).with_spectral_norm(use_spectral_norm));
        if use_sigmoid {
            model = model.add(Activation::Sigmoid);
        }

        Ok(DenseNetDiscriminator { input_nc, n_layers, model })
    }
}

impl Module for DenseNetDiscriminator {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        format!("DenseNetDiscriminator(input_nc={}, n_layers={})", self.input_nc, self.n_layers)
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.model.forward(input)
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        f(&self.model);
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        f(&mut self.model);
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
