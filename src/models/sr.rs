//! Super-resolution generator and discriminator (SRGAN family).

use ndarray::{Array4, ArrayView4};

use crate::activations::Activation;
use crate::error::{NetError, Result};
use crate::layers::{
    Conv2d, GlobalAvgPool2d, LayerKind, Linear, Module, NormLayer, PixelShuffle, Residual, Sequential,
};

/// Residual-block super-resolution generator with `x2` sub-pixel upscaling.
///
/// `9x9` stem, `num_res_blocks` residual blocks (conv-norm-relu-conv-norm),
/// a trunk convolution with a long skip back to the stem, one pixel-shuffle
/// upsampling stage, and a `9x9` projection to `output_nc` with tanh.
#[derive(Clone, Debug)]
pub struct SrGenerator {
    pub input_nc: usize,
    pub output_nc: usize,
    pub num_res_blocks: usize,
    pub model: Sequential,
}

impl SrGenerator {
    /// Width of the residual trunk
    pub const NUM_FEATURES: usize = 64;

    pub fn new(input_nc: usize, output_nc: usize, norm: Option<NormLayer>, num_res_blocks: usize) -> Result<Self> {
        Self::with_features(input_nc, output_nc, Self::NUM_FEATURES, norm, num_res_blocks)
    }

    pub fn with_features(
        input_nc: usize,
        output_nc: usize,
        nf: usize,
        norm: Option<NormLayer>,
        num_res_blocks: usize,
    ) -> Result<Self> {
        if input_nc == 0 || output_nc == 0 || nf == 0 {
            return Err(NetError::invalid_parameter("channels", "channel counts must be greater than 0"));
        }
        let bias = NormLayer::conv_bias(norm);

        let mut trunk = Sequential::new();
        for _ in 0..num_res_blocks {
            let block = Sequential::new()
                .add(Conv2d::new(nf, nf, 3, 1, 1, bias))
                .add_opt(norm.map(|n| n.build(nf)))
                .add(Activation::Relu)
                .add(Conv2d::new(nf, nf, 3, 1, 1, bias))
                .add_opt(norm.map(|n| n.build(nf)));
            trunk.push(Box::new(Residual::new(block)));
        }
        let trunk = trunk
            .add(Conv2d::new(nf, nf, 3, 1, 1, bias))
            .add_opt(norm.map(|n| n.build(nf)));

        let model = Sequential::new()
            .add(Conv2d::new(input_nc, nf, 9, 1, 4, true))
            .add(Activation::Relu)
            .add(Residual::new(trunk))
            .add(Conv2d::new(nf, nf * 4, 3, 1, 1, true))
            .add(PixelShuffle::new(2))
            .add(Activation::Relu)
            .add(Conv2d::new(nf, output_nc, 9, 1, 4, true))
            .add(Activation::Tanh);

        Ok(SrGenerator {
            input_nc,
            output_nc,
            num_res_blocks,
            model,
        })
    }
}

impl Module for SrGenerator {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        format!(
            "m64_UP_1(input_nc={}, output_nc={}, num_res_blocks={})",
            self.input_nc, self.output_nc, self.num_res_blocks
        )
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

/// SRGAN discriminator over RGB images.
///
/// Eight `3x3` convolutions alternating stride 1 and 2 while the width
/// doubles every other layer (`ndf` to `8 * ndf`), global average pooling,
/// then two linear layers down to a single real/fake logit.
#[derive(Clone, Debug)]
pub struct SrDiscriminator {
    pub ndf: usize,
    pub model: Sequential,
}

impl SrDiscriminator {
    pub const INPUT_NC: usize = 3;

    pub fn new(norm: Option<NormLayer>, use_spectral_norm: bool) -> Result<Self> {
        Self::with_width(64, norm, use_spectral_norm)
    }

    pub fn with_width(ndf: usize, norm: Option<NormLayer>, use_spectral_norm: bool) -> Result<Self> {
        if ndf == 0 {
            return Err(NetError::invalid_parameter("ndf", "width must be greater than 0"));
        }
        let bias = NormLayer::conv_bias(norm);
        let conv = |i: usize, o: usize, stride: usize, bias: bool| {
            Conv2d::new(i, o, 3, stride, 1, bias).with_spectral_norm(use_spectral_norm)
        };

        let mut model = Sequential::new()
            .add(conv(Self::INPUT_NC, ndf, 1, true))
            .add(Activation::leaky());

        // (in, out, stride) of the normalized stages
        let stages = [
            (ndf, ndf, 2),
            (ndf, ndf * 2, 1),
            (ndf * 2, ndf * 2, 2),
            (ndf * 2, ndf * 4, 1),
            (ndf * 4, ndf * 4, 2),
            (ndf * 4, ndf * 8, 1),
            (ndf * 8, ndf * 8, 2),
        ];
        for (i, o, stride) in stages {
            model = model
                .add(conv(i, o, stride, bias))
                .add_opt(norm.map(|n| n.build(o)))
                .add(Activation::leaky());
        }

        model = model
            .add(GlobalAvgPool2d::new())
            .add(Linear::new(ndf * 8, ndf * 16, true))
            .add(Activation::leaky())
            .add(Linear::new(ndf * 16, 1, true));

        Ok(SrDiscriminator { ndf, model })
    }
}

impl Module for SrDiscriminator {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        format!("sr_D(ndf={})", self.ndf)
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
