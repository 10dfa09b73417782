use ndarray::{Array4, ArrayView4};

use crate::activations::Activation;
use crate::error::{NetError, Result};
use crate::layers::{concat_channels, Conv2d, ConvTranspose2d, LayerKind, Module, NormLayer, Sequential};
use super::unet::check_unet_input;

/// Number of encoder (and decoder) stages
const DEPTH: usize = 8;

/// Flat 8-level U-Net: the same topology as the recursive generator, written
/// as explicit encoder and decoder stages with skip connections kept in a
/// list during the forward pass.
#[derive(Clone, Debug)]
pub struct EasyUnetGenerator {
    pub input_nc: usize,
    pub output_nc: usize,
    /// `encoders[i]` halves the resolution
    pub encoders: Vec<Sequential>,
    /// `decoders[i]` doubles the resolution back to that of `encoders[i]`'s input
    pub decoders: Vec<Sequential>,
}

impl EasyUnetGenerator {
    pub fn new(
        input_nc: usize,
        output_nc: usize,
        ngf: usize,
        norm: Option<NormLayer>,
        use_spectral_norm: bool,
    ) -> Result<Self> {
        if input_nc == 0 || output_nc == 0 || ngf == 0 {
            return Err(NetError::invalid_parameter("channels", "channel counts must be greater than 0"));
        }
        let bias = NormLayer::conv_bias(norm);
        let width = |level: usize| ngf * (1usize << level.min(3));

        let mut encoders = Vec::with_capacity(DEPTH);
        for level in 0..DEPTH {
            let stage = if level == 0 {
                Sequential::new().add(Conv2d::new(input_nc, width(0), 4, 2, 1, bias).with_spectral_norm(use_spectral_norm))
            } else {
                let conv = Conv2d::new(width(level - 1), width(level), 4, 2, 1, bias).with_spectral_norm(use_spectral_norm);
                let stage = Sequential::new().add(Activation::leaky()).add(conv);
                if level == DEPTH - 1 {
                    stage
                } else {
                    stage.add_opt(norm.map(|n| n.build(width(level))))
                }
            };
            encoders.push(stage);
        }

        let mut decoders = Vec::with_capacity(DEPTH);
        for level in 0..DEPTH {
            let in_nc = if level == DEPTH - 1 { width(level) } else { width(level) * 2 };
            let stage = if level == 0 {
                Sequential::new()
                    .add(Activation::Relu)
                    .add(ConvTranspose2d::new(in_nc, output_nc, 4, 2, 1, true).with_spectral_norm(use_spectral_norm))
                    .add(Activation::Tanh)
            } else {
                Sequential::new()
                    .add(Activation::Relu)
                    .add(ConvTranspose2d::new(in_nc, width(level - 1), 4, 2, 1, bias).with_spectral_norm(use_spectral_norm))
                    .add_opt(norm.map(|n| n.build(width(level - 1))))
            };
            decoders.push(stage);
        }

        Ok(EasyUnetGenerator {
            input_nc,
            output_nc,
            encoders,
            decoders,
        })
    }
}

impl Module for EasyUnetGenerator {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        format!("EasyUnetGenerator(input_nc={}, output_nc={})", self.input_nc, self.output_nc)
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_unet_input(&input, self.input_nc, DEPTH)?;

        let mut skips: Vec<Array4<f32>> = Vec::with_capacity(DEPTH);
        let mut x = input.to_owned();
        for encoder in self.encoders.iter_mut() {
            x = encoder.forward(x.view())?;
            skips.push(x.clone());
        }

        // the bottleneck output is consumed directly, not as a skip
        skips.pop();
        for (level, decoder) in self.decoders.iter_mut().enumerate().rev() {
            x = decoder.forward(x.view())?;
            if level > 0 {
                let skip = skips
                    .pop()
                    .ok_or_else(|| NetError::MissingState("skip connection".to_string()))?;
                x = concat_channels(&[x.view(), skip.view()])?;
            }
        }
        Ok(x)
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        for stage in self.encoders.iter().chain(self.decoders.iter()) {
            f(stage);
        }
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        for stage in self.encoders.iter_mut().chain(self.decoders.iter_mut()) {
            f(stage);
        }
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}
