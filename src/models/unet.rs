//! U-Net generators, with and without a shift connection.
//!
//! The network is built recursively from the innermost block outwards. Block
//! `k` (counting from the outermost, `k = 1`) maps `channel(k - 1)` to
//! `channel(k)` on the way down, where `channel(k) = ngf * min(2^(k-1), 8)`,
//! and works at `1 / 2^k` of the input resolution. Every block except the
//! outermost returns `concat(decoded, input)`, so the up path of its parent
//! sees the decoder feature in the first half of the channels and the
//! encoder feature in the second half.

use ndarray::{Array4, ArrayView4};

use crate::activations::Activation;
use crate::error::{NetError, Result};
use crate::layers::{concat_channels, Conv2d, ConvTranspose2d, LayerKind, Module, NormLayer, Sequential};
use crate::shift::{InnerCos, InnerCosHandle, InnerShiftTriple, ShiftHandle, ShiftOptions};

/// Position of a block in the recursion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRole {
    Outermost,
    Middle,
    Innermost,
}

/// One level of the U-Net: `down -> submodule -> up`, plus the skip connection
#[derive(Clone, Debug)]
pub struct UnetSkipBlock {
    pub role: BlockRole,
    pub outer_nc: usize,
    pub inner_nc: usize,
    pub down: Sequential,
    pub submodule: Option<Box<UnetSkipBlock>>,
    pub up: Sequential,
}

/// Layers shared by every kind of block
struct BlockParts {
    norm: Option<NormLayer>,
    use_spectral_norm: bool,
}

impl BlockParts {
    fn norm(&self, channels: usize) -> Option<Box<dyn Module>> {
        self.norm.map(|n| n.build(channels))
    }

    fn down_conv(&self, input_nc: usize, inner_nc: usize) -> Conv2d {
        Conv2d::new(input_nc, inner_nc, 4, 2, 1, NormLayer::conv_bias(self.norm))
            .with_spectral_norm(self.use_spectral_norm)
    }

    fn up_conv(&self, in_nc: usize, outer_nc: usize, bias: bool) -> ConvTranspose2d {
        ConvTranspose2d::new(in_nc, outer_nc, 4, 2, 1, bias).with_spectral_norm(self.use_spectral_norm)
    }
}

/// Shift and constraint layers inserted into one block, with their handles
struct ShiftInsert {
    inner_cos: InnerCos,
    shift: InnerShiftTriple,
}

impl UnetSkipBlock {
    fn build(
        role: BlockRole,
        outer_nc: usize,
        inner_nc: usize,
        input_nc: usize,
        submodule: Option<Box<UnetSkipBlock>>,
        parts: &BlockParts,
        shift: Option<ShiftInsert>,
    ) -> Self {
        let bias = NormLayer::conv_bias(parts.norm);
        let (down, up) = match role {
            BlockRole::Outermost => (
                Sequential::new().add(parts.down_conv(input_nc, inner_nc)),
                Sequential::new()
                    .add(Activation::Relu)
                    .add(parts.up_conv(inner_nc * 2, outer_nc, true))
                    .add(Activation::Tanh),
            ),
            BlockRole::Innermost => (
                Sequential::new()
                    .add(Activation::leaky())
                    .add(parts.down_conv(input_nc, inner_nc)),
                Sequential::new()
                    .add(Activation::Relu)
                    .add(parts.up_conv(inner_nc, outer_nc, bias))
                    .add_opt(parts.norm(outer_nc)),
            ),
            BlockRole::Middle => {
                let down = Sequential::new()
                    .add(Activation::leaky())
                    .add(parts.down_conv(input_nc, inner_nc))
                    .add_opt(parts.norm(inner_nc));
                let up = match shift {
                    // the shifted branch makes the up path input three halves wide
                    Some(insert) => Sequential::new()
                        .add(Activation::Relu)
                        .add(insert.inner_cos)
                        .add(insert.shift)
                        .add(parts.up_conv(inner_nc * 3, outer_nc, bias))
                        .add_opt(parts.norm(outer_nc)),
                    None => Sequential::new()
                        .add(Activation::Relu)
                        .add(parts.up_conv(inner_nc * 2, outer_nc, bias))
                        .add_opt(parts.norm(outer_nc)),
                };
                (down, up)
            }
        };

        UnetSkipBlock {
            role,
            outer_nc,
            inner_nc,
            down,
            submodule,
            up,
        }
    }
}

impl Module for UnetSkipBlock {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        format!(
            "UnetSkipConnectionBlock(outer_nc={}, inner_nc={}, {:?})",
            self.outer_nc, self.inner_nc, self.role
        )
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let encoded = self.down.forward(input)?;
        let inner = match self.submodule.as_mut() {
            Some(sub) => sub.forward(encoded.view())?,
            None => encoded,
        };
        let decoded = self.up.forward(inner.view())?;
        match self.role {
            BlockRole::Outermost => Ok(decoded),
            _ => concat_channels(&[decoded.view(), input.view()]),
        }
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn Module)) {
        f(&self.down);
        if let Some(sub) = &self.submodule {
            f(sub.as_ref());
        }
        f(&self.up);
    }

    fn for_each_child_mut(&mut self, f: &mut dyn FnMut(&mut dyn Module)) {
        f(&mut self.down);
        if let Some(sub) = self.submodule.as_mut() {
            f(sub.as_mut());
        }
        f(&mut self.up);
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// Channel width of the features produced by block `k`
fn block_channels(ngf: usize, k: usize) -> usize {
    ngf * (1usize << (k - 1).min(3))
}

/// U-Net generator with `num_downs` down-samplings; an input of
/// `2^num_downs` pixels is reduced to `1x1` at the bottleneck.
#[derive(Clone, Debug)]
pub struct UnetGenerator {
    pub input_nc: usize,
    pub output_nc: usize,
    pub num_downs: usize,
    pub model: UnetSkipBlock,
    /// Block index of the shift connection, if any
    pub shift_layer_to_last: Option<usize>,
    inner_cos: Vec<InnerCosHandle>,
    shifts: Vec<ShiftHandle>,
}

impl UnetGenerator {
    /// Plain U-Net generator
    pub fn new(
        input_nc: usize,
        output_nc: usize,
        num_downs: usize,
        ngf: usize,
        norm: Option<NormLayer>,
        use_spectral_norm: bool,
    ) -> Result<Self> {
        Self::build(input_nc, output_nc, num_downs, ngf, norm, use_spectral_norm, None)
    }

    /// U-Net generator with a shift connection in block `layer_to_last`
    #[allow(clippy::too_many_arguments)]
    pub fn with_shift(
        input_nc: usize,
        output_nc: usize,
        num_downs: usize,
        ngf: usize,
        norm: Option<NormLayer>,
        use_spectral_norm: bool,
        layer_to_last: usize,
        opt: &ShiftOptions,
    ) -> Result<Self> {
        Self::build(input_nc, output_nc, num_downs, ngf, norm, use_spectral_norm, Some((layer_to_last, opt)))
    }

    fn build(
        input_nc: usize,
        output_nc: usize,
        num_downs: usize,
        ngf: usize,
        norm: Option<NormLayer>,
        use_spectral_norm: bool,
        shift: Option<(usize, &ShiftOptions)>,
    ) -> Result<Self> {
        if num_downs < 5 {
            return Err(NetError::invalid_parameter(
                "num_downs".to_string(),
                format!("a U-Net needs at least 5 down-samplings, got {}", num_downs),
            ));
        }
        if input_nc == 0 || output_nc == 0 || ngf == 0 {
            return Err(NetError::invalid_parameter("channels", "channel counts must be greater than 0"));
        }
        if let Some((layer_to_last, _)) = shift {
            if layer_to_last < 2 || layer_to_last >= num_downs {
                return Err(NetError::invalid_parameter(
                    "layer_to_last".to_string(),
                    format!("shift block must lie strictly inside 1..{}, got {}", num_downs, layer_to_last),
                ));
            }
        }

        let parts = BlockParts { norm, use_spectral_norm };
        let mut inner_cos = Vec::new();
        let mut shifts = Vec::new();
        let mut block: Option<Box<UnetSkipBlock>> = None;

        for k in (1..=num_downs).rev() {
            let inner_nc = block_channels(ngf, k);
            let (role, outer_nc, input) = if k == 1 {
                (BlockRole::Outermost, output_nc, input_nc)
            } else {
                let outer = block_channels(ngf, k - 1);
                let role = if k == num_downs { BlockRole::Innermost } else { BlockRole::Middle };
                (role, outer, outer)
            };

            let insert = match shift {
                Some((layer_to_last, opt)) if layer_to_last == k => {
                    let cos = InnerCos::new(opt.strength, opt.skip, k, opt.mask_thred);
                    let shift_layer = InnerShiftTriple::new(opt.shift_sz, opt.stride, opt.mask_thred, opt.triple_weight, k);
                    inner_cos.push(cos.handle());
                    shifts.push(shift_layer.handle());
                    Some(ShiftInsert { inner_cos: cos, shift: shift_layer })
                }
                _ => None,
            };

            block = Some(Box::new(UnetSkipBlock::build(role, outer_nc, inner_nc, input, block, &parts, insert)));
        }

        let model = block
            .map(|b| *b)
            .ok_or_else(|| NetError::invalid_parameter("num_downs", "no blocks were built"))?;

        Ok(UnetGenerator {
            input_nc,
            output_nc,
            num_downs,
            model,
            shift_layer_to_last: shift.map(|(k, _)| k),
            inner_cos,
            shifts,
        })
    }

    /// Handles of the constraint layers, outermost first
    pub fn inner_cos_handles(&self) -> Vec<InnerCosHandle> {
        self.inner_cos.clone()
    }

    /// Handles of the shift layers, outermost first
    pub fn shift_handles(&self) -> Vec<ShiftHandle> {
        self.shifts.clone()
    }
}

/// Input spatial sizes must survive `num_downs` halvings
pub(crate) fn check_unet_input(input: &ArrayView4<f32>, input_nc: usize, num_downs: usize) -> Result<()> {
    let (_, channels, height, width) = input.dim();
    let unit = 1usize << num_downs;
    if channels != input_nc || height % unit != 0 || width % unit != 0 || height == 0 || width == 0 {
        return Err(NetError::dimension_mismatch(
            format!("[N, {}, H, W] with H and W multiples of {}", input_nc, unit),
            format!("{:?}", input.shape()),
        ));
    }
    Ok(())
}

impl Module for UnetGenerator {
    fn kind(&self) -> LayerKind {
        LayerKind::Container
    }

    fn name(&self) -> String {
        match self.shift_layer_to_last {
            Some(k) => format!(
                "UnetGeneratorShiftTriple(input_nc={}, output_nc={}, num_downs={}, shift layer {} to last)",
                self.input_nc, self.output_nc, self.num_downs, k
            ),
            None => format!(
                "UnetGenerator(input_nc={}, output_nc={}, num_downs={})",
                self.input_nc, self.output_nc, self.num_downs
            ),
        }
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_unet_input(&input, self.input_nc, self.num_downs)?;
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
