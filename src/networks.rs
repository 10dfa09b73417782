//! Network factories: weight initialization, device placement, and the
//! generator and discriminator constructors selected by name.

use ndarray::ArrayView4;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{NetError, Result};
use crate::layers::{
    get_norm_layer, initialization::fill_norm_scale, summary, try_apply, InitType, LayerKind, Module, NormLayer,
};
use crate::models::{
    DenseNetDiscriminator, DiscriminatorArch, EasyUnetGenerator, GeneratorArch, NLayerDiscriminator,
    SrDiscriminator, SrDiscriminatorArch, SrGenerator, SrGeneratorArch, UnetGenerator,
};
use crate::options::Options;
use crate::parallel::{validate_devices, DataParallel};
use crate::shift::{InnerCosHandle, ShiftHandle, ShiftOptions};

/// Residual blocks of the `64_up_1` super-resolution generator
const SR_RESIDUAL_BLOCKS: usize = 16;

/// Stages of the `densenet` discriminator
const DENSENET_STAGES: usize = 3;

/// Initialize every convolution, linear and batch-norm layer of `net`.
pub fn init_weights(net: &mut dyn Module, init_type: InitType, gain: f32) -> Result<()> {
    init_weights_with_rng(net, init_type, gain, &mut rand::thread_rng())
}

/// [`init_weights`] drawing from a caller-supplied generator.
///
/// Conv and linear weights follow `init_type` and their biases are zeroed.
/// Batch-norm scales are drawn from `N(1, gain)` and their shifts zeroed.
/// Every other layer, instance norm included, is left as constructed.
pub fn init_weights_with_rng<R: Rng + ?Sized>(
    net: &mut dyn Module,
    init_type: InitType,
    gain: f32,
    rng: &mut R,
) -> Result<()> {
    info!("initialize network with {}", init_type);
    try_apply(net, &mut |layer: &mut dyn Module| {
        let kind = layer.kind();
        let params = match kind {
            LayerKind::Conv | LayerKind::Linear | LayerKind::BatchNorm => layer.params_mut(),
            _ => None,
        };
        let Some(mut params) = params else {
            return Ok(());
        };

        if kind == LayerKind::BatchNorm {
            fill_norm_scale(&mut params.weight, gain, &mut *rng)?;
        } else {
            init_type.fill(&mut params.weight, gain, &mut *rng)?;
        }
        if let Some(bias) = params.bias.as_mut() {
            bias.fill(0.0);
        }
        Ok(())
    })
}

/// Spread `net` over `gpu_ids` (if any), then initialize its weights.
pub fn init_net(net: Box<dyn Module>, init_type: InitType, gain: f32, gpu_ids: &[usize]) -> Result<Box<dyn Module>> {
    let mut net = if gpu_ids.is_empty() {
        net
    } else {
        validate_devices(gpu_ids)?;
        debug!("placing {} on devices {:?}", net.name(), gpu_ids);
        Box::new(DataParallel::new(net, gpu_ids)?) as Box<dyn Module>
    };
    init_weights(net.as_mut(), init_type, gain)?;
    Ok(net)
}

/// A generator together with handles to its constraint and shift layers
#[derive(Debug)]
pub struct GeneratorBundle {
    pub net: Box<dyn Module>,
    pub inner_cos: Vec<InnerCosHandle>,
    pub shifts: Vec<ShiftHandle>,
}

fn log_handles<T: std::fmt::Display>(title: &str, handles: &[T]) {
    let names: Vec<String> = handles.iter().map(|h| h.to_string()).collect();
    info!("{}: [{}]", title, names.join(", "));
}

/// Build, initialize and place an inpainting generator.
///
/// For shift architectures `mask_global` (`[1, 1, H, W]`, 1 for holes) sets
/// the initial hole mask of every constraint and shift layer; the returned
/// handles update it for later batches. Plain U-Nets ignore it.
#[allow(clippy::too_many_arguments)]
pub fn define_g(
    input_nc: usize,
    output_nc: usize,
    ngf: usize,
    which_model_net_g: &str,
    opt: &ShiftOptions,
    mask_global: ArrayView4<f32>,
    norm: &str,
    use_spectral_norm: bool,
    init_type: &str,
    gpu_ids: &[usize],
    init_gain: f32,
) -> Result<GeneratorBundle> {
    let norm_layer = get_norm_layer(norm)?;
    let init_type: InitType = init_type.parse()?;

    info!("input_nc {}", input_nc);
    info!("output_nc {}", output_nc);
    info!("which_model_netG {}", which_model_net_g);

    let arch: GeneratorArch = which_model_net_g.parse()?;
    let (net, inner_cos, shifts) = match arch {
        GeneratorArch::EasyUnet256 => (
            Box::new(EasyUnetGenerator::new(input_nc, output_nc, ngf, norm_layer, use_spectral_norm)?) as Box<dyn Module>,
            Vec::new(),
            Vec::new(),
        ),
        _ => {
            let net = match arch.shift_layer_to_last() {
                Some(layer_to_last) => UnetGenerator::with_shift(
                    input_nc,
                    output_nc,
                    arch.num_downs(),
                    ngf,
                    norm_layer,
                    use_spectral_norm,
                    layer_to_last,
                    opt,
                )?,
                None => UnetGenerator::new(input_nc, output_nc, arch.num_downs(), ngf, norm_layer, use_spectral_norm)?,
            };
            let inner_cos = net.inner_cos_handles();
            let shifts = net.shift_handles();
            (Box::new(net) as Box<dyn Module>, inner_cos, shifts)
        }
    };

    for handle in &inner_cos {
        handle.set_mask(mask_global)?;
    }
    for handle in &shifts {
        handle.set_mask(mask_global)?;
    }

    info!("[CREATED] MODEL {}", arch);
    log_handles("Constraint in netG", &inner_cos);
    log_handles("Shift in netG", &shifts);
    debug!("NetG:\n{}", summary(net.as_ref()));

    let net = init_net(net, init_type, init_gain, gpu_ids)?;
    Ok(GeneratorBundle { net, inner_cos, shifts })
}

/// Build, initialize and place a super-resolution generator.
///
/// Only `64_up_1` exists; it always uses batch normalization and `ngf` does
/// not affect it.
pub fn define_g_sr(
    input_nc: usize,
    output_nc: usize,
    _ngf: usize,
    which_model_net_g_sr: &str,
    init_type: &str,
    gpu_ids: &[usize],
    init_gain: f32,
) -> Result<Box<dyn Module>> {
    let init_type: InitType = init_type.parse()?;

    info!("input_nc {}", input_nc);
    info!("output_nc {}", output_nc);
    info!("which_model_netG_SR {}", which_model_net_g_sr);

    let arch: SrGeneratorArch = which_model_net_g_sr.parse()?;
    let net: Box<dyn Module> = match arch {
        SrGeneratorArch::Up64x1 => Box::new(SrGenerator::new(
            input_nc,
            output_nc,
            Some(NormLayer::Batch),
            SR_RESIDUAL_BLOCKS,
        )?),
        other => return Err(NetError::not_implemented("Generator model name", other.as_str())),
    };

    debug!("model_sr:\n{}", summary(net.as_ref()));
    init_net(net, init_type, init_gain, gpu_ids)
}

/// Build, initialize and place an inpainting discriminator.
///
/// An unknown architecture name is reported with a warning and yields
/// `Ok(None)`; bad norm or init names are still errors.
#[allow(clippy::too_many_arguments)]
pub fn define_d(
    input_nc: usize,
    ndf: usize,
    which_model_net_d: &str,
    n_layers_d: usize,
    norm: &str,
    use_sigmoid: bool,
    use_spectral_norm: bool,
    init_type: &str,
    gpu_ids: &[usize],
    init_gain: f32,
) -> Result<Option<Box<dyn Module>>> {
    let norm_layer = get_norm_layer(norm)?;
    let init_type: InitType = init_type.parse()?;

    let net: Box<dyn Module> = match which_model_net_d.parse::<DiscriminatorArch>() {
        Ok(DiscriminatorArch::Basic) => Box::new(NLayerDiscriminator::new(
            input_nc,
            ndf,
            3,
            norm_layer,
            use_sigmoid,
            use_spectral_norm,
        )?),
        Ok(DiscriminatorArch::NLayers) => Box::new(NLayerDiscriminator::new(
            input_nc,
            ndf,
            n_layers_d,
            norm_layer,
            use_sigmoid,
            use_spectral_norm,
        )?),
        Ok(DiscriminatorArch::DenseNet) => Box::new(DenseNetDiscriminator::new(
            input_nc,
            ndf,
            DENSENET_STAGES,
            norm_layer,
            use_sigmoid,
            use_spectral_norm,
        )?),
        Err(e) => {
            warn!("{}", e);
            return Ok(None);
        }
    };

    debug!("NetD:\n{}", summary(net.as_ref()));
    init_net(net, init_type, init_gain, gpu_ids).map(Some)
}

/// Build, initialize and place a super-resolution discriminator; unknown
/// names warn and yield `Ok(None)`.
pub fn define_d_sr(
    which_model_net_d_sr: &str,
    norm: &str,
    use_spectral_norm: bool,
    init_type: &str,
    gpu_ids: &[usize],
    init_gain: f32,
) -> Result<Option<Box<dyn Module>>> {
    let norm_layer = get_norm_layer(norm)?;
    let init_type: InitType = init_type.parse()?;

    let net: Box<dyn Module> = match which_model_net_d_sr.parse::<SrDiscriminatorArch>() {
        Ok(SrDiscriminatorArch::SrD) => Box::new(SrDiscriminator::new(norm_layer, use_spectral_norm)?),
        Err(e) => {
            warn!("{}", e);
            return Ok(None);
        }
    };

    debug!("NetD_SR:\n{}", summary(net.as_ref()));
    init_net(net, init_type, init_gain, gpu_ids).map(Some)
}

/// [`define_g`] with every argument taken from `opt`
pub fn define_g_from_options(opt: &Options, mask_global: ArrayView4<f32>) -> Result<GeneratorBundle> {
    define_g(
        opt.input_nc,
        opt.output_nc,
        opt.ngf,
        &opt.which_model_net_g,
        &opt.shift_options(),
        mask_global,
        &opt.norm,
        opt.use_spectral_norm_g,
        &opt.init_type,
        &opt.gpu_ids,
        opt.init_gain,
    )
}

/// [`define_d`] with every argument taken from `opt`. The discriminator sees
/// the generator input and output stacked along the channels.
pub fn define_d_from_options(opt: &Options) -> Result<Option<Box<dyn Module>>> {
    define_d(
        opt.input_nc + opt.output_nc,
        opt.ndf,
        &opt.which_model_net_d,
        opt.n_layers_d,
        &opt.norm,
        opt.use_sigmoid,
        opt.use_spectral_norm_d,
        &opt.init_type,
        &opt.gpu_ids,
        opt.init_gain,
    )
}
