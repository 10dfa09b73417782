//! Options consumed by the network and scheduler factories.
//!
//! Field names on the wire follow the training scripts' flags
//! (`which_model_netG`, `n_layers_D`, ...), so an options dump from an
//! existing experiment can be loaded as-is.

use std::path::Path;

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{NetError, Result};
use crate::layers::{InitType, NormType};
use crate::models::GeneratorArch;
use crate::optimizer::LrPolicy;
use crate::shift::ShiftOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Channels of the generator input
    pub input_nc: usize,
    /// Channels of the generator output
    pub output_nc: usize,
    /// Generator filters in the first conv layer
    pub ngf: usize,
    /// Discriminator filters in the first conv layer
    pub ndf: usize,

    #[serde(rename = "which_model_netG")]
    pub which_model_net_g: String,
    #[serde(rename = "which_model_netD")]
    pub which_model_net_d: String,
    #[serde(rename = "which_model_netG_SR")]
    pub which_model_net_g_sr: String,
    #[serde(rename = "which_model_netD_SR")]
    pub which_model_net_d_sr: String,
    /// Depth of the `n_layers` discriminator
    #[serde(rename = "n_layers_D")]
    pub n_layers_d: usize,

    /// `batch`, `instance` or `none`
    pub norm: String,
    #[serde(rename = "use_spectral_norm_G")]
    pub use_spectral_norm_g: bool,
    #[serde(rename = "use_spectral_norm_D")]
    pub use_spectral_norm_d: bool,
    pub use_sigmoid: bool,

    /// `normal`, `xavier`, `kaiming` or `orthogonal`
    pub init_type: String,
    pub init_gain: f32,
    /// Worker slots to run on; empty runs on the calling thread
    pub gpu_ids: Vec<usize>,

    pub lr: f32,
    pub beta1: f32,
    /// `lambda`, `step`, `plateau` or `cosine`
    pub lr_policy: String,
    /// Starting epoch; the lambda policy counts from here
    pub epoch_count: usize,
    /// Epochs at the starting learning rate
    pub niter: usize,
    /// Epochs of linear decay to zero
    pub niter_decay: usize,
    /// Period of the step policy
    pub lr_decay_iters: usize,

    /// Training image size
    pub fine_size: usize,

    pub shift_sz: usize,
    pub stride: usize,
    pub mask_thred: f32,
    pub triple_weight: f32,
    pub strength: f32,
    pub skip: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            input_nc: 3,
            output_nc: 3,
            ngf: 64,
            ndf: 64,
            which_model_net_g: "unet_shift_triple".to_string(),
            which_model_net_d: "basic".to_string(),
            which_model_net_g_sr: "64_up_1".to_string(),
            which_model_net_d_sr: "sr_D".to_string(),
            n_layers_d: 3,
            norm: "instance".to_string(),
            use_spectral_norm_g: false,
            use_spectral_norm_d: false,
            use_sigmoid: false,
            init_type: "normal".to_string(),
            init_gain: 0.02,
            gpu_ids: Vec::new(),
            lr: 0.0002,
            beta1: 0.5,
            lr_policy: "lambda".to_string(),
            epoch_count: 1,
            niter: 20,
            niter_decay: 100,
            lr_decay_iters: 50,
            fine_size: 256,
            shift_sz: 1,
            stride: 1,
            mask_thred: 1.0,
            triple_weight: 1.0,
            strength: 1.0,
            skip: false,
        }
    }
}

impl Options {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let opt: Options = serde_json::from_str(json)?;
        opt.validate()?;
        Ok(opt)
    }

    /// Load and validate options from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        debug!("loading options from {}", path.as_ref().display());
        Self::from_json_str(&data)
    }

    /// Write the options as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Reject zero sizes and epochs and unknown names. Discriminator names are
    /// not checked here; the discriminator factories report them themselves.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("input_nc", self.input_nc),
            ("output_nc", self.output_nc),
            ("ngf", self.ngf),
            ("ndf", self.ndf),
            ("n_layers_D", self.n_layers_d),
            ("niter", self.niter),
            ("lr_decay_iters", self.lr_decay_iters),
            ("fine_size", self.fine_size),
            ("shift_sz", self.shift_sz),
            ("stride", self.stride),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(NetError::invalid_parameter(name, "must be greater than 0"));
            }
        }
        if !(self.lr > 0.0) {
            return Err(NetError::invalid_parameter("lr".to_string(), format!("must be positive, got {}", self.lr)));
        }
        if !(self.init_gain >= 0.0) {
            return Err(NetError::invalid_parameter(
                "init_gain".to_string(),
                format!("must be non-negative, got {}", self.init_gain),
            ));
        }

        self.norm_type()?;
        self.init_method()?;
        self.policy()?;
        self.generator_arch()?;
        Ok(())
    }

    pub fn norm_type(&self) -> Result<NormType> {
        self.norm.parse()
    }

    pub fn init_method(&self) -> Result<InitType> {
        self.init_type.parse()
    }

    pub fn policy(&self) -> Result<LrPolicy> {
        self.lr_policy.parse()
    }

    pub fn generator_arch(&self) -> Result<GeneratorArch> {
        self.which_model_net_g.parse()
    }

    /// Construction options of the shift and constraint layers
    pub fn shift_options(&self) -> ShiftOptions {
        ShiftOptions {
            shift_sz: self.shift_sz,
            stride: self.stride,
            mask_thred: self.mask_thred,
            triple_weight: self.triple_weight,
            strength: self.strength,
            skip: self.skip,
        }
    }
}
