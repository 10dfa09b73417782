//! Predefined generator and discriminator topologies, and the names they
//! are selected by.

pub mod discriminator;
pub mod easy_unet;
pub mod sr;
pub mod unet;

pub use discriminator::{DenseNetDiscriminator, NLayerDiscriminator};
pub use easy_unet::EasyUnetGenerator;
pub use sr::{SrDiscriminator, SrGenerator};
pub use unet::{BlockRole, UnetGenerator, UnetSkipBlock};

use std::fmt;
use std::str::FromStr;

use crate::error::NetError;

/// Inpainting generators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorArch {
    /// `unet_256`
    Unet256,
    /// `easy_unet_256`
    EasyUnet256,
    /// `unet_shift_triple`
    UnetShiftTriple,
    /// `unet_shift_triple_128_1`: shift at the 2nd-to-last layer for 128px
    UnetShiftTriple128x1,
    /// `unet_shift_triple_128_2`: shift at the 4th-to-last layer for 128px
    UnetShiftTriple128x2,
    /// `unet_shift_triple_64_1`
    UnetShiftTriple64x1,
    /// `unet_shift_triple_64_2`
    UnetShiftTriple64x2,
}

impl GeneratorArch {
    pub const ALL: [GeneratorArch; 7] = [
        GeneratorArch::Unet256,
        GeneratorArch::EasyUnet256,
        GeneratorArch::UnetShiftTriple,
        GeneratorArch::UnetShiftTriple128x1,
        GeneratorArch::UnetShiftTriple128x2,
        GeneratorArch::UnetShiftTriple64x1,
        GeneratorArch::UnetShiftTriple64x2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorArch::Unet256 => "unet_256",
            GeneratorArch::EasyUnet256 => "easy_unet_256",
            GeneratorArch::UnetShiftTriple => "unet_shift_triple",
            GeneratorArch::UnetShiftTriple128x1 => "unet_shift_triple_128_1",
            GeneratorArch::UnetShiftTriple128x2 => "unet_shift_triple_128_2",
            GeneratorArch::UnetShiftTriple64x1 => "unet_shift_triple_64_1",
            GeneratorArch::UnetShiftTriple64x2 => "unet_shift_triple_64_2",
        }
    }

    /// Number of down-samplings of the U-Net
    pub fn num_downs(&self) -> usize {
        match self {
            GeneratorArch::Unet256 | GeneratorArch::EasyUnet256 | GeneratorArch::UnetShiftTriple => 8,
            GeneratorArch::UnetShiftTriple128x1 | GeneratorArch::UnetShiftTriple128x2 => 7,
            GeneratorArch::UnetShiftTriple64x1 | GeneratorArch::UnetShiftTriple64x2 => 6,
        }
    }

    /// Block index of the shift connection, counted from the outermost
    pub fn shift_layer_to_last(&self) -> Option<usize> {
        match self {
            GeneratorArch::Unet256 | GeneratorArch::EasyUnet256 => None,
            GeneratorArch::UnetShiftTriple => Some(3),
            GeneratorArch::UnetShiftTriple128x1 | GeneratorArch::UnetShiftTriple64x1 => Some(2),
            GeneratorArch::UnetShiftTriple128x2 | GeneratorArch::UnetShiftTriple64x2 => Some(4),
        }
    }

    /// Input size the network is named after
    pub fn image_size(&self) -> usize {
        1 << self.num_downs()
    }
}

impl FromStr for GeneratorArch {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GeneratorArch::ALL
            .iter()
            .copied()
            .find(|arch| arch.as_str() == s)
            .ok_or_else(|| NetError::not_implemented("Generator model name", s))
    }
}

impl fmt::Display for GeneratorArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Super-resolution generators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SrGeneratorArch {
    /// `128_up_1`
    Up128x1,
    /// `128_up_2`
    Up128x2,
    /// `64_up_1`
    Up64x1,
    /// `64_up_2`
    Up64x2,
}

impl SrGeneratorArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            SrGeneratorArch::Up128x1 => "128_up_1",
            SrGeneratorArch::Up128x2 => "128_up_2",
            SrGeneratorArch::Up64x1 => "64_up_1",
            SrGeneratorArch::Up64x2 => "64_up_2",
        }
    }
}

impl FromStr for SrGeneratorArch {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "128_up_1" => Ok(SrGeneratorArch::Up128x1),
            "128_up_2" => Ok(SrGeneratorArch::Up128x2),
            "64_up_1" => Ok(SrGeneratorArch::Up64x1),
            "64_up_2" => Ok(SrGeneratorArch::Up64x2),
            other => Err(NetError::not_implemented("Generator model name", other)),
        }
    }
}

impl fmt::Display for SrGeneratorArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inpainting discriminators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscriminatorArch {
    /// `basic`: PatchGAN with 3 layers
    Basic,
    /// `n_layers`: PatchGAN with a configurable depth
    NLayers,
    /// `densenet`
    DenseNet,
}

impl FromStr for DiscriminatorArch {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(DiscriminatorArch::Basic),
            "n_layers" => Ok(DiscriminatorArch::NLayers),
            "densenet" => Ok(DiscriminatorArch::DenseNet),
            other => Err(NetError::not_implemented("Discriminator model name", other)),
        }
    }
}

/// Super-resolution discriminators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SrDiscriminatorArch {
    /// `sr_D`
    SrD,
}

impl FromStr for SrDiscriminatorArch {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sr_D" => Ok(SrDiscriminatorArch::SrD),
            other => Err(NetError::not_implemented("Discriminator model name", other)),
        }
    }
}
