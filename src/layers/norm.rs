use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use super::batch_norm::{BatchNorm2d, InstanceNorm2d};
use super::traits::Module;

/// Normalization layer selectable by name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormType {
    /// `batch`: affine batch norm that tracks running statistics
    Batch,
    /// `instance`: affine instance norm without running statistics
    Instance,
    /// `none`: no normalization
    None,
}

impl FromStr for NormType {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "batch" => Ok(NormType::Batch),
            "instance" => Ok(NormType::Instance),
            "none" => Ok(NormType::None),
            other => Err(NetError::not_implemented("normalization layer", other)),
        }
    }
}

impl fmt::Display for NormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormType::Batch => write!(f, "batch"),
            NormType::Instance => write!(f, "instance"),
            NormType::None => write!(f, "none"),
        }
    }
}

/// Constructor for the normalization layers of one network.
///
/// Topologies receive an `Option<NormLayer>` and call [`NormLayer::build`]
/// with the channel count wherever they place a normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormLayer {
    Batch,
    Instance,
}

impl NormLayer {
    /// Build a normalization layer over `num_features` channels
    pub fn build(&self, num_features: usize) -> Box<dyn Module> {
        match self {
            NormLayer::Batch => Box::new(BatchNorm2d::new(num_features)),
            NormLayer::Instance => Box::new(InstanceNorm2d::new(num_features)),
        }
    }

    /// Convolutions followed by this norm keep their own bias only when the
    /// norm has no running statistics to absorb it.
    pub fn conv_bias(norm: Option<NormLayer>) -> bool {
        !matches!(norm, Some(NormLayer::Batch))
    }
}

impl From<NormType> for Option<NormLayer> {
    fn from(norm: NormType) -> Self {
        match norm {
            NormType::Batch => Some(NormLayer::Batch),
            NormType::Instance => Some(NormLayer::Instance),
            NormType::None => None,
        }
    }
}

/// Map a normalization name to a layer constructor.
///
/// `"none"` yields `Ok(None)`; unknown names are not implemented.
pub fn get_norm_layer(norm_type: &str) -> Result<Option<NormLayer>> {
    let norm: NormType = norm_type.parse()?;
    Ok(norm.into())
}
