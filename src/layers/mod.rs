//! Forward-only layer toolkit over NCHW `ndarray` tensors.

pub mod traits;
pub mod batch_norm;
pub mod container;
pub mod conv;
pub mod initialization;
pub mod linear;
pub mod norm;
pub mod pooling;

pub use traits::{apply, count_kind, num_parameters, summary, try_apply, LayerKind, Module, ParamsMut};
pub use batch_norm::{BatchNorm2d, InstanceNorm2d};
pub use container::{concat_channels, DenseConcat, Residual, Sequential};
pub use conv::{Conv2d, ConvTranspose2d, SpectralNorm};
pub use initialization::InitType;
pub use linear::Linear;
pub use norm::{get_norm_layer, NormLayer, NormType};
pub use pooling::{AvgPool2d, GlobalAvgPool2d, PixelShuffle};
