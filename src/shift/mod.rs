//! Shift-Net layers for inpainting generators.
//!
//! [`InnerCos`] constrains the decoder feature of the hole region towards the
//! ground-truth encoder feature; [`InnerShiftTriple`] fills the hole region by
//! copying best-matching known encoder features. Both need a hole mask at
//! their own resolution, which the training loop supplies through the
//! handles returned by `define_g`.

pub mod inner_cos;
pub mod inner_shift;
pub mod mask;

pub use inner_cos::{InnerCos, InnerCosHandle};
pub use inner_shift::{InnerShiftTriple, ShiftHandle};
pub use mask::cal_feat_mask;

use serde::{Serialize, Deserialize};

/// Construction options of the shift and constraint layers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShiftOptions {
    /// Patch size used for matching
    pub shift_sz: usize,
    /// Sampling stride of candidate patches in the known region
    pub stride: usize,
    /// Minimum hole count in a 4x4 window for a downsampled cell to be a hole
    pub mask_thred: f32,
    pub triple_weight: f32,
    /// Scale of the guidance loss
    pub strength: f32,
    /// Disable the guidance loss
    pub skip: bool,
}

impl Default for ShiftOptions {
    fn default() -> Self {
        ShiftOptions {
            shift_sz: 1,
            stride: 1,
            mask_thred: 1.0,
            triple_weight: 1.0,
            strength: 1.0,
            skip: false,
        }
    }
}
