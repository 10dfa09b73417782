use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use ndarray::{s, Array1, Array2, Array3, Array4, ArrayView3, ArrayView4, Axis};

use crate::error::{NetError, Result};
use crate::layers::container::concat_channels;
use crate::layers::traits::{LayerKind, Module};
use super::mask::{cal_feat_mask, check_mask};

/// State shared between an [`InnerShiftTriple`] layer and its [`ShiftHandle`]
#[derive(Debug, Default)]
pub struct ShiftState {
    /// Hole mask at this layer's resolution
    pub mask: Option<Array2<bool>>,
}

/// Shift-connection layer.
///
/// The input carries the decoder feature in its first half of channels and
/// the encoder feature in the second half. For every hole cell the decoder
/// patch around it is compared, by cosine similarity, against encoder patches
/// centred on known cells (sampled every `stride` cells); the encoder feature
/// at the best match is copied into a third feature map that is zero outside
/// the hole. The output is `concat(decoder, encoder, shifted)`.
#[derive(Clone, Debug)]
pub struct InnerShiftTriple {
    pub shift_sz: usize,
    pub stride: usize,
    pub mask_thred: f32,
    /// Weight of the shifted branch's gradient when training
    pub triple_weight: f32,
    pub layer_to_last: usize,
    state: Arc<Mutex<ShiftState>>,
}

impl InnerShiftTriple {
    pub fn new(shift_sz: usize, stride: usize, mask_thred: f32, triple_weight: f32, layer_to_last: usize) -> Self {
        InnerShiftTriple {
            shift_sz: shift_sz.max(1),
            stride: stride.max(1),
            mask_thred,
            triple_weight,
            layer_to_last,
            state: Arc::new(Mutex::new(ShiftState::default())),
        }
    }

    pub fn handle(&self) -> ShiftHandle {
        ShiftHandle {
            shift_sz: self.shift_sz,
            stride: self.stride,
            mask_thred: self.mask_thred,
            triple_weight: self.triple_weight,
            layer_to_last: self.layer_to_last,
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ShiftState>> {
        self.state.lock().map_err(|_| NetError::poisoned("InnerShiftTriple"))
    }

    /// Flattened `shift_sz x shift_sz` patch centred on `(h, w)`, zero padded
    fn patch(&self, feature: &ArrayView3<f32>, h: usize, w: usize) -> Array1<f32> {
        let (channels, height, width) = feature.dim();
        let radius = (self.shift_sz / 2) as isize;
        let mut out = Array1::zeros(channels * self.shift_sz * self.shift_sz);
        let mut idx = 0;
        for c in 0..channels {
            for dh in 0..self.shift_sz as isize {
                for dw in 0..self.shift_sz as isize {
                    let y = h as isize + dh - radius;
                    let x = w as isize + dw - radius;
                    if y >= 0 && x >= 0 && (y as usize) < height && (x as usize) < width {
                        out[idx] = feature[[c, y as usize, x as usize]];
                    }
                    idx += 1;
                }
            }
        }
        out
    }

    fn shift_sample(&self, former: ArrayView3<f32>, latter: ArrayView3<f32>, mask: &Array2<bool>) -> Array3<f32> {
        let (channels, height, width) = latter.dim();
        let mut shifted = Array3::zeros((channels, height, width));

        let candidates: Vec<((usize, usize), Array1<f32>)> = (0..height)
            .step_by(self.stride)
            .flat_map(|h| (0..width).step_by(self.stride).map(move |w| (h, w)))
            .filter(|&(h, w)| !mask[[h, w]])
            .map(|(h, w)| {
                let p = self.patch(&latter, h, w);
                let norm = p.dot(&p).sqrt().max(1e-8);
                ((h, w), p / norm)
            })
            .collect();
        if candidates.is_empty() {
            return shifted;
        }

        for ((h, w), &hole) in mask.indexed_iter() {
            if !hole {
                continue;
            }
            let query = self.patch(&former, h, w);
            let (best, _) = candidates.iter().fold(((0, 0), f32::NEG_INFINITY), |acc, (pos, p)| {
                let score = query.dot(p);
                if score > acc.1 { (*pos, score) } else { acc }
            });
            shifted
                .slice_mut(s![.., h, w])
                .assign(&latter.slice(s![.., best.0, best.1]));
        }
        shifted
    }
}

impl Module for InnerShiftTriple {
    fn kind(&self) -> LayerKind {
        LayerKind::Shift
    }

    fn name(&self) -> String {
        format!(
            "InnerShiftTriple(shift_sz: {}, stride: {}, mask_thred: {}, triple_weight: {}, layer {} to last)",
            self.shift_sz, self.stride, self.mask_thred, self.triple_weight, self.layer_to_last
        )
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch_size, channels, height, width) = input.dim();
        if channels % 2 != 0 {
            return Err(NetError::dimension_mismatch(
                "InnerShiftTriple input with an even channel count".to_string(),
                format!("{} channels", channels),
            ));
        }
        let half = channels / 2;
        let mask = self
            .lock()?
            .mask
            .clone()
            .ok_or_else(|| NetError::MissingState("InnerShiftTriple mask has not been set".to_string()))?;
        check_mask("InnerShiftTriple", &mask, height, width)?;

        let former = input.slice(s![.., ..half, .., ..]);
        let latter = input.slice(s![.., half.., .., ..]);
        let mut shifted = Array4::zeros((batch_size, half, height, width));
        for b in 0..batch_size {
            let sample = self.shift_sample(
                former.index_axis(Axis(0), b),
                latter.index_axis(Axis(0), b),
                &mask,
            );
            shifted.index_axis_mut(Axis(0), b).assign(&sample);
        }

        concat_channels(&[former, latter, shifted.view()])
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// Training-loop side of an [`InnerShiftTriple`] layer
#[derive(Clone, Debug)]
pub struct ShiftHandle {
    pub shift_sz: usize,
    pub stride: usize,
    pub mask_thred: f32,
    pub triple_weight: f32,
    pub layer_to_last: usize,
    state: Arc<Mutex<ShiftState>>,
}

impl ShiftHandle {
    fn lock(&self) -> Result<MutexGuard<'_, ShiftState>> {
        self.state.lock().map_err(|_| NetError::poisoned("InnerShiftTriple"))
    }

    /// Set the hole mask from the global `[1, 1, H, W]` mask
    pub fn set_mask(&self, mask_global: ArrayView4<f32>) -> Result<()> {
        let mask = cal_feat_mask(mask_global, self.layer_to_last, self.mask_thred)?;
        self.lock()?.mask = Some(mask);
        Ok(())
    }

    pub fn mask(&self) -> Result<Option<Array2<bool>>> {
        Ok(self.lock()?.mask.clone())
    }
}

impl fmt::Display for ShiftHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InnerShiftTriple(shift_sz: {}, stride: {}, mask_thred: {}, triple_weight: {}, layer {} to last)",
            self.shift_sz, self.stride, self.mask_thred, self.triple_weight, self.layer_to_last
        )
    }
}
