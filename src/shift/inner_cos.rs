use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use ndarray::{s, Array2, Array4, ArrayView4, Axis};

use crate::error::{NetError, Result};
use crate::layers::traits::{LayerKind, Module};
use super::mask::{cal_feat_mask, check_mask};

/// State shared between an [`InnerCos`] layer and its [`InnerCosHandle`]
#[derive(Debug, Default)]
pub struct InnerCosState {
    /// Hole mask at this layer's resolution
    pub mask: Option<Array2<bool>>,
    /// Guidance target: the encoder feature of the ground truth
    pub target: Option<Array4<f32>>,
    /// Loss recorded by the most recent training forward
    pub loss: Option<f32>,
    /// `(squared error sum, element count)` of each slice of a split batch
    partials: Vec<(f32, usize)>,
}

/// Guidance constraint layer.
///
/// Passes its input through unchanged. In training, unless `skip` is set, it
/// records the mean squared error between the decoder half of its input
/// (the first `C/2` channels) and the target, both restricted to the hole
/// region and scaled by `strength`. Without a target the decoder half is
/// compared against zeros.
///
/// When the batch is split over replicas each one compares its rows against
/// the matching rows of the target, and the master merges the slices into
/// the mean over the whole batch.
#[derive(Clone, Debug)]
pub struct InnerCos {
    pub strength: f32,
    pub skip: bool,
    pub layer_to_last: usize,
    pub mask_thred: f32,
    training: bool,
    batch_slice: Option<Range<usize>>,
    state: Arc<Mutex<InnerCosState>>,
}

impl InnerCos {
    pub fn new(strength: f32, skip: bool, layer_to_last: usize, mask_thred: f32) -> Self {
        InnerCos {
            strength,
            skip,
            layer_to_last,
            mask_thred,
            training: true,
            batch_slice: None,
            state: Arc::new(Mutex::new(InnerCosState::default())),
        }
    }

    /// A handle sharing this layer's state, for the training loop
    pub fn handle(&self) -> InnerCosHandle {
        InnerCosHandle {
            strength: self.strength,
            skip: self.skip,
            layer_to_last: self.layer_to_last,
            mask_thred: self.mask_thred,
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, InnerCosState>> {
        self.state.lock().map_err(|_| NetError::poisoned("InnerCos"))
    }

    /// Squared error sum over the hole region and the number of decoder
    /// values it is averaged over
    fn guidance_error(&self, input: &ArrayView4<f32>, state: &InnerCosState) -> Result<(f32, usize)> {
        let (batch_size, channels, height, width) = input.dim();
        let half = channels / 2;
        let mask = state
            .mask
            .as_ref()
            .ok_or_else(|| NetError::MissingState("InnerCos mask has not been set".to_string()))?;
        check_mask("InnerCos", mask, height, width)?;

        let former = input.slice(s![.., ..half, .., ..]);
        let rows = self.batch_slice.clone().unwrap_or(0..batch_size);
        if rows.len() != batch_size {
            return Err(NetError::dimension_mismatch(
                format!("batch slice {:?} of {} rows", rows, rows.len()),
                format!("{} rows", batch_size),
            ));
        }
        let target = match &state.target {
            Some(target) => {
                let target_rows = target.len_of(Axis(0));
                let fits = target.dim() == (target_rows, half, height, width)
                    && rows.end <= target_rows
                    && (self.batch_slice.is_some() || target_rows == batch_size);
                if !fits {
                    return Err(NetError::dimension_mismatch(
                        format!("InnerCos target [N, {}, {}, {}] covering rows {:?}", half, height, width, rows),
                        format!("{:?}", target.shape()),
                    ));
                }
                Some(target.slice(s![rows, .., .., ..]))
            }
            None => None,
        };

        let mut sum = 0.0f32;
        for b in 0..batch_size {
            for c in 0..half {
                for h in 0..height {
                    for w in 0..width {
                        if !mask[[h, w]] {
                            continue;
                        }
                        let goal = target.as_ref().map_or(0.0, |t| t[[b, c, h, w]]);
                        let diff = self.strength * (former[[b, c, h, w]] - goal);
                        sum += diff * diff;
                    }
                }
            }
        }
        Ok((sum, former.len()))
    }
}

impl Module for InnerCos {
    fn kind(&self) -> LayerKind {
        LayerKind::Constraint
    }

    fn name(&self) -> String {
        format!(
            "InnerCos(skip: {}, layer {} to last, strength: {})",
            self.skip, self.layer_to_last, self.strength
        )
    }

    fn forward(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        if input.len_of(Axis(1)) % 2 != 0 {
            return Err(NetError::dimension_mismatch(
                "InnerCos input with an even channel count".to_string(),
                format!("{} channels", input.len_of(Axis(1))),
            ));
        }
        if self.training && !self.skip {
            let mut state = self.lock()?;
            let (sum, count) = self.guidance_error(&input, &state)?;
            if self.batch_slice.is_some() {
                state.partials.push((sum, count));
            } else {
                state.loss = Some(sum / count.max(1) as f32);
            }
        }
        Ok(input.to_owned())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn set_batch_slice(&mut self, range: Option<Range<usize>>) {
        self.batch_slice = range;
    }

    fn merge_batch_slices(&mut self, completed: bool) {
        self.batch_slice = None;
        let Ok(mut state) = self.lock() else {
            return;
        };
        let partials = std::mem::take(&mut state.partials);
        if completed && !partials.is_empty() {
            let (sum, count) = partials
                .iter()
                .fold((0.0f32, 0usize), |(s, n), &(sum, count)| (s + sum, n + count));
            state.loss = Some(sum / count.max(1) as f32);
        }
    }

    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
}

/// Training-loop side of an [`InnerCos`] layer
#[derive(Clone, Debug)]
pub struct InnerCosHandle {
    pub strength: f32,
    pub skip: bool,
    pub layer_to_last: usize,
    pub mask_thred: f32,
    state: Arc<Mutex<InnerCosState>>,
}

impl InnerCosHandle {
    fn lock(&self) -> Result<MutexGuard<'_, InnerCosState>> {
        self.state.lock().map_err(|_| NetError::poisoned("InnerCos"))
    }

    /// Set the hole mask from the global `[1, 1, H, W]` mask
    pub fn set_mask(&self, mask_global: ArrayView4<f32>) -> Result<()> {
        let mask = cal_feat_mask(mask_global, self.layer_to_last, self.mask_thred)?;
        self.lock()?.mask = Some(mask);
        Ok(())
    }

    /// Set the guidance target (shape of the decoder half of the layer input)
    pub fn set_target(&self, target: Array4<f32>) -> Result<()> {
        self.lock()?.target = Some(target);
        Ok(())
    }

    pub fn mask(&self) -> Result<Option<Array2<bool>>> {
        Ok(self.lock()?.mask.clone())
    }

    /// Loss recorded by the most recent training forward
    pub fn loss(&self) -> Result<Option<f32>> {
        Ok(self.lock()?.loss)
    }
}

impl fmt::Display for InnerCosHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InnerCos(skip: {}, layer {} to last, strength: {})",
            self.skip, self.layer_to_last, self.strength
        )
    }
}
