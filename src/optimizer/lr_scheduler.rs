use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::error::{NetError, Result};
use crate::options::Options;
use super::Optimizer;

/// Learning rate policy selectable by name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LrPolicy {
    /// `lambda`: constant for `niter` epochs, then linear decay over `niter_decay`
    Lambda,
    /// `step`: multiply by 0.1 every `lr_decay_iters` epochs
    Step,
    /// `plateau`: multiply by 0.2 when the monitored loss stops improving
    Plateau,
    /// `cosine`: cosine annealing to 0 over `niter` epochs
    Cosine,
}

impl FromStr for LrPolicy {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lambda" => Ok(LrPolicy::Lambda),
            "step" => Ok(LrPolicy::Step),
            "plateau" => Ok(LrPolicy::Plateau),
            "cosine" => Ok(LrPolicy::Cosine),
            other => Err(NetError::not_implemented("learning rate policy", other)),
        }
    }
}

impl fmt::Display for LrPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LrPolicy::Lambda => "lambda",
            LrPolicy::Step => "step",
            LrPolicy::Plateau => "plateau",
            LrPolicy::Cosine => "cosine",
        };
        write!(f, "{}", name)
    }
}

/// Learning rate scheduling strategies
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LearningRateSchedule {
    /// `lr = base * (1 - max(0, epoch + 1 + epoch_count - niter) / (niter_decay + 1))`
    LinearDecay {
        epoch_count: usize,
        niter: usize,
        niter_decay: usize,
    },

    /// Step decay: `lr = base * gamma^(epoch / step_size)`
    StepDecay {
        step_size: usize,
        gamma: f32,
    },

    /// Cosine annealing: `lr = eta_min + (base - eta_min) * (1 + cos(pi * epoch / t_max)) / 2`
    CosineAnnealing {
        t_max: usize,
        eta_min: f32,
    },

    /// Multiply by `factor` after `patience` epochs without a relative
    /// improvement of `threshold` in a minimized metric
    ReduceOnPlateau {
        factor: f32,
        threshold: f32,
        patience: usize,
        cooldown: usize,
        min_lr: f32,
        eps: f32,
    },
}

impl LearningRateSchedule {
    /// The schedule a policy name selects, parameterized from the options
    pub fn from_options(policy: LrPolicy, opt: &Options) -> Result<Self> {
        match policy {
            LrPolicy::Lambda => Ok(LearningRateSchedule::LinearDecay {
                epoch_count: opt.epoch_count,
                niter: opt.niter,
                niter_decay: opt.niter_decay,
            }),
            LrPolicy::Step => {
                if opt.lr_decay_iters == 0 {
                    return Err(NetError::invalid_parameter("lr_decay_iters", "step size must be greater than 0"));
                }
                Ok(LearningRateSchedule::StepDecay {
                    step_size: opt.lr_decay_iters,
                    gamma: 0.1,
                })
            }
            LrPolicy::Plateau => Ok(LearningRateSchedule::ReduceOnPlateau {
                factor: 0.2,
                threshold: 0.01,
                patience: 5,
                cooldown: 0,
                min_lr: 0.0,
                eps: 1e-8,
            }),
            LrPolicy::Cosine => {
                if opt.niter == 0 {
                    return Err(NetError::invalid_parameter("niter", "cosine period must be greater than 0"));
                }
                Ok(LearningRateSchedule::CosineAnnealing {
                    t_max: opt.niter,
                    eta_min: 0.0,
                })
            }
        }
    }

    /// Reject periods of zero epochs
    pub fn validate(&self) -> Result<()> {
        match self {
            LearningRateSchedule::StepDecay { step_size: 0, .. } => {
                Err(NetError::invalid_parameter("step_size", "step size must be greater than 0"))
            }
            LearningRateSchedule::CosineAnnealing { t_max: 0, .. } => {
                Err(NetError::invalid_parameter("t_max", "cosine period must be greater than 0"))
            }
            _ => Ok(()),
        }
    }

    /// Learning rate at `epoch` for a group starting at `base_lr`; `None`
    /// for metric-driven schedules and for a zero period.
    pub fn get_lr(&self, base_lr: f32, epoch: usize) -> Option<f32> {
        match self {
            LearningRateSchedule::LinearDecay { epoch_count, niter, niter_decay } => {
                let past = (epoch as i64 + 1 + *epoch_count as i64 - *niter as i64).max(0) as f32;
                Some(base_lr * (1.0 - past / (*niter_decay + 1) as f32))
            }

            LearningRateSchedule::StepDecay { step_size, gamma } => {
                let num_decays = epoch.checked_div(*step_size)? as i32;
                Some(base_lr * gamma.powi(num_decays))
            }

            LearningRateSchedule::CosineAnnealing { t_max: 0, .. } => None,

            LearningRateSchedule::CosineAnnealing { t_max, eta_min } => {
                let progress = epoch as f32 / *t_max as f32;
                Some(eta_min + 0.5 * (base_lr - eta_min) * (1.0 + (std::f32::consts::PI * progress).cos()))
            }

            LearningRateSchedule::ReduceOnPlateau { .. } => None,
        }
    }
}

/// Bookkeeping of the plateau policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlateauState {
    pub best: f32,
    pub num_bad_epochs: usize,
    pub cooldown_counter: usize,
}

impl Default for PlateauState {
    fn default() -> Self {
        PlateauState {
            best: f32::INFINITY,
            num_bad_epochs: 0,
            cooldown_counter: 0,
        }
    }
}

/// A schedule attached to an optimizer.
///
/// The scheduler does not hold the optimizer; every step receives it and
/// writes the new learning rate into each of its parameter groups.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scheduler {
    pub schedule: LearningRateSchedule,
    base_lrs: Vec<f32>,
    last_epoch: usize,
    last_lrs: Vec<f32>,
    plateau: PlateauState,
}

impl Scheduler {
    /// Attach `schedule` to `optimizer`, recording each group's initial
    /// learning rate and applying the epoch-0 value.
    pub fn new(schedule: LearningRateSchedule, optimizer: &mut dyn Optimizer) -> Result<Self> {
        schedule.validate()?;
        let mut base_lrs = Vec::new();
        for group in optimizer.param_groups_mut() {
            let initial = *group.initial_lr.get_or_insert(group.lr);
            base_lrs.push(initial);
        }
        if base_lrs.is_empty() {
            return Err(NetError::invalid_parameter("optimizer", "optimizer has no parameter groups"));
        }

        let mut scheduler = Scheduler {
            schedule,
            last_lrs: optimizer.learning_rates(),
            base_lrs,
            last_epoch: 0,
            plateau: PlateauState::default(),
        };
        scheduler.apply_epoch(optimizer)?;
        Ok(scheduler)
    }

    pub fn base_lrs(&self) -> &[f32] {
        &self.base_lrs
    }

    pub fn last_epoch(&self) -> usize {
        self.last_epoch
    }

    /// Learning rates written by the most recent step
    pub fn last_lr(&self) -> &[f32] {
        &self.last_lrs
    }

    pub fn plateau_state(&self) -> &PlateauState {
        &self.plateau
    }

    /// Advance one epoch. Metric-driven schedules must use [`step_with_metric`].
    ///
    /// [`step_with_metric`]: Scheduler::step_with_metric
    pub fn step(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        if let LearningRateSchedule::ReduceOnPlateau { .. } = self.schedule {
            return Err(NetError::invalid_parameter(
                "metric",
                "the plateau policy needs a metric; use step_with_metric",
            ));
        }
        self.last_epoch += 1;
        self.apply_epoch(optimizer)
    }

    /// Advance one epoch reporting `metric` (lower is better). Epoch-based
    /// schedules ignore the metric.
    pub fn step_with_metric(&mut self, optimizer: &mut dyn Optimizer, metric: f32) -> Result<()> {
        let (factor, threshold, patience, cooldown, min_lr, eps) = match self.schedule {
            LearningRateSchedule::ReduceOnPlateau { factor, threshold, patience, cooldown, min_lr, eps } => {
                (factor, threshold, patience, cooldown, min_lr, eps)
            }
            _ => return self.step(optimizer),
        };
        self.check_groups(optimizer)?;
        self.last_epoch += 1;

        let plateau = &mut self.plateau;
        if metric < plateau.best * (1.0 - threshold) {
            plateau.best = metric;
            plateau.num_bad_epochs = 0;
        } else {
            plateau.num_bad_epochs += 1;
        }

        if plateau.cooldown_counter > 0 {
            plateau.cooldown_counter -= 1;
            plateau.num_bad_epochs = 0;
        }

        if plateau.num_bad_epochs > patience {
            for (i, group) in optimizer.param_groups_mut().iter_mut().enumerate() {
                let new_lr = (group.lr * factor).max(min_lr);
                if group.lr - new_lr > eps {
                    info!("Epoch {}: reducing learning rate of group {} to {:.4e}", self.last_epoch, i, new_lr);
                    group.lr = new_lr;
                }
            }
            plateau.cooldown_counter = cooldown;
            plateau.num_bad_epochs = 0;
        }

        self.last_lrs = optimizer.learning_rates();
        Ok(())
    }

    fn check_groups(&self, optimizer: &dyn Optimizer) -> Result<()> {
        let groups = optimizer.param_groups().len();
        if groups != self.base_lrs.len() {
            return Err(NetError::dimension_mismatch(
                format!("{} parameter groups", self.base_lrs.len()),
                format!("{} parameter groups", groups),
            ));
        }
        Ok(())
    }

    fn apply_epoch(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        self.schedule.validate()?;
        self.check_groups(optimizer)?;
        for (group, &base) in optimizer.param_groups_mut().iter_mut().zip(&self.base_lrs) {
            if let Some(lr) = self.schedule.get_lr(base, self.last_epoch) {
                group.lr = lr;
            }
        }
        self.last_lrs = optimizer.learning_rates();
        debug!("epoch {}: learning rates {:?}", self.last_epoch, self.last_lrs);
        Ok(())
    }
}

/// Build the learning rate scheduler selected by `opt.lr_policy`.
pub fn get_scheduler(optimizer: &mut dyn Optimizer, opt: &Options) -> Result<Scheduler> {
    let policy: LrPolicy = opt.lr_policy.parse()?;
    let schedule = LearningRateSchedule::from_options(policy, opt)?;
    Scheduler::new(schedule, optimizer)
}
