//! Optimizer hyperparameters as seen by learning-rate schedules.
//!
//! Parameter updates belong to the training loop; what the schedules need
//! is the per-group learning rate they read at construction and rewrite on
//! every step.

pub mod lr_scheduler;

pub use lr_scheduler::{get_scheduler, LrPolicy, Scheduler};

use serde::{Serialize, Deserialize};

/// A group of parameters sharing one learning rate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamGroup {
    pub name: String,
    pub lr: f32,
    /// Learning rate at the time a schedule was attached
    pub initial_lr: Option<f32>,
}

impl ParamGroup {
    pub fn new<S: Into<String>>(name: S, lr: f32) -> Self {
        ParamGroup {
            name: name.into(),
            lr,
            initial_lr: None,
        }
    }
}

pub trait Optimizer {
    fn param_groups(&self) -> &[ParamGroup];
    fn param_groups_mut(&mut self) -> &mut [ParamGroup];

    /// Learning rates of all groups, in order
    fn learning_rates(&self) -> Vec<f32> {
        self.param_groups().iter().map(|g| g.lr).collect()
    }
}

/// Adam hyperparameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    groups: Vec<ParamGroup>,
}

impl Adam {
    /// Adam with a single parameter group
    pub fn new(lr: f32, beta1: f32, beta2: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon: 1e-8,
            groups: vec![ParamGroup::new("params", lr)],
        }
    }

    /// Add another parameter group with its own learning rate
    pub fn with_group(mut self, group: ParamGroup) -> Self {
        self.groups.push(group);
        self
    }
}

impl Optimizer for Adam {
    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        &mut self.groups
    }
}

/// Plain SGD hyperparameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SGD {
    pub momentum: f32,
    groups: Vec<ParamGroup>,
}

impl SGD {
    pub fn new(lr: f32) -> Self {
        SGD {
            momentum: 0.0,
            groups: vec![ParamGroup::new("params", lr)],
        }
    }

    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }
}

impl Optimizer for SGD {
    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        &mut self.groups
    }
}
