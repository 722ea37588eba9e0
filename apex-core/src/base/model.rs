//! Value-estimation model interface.
//!
//! The network is a collaborator: anything implementing [`QModel`] can be
//! trained by the [`Learner`](crate::Learner) and driven by an
//! [`ActorAgent`](crate::ActorAgent).
use crate::ApexError;
use anyhow::Result;
use ndarray::{Array2, ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Role of a parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Parameters updated by gradient steps.
    Main,

    /// Frozen copy of `Main` used to evaluate bootstrapped targets.
    Target,

    /// Centrally trained copy broadcast to actors.
    Global,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Main => write!(f, "main"),
            Role::Target => write!(f, "target"),
            Role::Global => write!(f, "global"),
        }
    }
}

/// Named tensors of a model, used to copy parameters between roles and threads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl ParameterSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tensor, replacing any tensor with the same name.
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Gets a tensor by name.
    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }

    /// Iterates over tensors in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArrayD<f32>)> {
        self.tensors.iter()
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Returns `true` if the set holds no tensor.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Overwrites every tensor with the tensor of the same name in `src`.
    ///
    /// Names and shapes are checked before anything is written, so a mismatch
    /// leaves `self` untouched.
    pub fn copy_from(&mut self, src: &ParameterSet) -> Result<(), ApexError> {
        if self.tensors.len() != src.tensors.len() {
            return Err(ApexError::ParameterMismatch(format!(
                "{} tensors in destination, {} in source",
                self.tensors.len(),
                src.tensors.len()
            )));
        }
        for (name, dst) in self.tensors.iter() {
            match src.tensors.get(name) {
                Some(t) if t.shape() == dst.shape() => {}
                Some(t) => {
                    return Err(ApexError::ParameterMismatch(format!(
                        "{}: shape {:?} vs {:?}",
                        name,
                        dst.shape(),
                        t.shape()
                    )))
                }
                None => {
                    return Err(ApexError::ParameterMismatch(format!(
                        "{} is missing in source",
                        name
                    )))
                }
            }
        }
        for (name, dst) in self.tensors.iter_mut() {
            if let Some(t) = src.tensors.get(name) {
                dst.assign(t);
            }
        }
        Ok(())
    }
}

/// Explicit execution context passed to every inference or gradient call.
///
/// It carries the optimization hyperparameters of the current step and
/// counters the model updates, so no session state lives in globals.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecContext {
    /// Learning rate for the next gradient step.
    pub learning_rate: f32,

    /// Gradients are rescaled so that their global norm does not exceed this value.
    pub gradient_clip_norm: Option<f32>,

    /// Number of forward passes run with this context.
    pub n_forward: usize,

    /// Number of gradient steps applied with this context.
    pub n_gradient_steps: usize,

    /// Global norm of the last gradient, before clipping.
    pub last_grad_norm: Option<f32>,
}

impl ExecContext {
    /// Context for inference only, as used by actors.
    pub fn inference() -> Self {
        Self::training(0.0, None)
    }

    /// Context for training.
    pub fn training(learning_rate: f32, gradient_clip_norm: Option<f32>) -> Self {
        Self {
            learning_rate,
            gradient_clip_norm,
            n_forward: 0,
            n_gradient_steps: 0,
            last_grad_norm: None,
        }
    }
}

/// Inputs of the importance-weighted squared TD loss
/// `mean_i(weight_i * (target_i - Q_main(state_i, previous_action_i)[action_i])^2)`.
///
/// Targets are constants; gradients flow only through the main parameters.
#[derive(Debug, Clone, Copy)]
pub struct WeightedLoss<'a> {
    /// Current states.
    pub states: &'a [ArrayViewD<'a, f32>],

    /// Actions preceding the current states.
    pub previous_actions: &'a [usize],

    /// Actions taken at the current states.
    pub actions: &'a [usize],

    /// Bootstrapped targets.
    pub targets: &'a [f32],

    /// Importance-sampling weights.
    pub weights: &'a [f32],
}

impl<'a> WeightedLoss<'a> {
    /// Number of items in the loss.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns `true` if the loss has no item.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Q-value model with `Main` and `Target` parameter sets.
///
/// `Global` parameters are not owned by a model; they are held by a
/// [`GlobalParameters`](crate::GlobalParameters) store and copied in and out
/// by the [`SyncController`](crate::SyncController).
pub trait QModel: Send {
    /// Number of discrete actions.
    fn num_actions(&self) -> usize;

    /// Computes Q-values, one row per state.
    fn forward(
        &self,
        ctx: &mut ExecContext,
        role: Role,
        states: &[ArrayViewD<f32>],
        previous_actions: &[usize],
    ) -> Result<Array2<f32>>;

    /// Computes Q-values of next states with the main and the target parameters.
    ///
    /// `actions` are the actions that led to the next states.
    fn forward_next(
        &self,
        ctx: &mut ExecContext,
        next_states: &[ArrayViewD<f32>],
        actions: &[usize],
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        let main = self.forward(ctx, Role::Main, next_states, actions)?;
        let target = self.forward(ctx, Role::Target, next_states, actions)?;
        Ok((main, target))
    }

    /// Takes a single gradient step on the main parameters and returns the
    /// loss value before the step.
    fn apply_gradient(&mut self, ctx: &mut ExecContext, loss: &WeightedLoss) -> Result<f32>;

    /// Snapshot of a parameter set.
    fn parameters(&self, role: Role) -> Result<ParameterSet>;

    /// Overwrites a parameter set.
    fn load_parameters(&mut self, role: Role, params: &ParameterSet) -> Result<()>;

    /// Copies every tensor of `from` into `to`.
    fn copy_parameters(&mut self, from: Role, to: Role) -> Result<()> {
        let params = self.parameters(from)?;
        self.load_parameters(to, &params)
    }
}
