//! Transitions stored in the replay buffer.
use crate::ApexError;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// A single step of experience.
///
/// The payload is never modified after construction; the replay buffer only
/// changes the priority attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation before the action.
    pub state: ArrayD<f32>,

    /// Observation after the action.
    pub next_state: ArrayD<f32>,

    /// Action taken at the step before `state`.
    pub previous_action: usize,

    /// Action taken at `state`.
    pub action: usize,

    /// Raw reward. Clipping is applied when computing targets.
    pub reward: f32,

    /// Whether `next_state` is terminal.
    pub done: bool,
}

impl Transition {
    /// Creates a transition.
    pub fn new(
        state: ArrayD<f32>,
        next_state: ArrayD<f32>,
        previous_action: usize,
        action: usize,
        reward: f32,
        done: bool,
    ) -> Self {
        Self {
            state,
            next_state,
            previous_action,
            action,
            reward,
            done,
        }
    }

    /// Checks the actions against the size of the action space and the shapes
    /// of both observations.
    pub fn validate(&self, num_actions: usize) -> Result<(), ApexError> {
        if self.action >= num_actions || self.previous_action >= num_actions {
            return Err(ApexError::InvalidTransition(format!(
                "actions ({}, {}) out of range for {} actions",
                self.previous_action, self.action, num_actions
            )));
        }
        if self.state.shape() != self.next_state.shape() {
            return Err(ApexError::InvalidTransition(format!(
                "state shape {:?} differs from next state shape {:?}",
                self.state.shape(),
                self.next_state.shape()
            )));
        }
        if !self.reward.is_finite() {
            return Err(ApexError::InvalidTransition(format!(
                "reward {} is not finite",
                self.reward
            )));
        }
        Ok(())
    }
}

/// A transition paired with its initial sampling priority.
///
/// This is the item actors push into a replay buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedTransition {
    /// Sampling priority, typically the absolute TD-error.
    pub priority: f32,

    /// The experience.
    pub transition: Transition,
}
