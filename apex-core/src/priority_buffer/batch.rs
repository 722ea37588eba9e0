use super::EntryId;
use crate::Transition;
use ndarray::ArrayViewD;
use std::sync::Arc;

/// A minibatch drawn from a [`PriorityBuffer`](super::PriorityBuffer).
#[derive(Debug, Clone)]
pub struct PrioritizedBatch {
    /// Sampled transitions, shared with the buffer.
    pub transitions: Vec<Arc<Transition>>,

    /// Ids for writing back priorities.
    pub ids: Vec<EntryId>,

    /// Normalized importance-sampling weights, all in `(0, 1]`.
    pub weights: Vec<f32>,

    /// Sampling probability `P(i)` of each item.
    pub probabilities: Vec<f32>,
}

impl PrioritizedBatch {
    /// Number of sampled items.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns `true` if the batch holds no item.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Views of the current states.
    pub fn states(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.transitions.iter().map(|t| t.state.view()).collect()
    }

    /// Views of the next states.
    pub fn next_states(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.transitions.iter().map(|t| t.next_state.view()).collect()
    }

    /// Actions preceding the current states.
    pub fn previous_actions(&self) -> Vec<usize> {
        self.transitions.iter().map(|t| t.previous_action).collect()
    }

    /// Actions taken at the current states.
    pub fn actions(&self) -> Vec<usize> {
        self.transitions.iter().map(|t| t.action).collect()
    }

    /// Raw rewards.
    pub fn rewards(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.reward).collect()
    }

    /// Terminal flags.
    pub fn dones(&self) -> Vec<bool> {
        self.transitions.iter().map(|t| t.done).collect()
    }
}
