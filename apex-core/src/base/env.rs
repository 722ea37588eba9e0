//! Environment interface consumed by actors.
use anyhow::Result;
use ndarray::ArrayD;

/// Outcome of applying an action to an environment.
#[derive(Debug, Clone)]
pub struct Step {
    /// Observation after the action.
    pub next_state: ArrayD<f32>,

    /// Reward for the action.
    pub reward: f32,

    /// Whether the episode terminated.
    pub done: bool,
}

/// Environment with a discrete action space.
///
/// Simulation is not part of this crate; implementations wrap whatever
/// simulator the actors run against.
pub trait Env {
    /// Number of discrete actions.
    fn num_actions(&self) -> usize;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<ArrayD<f32>>;

    /// Applies an action.
    fn step(&mut self, action: usize) -> Result<Step>;
}
