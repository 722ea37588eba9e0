//! Configuration of the prioritized replay buffer.
use super::WeightNormalizer;
use crate::ApexError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PriorityBuffer`](super::PriorityBuffer).
///
/// # Examples
///
/// ```rust
/// use apex_core::{PriorityBufferConfig, WeightNormalizer};
///
/// let config = PriorityBufferConfig::default()
///     .capacity(100_000)
///     .seed(42)
///     .importance_sampling_beta(0.4)
///     .importance_sampling_beta_final(Some(1.0))
///     .normalize(WeightNormalizer::Batch);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PriorityBufferConfig {
    /// Maximum number of transitions. The oldest entry is overwritten once full.
    pub capacity: usize,

    /// Seed of the random number generator used for sampling.
    pub seed: u64,

    /// Lower bound of stored priorities.
    pub priority_epsilon: f32,

    /// Exponent of importance sampling weights at the start of training.
    pub importance_sampling_beta: f32,

    /// If given, $\beta$ is annealed linearly to this value.
    #[serde(default)]
    pub importance_sampling_beta_final: Option<f32>,

    /// Number of priority-update rounds over which $\beta$ is annealed.
    #[serde(default)]
    pub beta_anneal_steps: usize,

    /// How importance weights are normalized.
    #[serde(default)]
    pub normalize: WeightNormalizer,
}

impl Default for PriorityBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            seed: 42,
            priority_epsilon: 1e-6,
            importance_sampling_beta: 0.4,
            importance_sampling_beta_final: None,
            beta_anneal_steps: 0,
            normalize: WeightNormalizer::Batch,
        }
    }
}

impl PriorityBufferConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the lower bound of priorities.
    pub fn priority_epsilon(mut self, eps: f32) -> Self {
        self.priority_epsilon = eps;
        self
    }

    /// Sets the initial exponent of importance weights.
    pub fn importance_sampling_beta(mut self, beta: f32) -> Self {
        self.importance_sampling_beta = beta;
        self
    }

    /// Sets the final exponent of importance weights.
    pub fn importance_sampling_beta_final(mut self, beta: Option<f32>) -> Self {
        self.importance_sampling_beta_final = beta;
        self
    }

    /// Sets the number of rounds over which $\beta$ is annealed.
    pub fn beta_anneal_steps(mut self, n: usize) -> Self {
        self.beta_anneal_steps = n;
        self
    }

    /// Sets the normalization of importance weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ApexError> {
        if self.capacity == 0 {
            return Err(ApexError::InvalidCapacity(self.capacity));
        }
        if !(self.priority_epsilon.is_finite() && self.priority_epsilon > 0.0) {
            return Err(ApexError::InvalidConfig(format!(
                "priority_epsilon must be positive, got {}",
                self.priority_epsilon
            )));
        }
        let betas = std::iter::once(self.importance_sampling_beta)
            .chain(self.importance_sampling_beta_final);
        for beta in betas {
            if !(0.0..=1.0).contains(&beta) {
                return Err(ApexError::InvalidConfig(format!(
                    "importance sampling beta must be in [0, 1], got {}",
                    beta
                )));
            }
        }
        Ok(())
    }

    /// Constructs [`PriorityBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PriorityBufferConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
