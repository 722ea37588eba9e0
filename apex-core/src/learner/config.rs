//! Configuration of [`Learner`](super::Learner).
use super::LrScheduler;
use crate::{ApexError, RewardClipping};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Learner`](super::Learner).
///
/// ```rust
/// use apex_core::{LearnerConfig, LrScheduler, RewardClipping};
///
/// let config = LearnerConfig::default()
///     .batch_size(32)
///     .discount_factor(0.99)
///     .reward_clipping(RewardClipping::AbsOne)
///     .lr(LrScheduler { start: 1e-3, end: 1e-4, anneal_frame_count: 1_000_000 })
///     .target_refresh_interval(2500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct LearnerConfig {
    /// Number of transitions per optimization step.
    pub batch_size: usize,

    /// Discount factor of bootstrapped targets.
    pub discount_factor: f32,

    /// Gradients are rescaled so that their global norm does not exceed this value.
    pub gradient_clip_norm: Option<f32>,

    /// Clipping of rewards before the target computation.
    #[serde(default)]
    pub reward_clipping: RewardClipping,

    /// Learning-rate schedule.
    pub lr: LrScheduler,

    /// Interval of target refresh in optimization steps.
    pub target_refresh_interval: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            discount_factor: 0.99,
            gradient_clip_norm: Some(40.0),
            reward_clipping: RewardClipping::AbsOne,
            lr: LrScheduler::default(),
            target_refresh_interval: 2500,
        }
    }
}

impl LearnerConfig {
    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f32) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the maximum global norm of gradients.
    pub fn gradient_clip_norm(mut self, v: Option<f32>) -> Self {
        self.gradient_clip_norm = v;
        self
    }

    /// Sets the reward clipping.
    pub fn reward_clipping(mut self, v: RewardClipping) -> Self {
        self.reward_clipping = v;
        self
    }

    /// Sets the learning-rate schedule.
    pub fn lr(mut self, v: LrScheduler) -> Self {
        self.lr = v;
        self
    }

    /// Sets the interval of target refresh.
    pub fn target_refresh_interval(mut self, v: usize) -> Self {
        self.target_refresh_interval = v;
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ApexError> {
        let invalid = |msg: String| Err(ApexError::InvalidConfig(msg));

        if self.batch_size == 0 {
            return invalid("batch_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return invalid(format!(
                "discount_factor must be in [0, 1], got {}",
                self.discount_factor
            ));
        }
        if let Some(clip) = self.gradient_clip_norm {
            if !(clip.is_finite() && clip > 0.0) {
                return invalid(format!("gradient_clip_norm must be positive, got {}", clip));
            }
        }
        if !(self.lr.start.is_finite() && self.lr.end.is_finite())
            || self.lr.start < 0.0
            || self.lr.end < 0.0
        {
            return invalid(format!(
                "learning rates must be non-negative, got {} and {}",
                self.lr.start, self.lr.end
            ));
        }
        if self.target_refresh_interval == 0 {
            return invalid("target_refresh_interval must be positive".to_string());
        }
        Ok(())
    }

    /// Constructs [`LearnerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`LearnerConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
