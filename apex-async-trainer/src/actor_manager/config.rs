use crate::AsyncTrainerError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ActorManager`](super::ActorManager).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActorManagerConfig {
    /// Number of actor threads.
    pub n_actors: usize,

    /// Number of samples to be buffered in each actor until being pushed to the replay buffer.
    ///
    /// The default value is 100.
    pub samples_per_push: usize,

    /// Exploration rate of actor 0.
    pub base_epsilon: f32,

    /// Exponent spreading exploration rates over actors.
    pub epsilon_alpha: f32,

    /// Interval of pulling global parameters in environment steps.
    pub global_sync_interval: usize,

    /// Capacity of the channel of pushed items, in messages.
    pub channel_capacity: usize,
}

impl Default for ActorManagerConfig {
    fn default() -> Self {
        Self {
            n_actors: 1,
            samples_per_push: 100,
            base_epsilon: 0.4,
            epsilon_alpha: 7.0,
            global_sync_interval: 400,
            channel_capacity: 1000,
        }
    }
}

impl ActorManagerConfig {
    /// Creates a configuration with `n_actors` actors.
    pub fn new(n_actors: usize) -> Self {
        Self {
            n_actors,
            ..Self::default()
        }
    }

    /// Sets the number of samples buffered before being pushed.
    pub fn samples_per_push(mut self, v: usize) -> Self {
        self.samples_per_push = v;
        self
    }

    /// Sets the exploration rate of actor 0.
    pub fn base_epsilon(mut self, v: f32) -> Self {
        self.base_epsilon = v;
        self
    }

    /// Sets the exponent spreading exploration rates.
    pub fn epsilon_alpha(mut self, v: f32) -> Self {
        self.epsilon_alpha = v;
        self
    }

    /// Sets the interval of pulling global parameters.
    pub fn global_sync_interval(mut self, v: usize) -> Self {
        self.global_sync_interval = v;
        self
    }

    /// Sets the capacity of the channel of pushed items.
    pub fn channel_capacity(mut self, v: usize) -> Self {
        self.channel_capacity = v;
        self
    }

    /// Exploration rate of actor `i`:
    /// `base_epsilon^(1 + epsilon_alpha * i / (n_actors - 1))`.
    pub fn epsilon(&self, i: usize) -> f32 {
        if self.n_actors <= 1 {
            return self.base_epsilon;
        }
        let e = 1.0 + self.epsilon_alpha * i as f32 / (self.n_actors - 1) as f32;
        self.base_epsilon.powf(e)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), AsyncTrainerError> {
        let invalid = |msg: &str| Err(AsyncTrainerError::InvalidConfig(msg.to_string()));
        if self.n_actors == 0 {
            return invalid("n_actors must be positive");
        }
        if self.samples_per_push == 0 {
            return invalid("samples_per_push must be positive");
        }
        if !(0.0..=1.0).contains(&self.base_epsilon) {
            return invalid("base_epsilon must be in [0, 1]");
        }
        if !(self.epsilon_alpha.is_finite() && self.epsilon_alpha >= 0.0) {
            return invalid("epsilon_alpha must be non-negative");
        }
        if self.global_sync_interval == 0 {
            return invalid("global_sync_interval must be positive");
        }
        if self.channel_capacity == 0 {
            return invalid("channel_capacity must be positive");
        }
        Ok(())
    }

    /// Constructs [`ActorManagerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ActorManagerConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_epsilon() {
        let config = ActorManagerConfig::new(3).base_epsilon(0.4).epsilon_alpha(7.0);
        assert!((config.epsilon(0) - 0.4).abs() < 1e-6);
        assert!((config.epsilon(1) - 0.4f32.powf(4.5)).abs() < 1e-6);
        assert!((config.epsilon(2) - 0.4f32.powf(8.0)).abs() < 1e-6);
        assert!(config.epsilon(0) > config.epsilon(1));

        let single = ActorManagerConfig::new(1).base_epsilon(0.3);
        assert_eq!(single.epsilon(0), 0.3);
    }

    #[test]
    fn test_validate() {
        assert!(ActorManagerConfig::default().validate().is_ok());
        assert!(ActorManagerConfig::new(0).validate().is_err());
        assert!(ActorManagerConfig::default()
            .base_epsilon(1.5)
            .validate()
            .is_err());
        assert!(ActorManagerConfig::default()
            .samples_per_push(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_serde_actor_manager_config() -> Result<()> {
        let config = ActorManagerConfig::new(4)
            .samples_per_push(50)
            .global_sync_interval(100);
        let dir = TempDir::new("actor_manager_config")?;
        let path = dir.path().join("actor_manager_config.yaml");
        config.save(&path)?;
        assert_eq!(config, ActorManagerConfig::load(&path)?);
        Ok(())
    }
}
