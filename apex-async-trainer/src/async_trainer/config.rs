use crate::AsyncTrainerError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`AsyncTrainer`](crate::AsyncTrainer).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AsyncTrainerConfig {
    /// The maximum number of optimization steps.
    pub max_opts: usize,

    /// Number of transitions in the replay buffer before training starts.
    pub warmup_period: usize,

    /// Interval of publishing global parameters in optimization steps.
    pub global_sync_interval: usize,

    /// Interval of flushing records in optimization steps.
    pub record_interval: usize,

    /// Sleep while waiting for data, in milliseconds.
    pub idle_sleep_ms: u64,
}

impl Default for AsyncTrainerConfig {
    fn default() -> Self {
        Self {
            max_opts: 10_000,
            warmup_period: 50_000,
            global_sync_interval: 100,
            record_interval: 1000,
            idle_sleep_ms: 10,
        }
    }
}

impl AsyncTrainerConfig {
    /// Sets the number of optimization steps.
    pub fn max_opts(mut self, v: usize) -> Self {
        self.max_opts = v;
        self
    }

    /// Sets the warmup period in transitions.
    pub fn warmup_period(mut self, v: usize) -> Self {
        self.warmup_period = v;
        self
    }

    /// Sets the interval of publishing global parameters.
    pub fn global_sync_interval(mut self, v: usize) -> Self {
        self.global_sync_interval = v;
        self
    }

    /// Sets the interval of flushing records.
    pub fn record_interval(mut self, v: usize) -> Self {
        self.record_interval = v;
        self
    }

    /// Sets the sleep while waiting for data.
    pub fn idle_sleep_ms(mut self, v: u64) -> Self {
        self.idle_sleep_ms = v;
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), AsyncTrainerError> {
        if self.global_sync_interval == 0 || self.record_interval == 0 {
            return Err(AsyncTrainerError::InvalidConfig(
                "intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Constructs [`AsyncTrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`AsyncTrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
