use std::time::Duration;

/// Stats of [`AsyncTrainer`](crate::AsyncTrainer)`::train()`.
#[derive(Clone, Debug, Default)]
pub struct AsyncTrainerStat {
    /// The number of optimization steps.
    pub opt_steps: usize,

    /// The number of transitions inserted into the replay buffer.
    pub n_samples: usize,

    /// The number of transitions rejected by the replay buffer.
    pub n_rejected: usize,

    /// The number of samples pushed to the replay buffer per second.
    pub samples_per_sec: f32,

    /// Duration of training.
    pub duration: Duration,

    /// The number of optimization steps per second.
    pub opt_per_sec: f32,
}

impl AsyncTrainerStat {
    /// Returns a formatted string.
    pub fn fmt(&self) -> String {
        let mut s = "opt_steps, samples, samples/sec, opt_steps/sec, duration\n".to_string();
        s += format!(
            "{}, {}, {}, {}, {}\n",
            self.opt_steps,
            self.n_samples,
            self.samples_per_sec,
            self.opt_per_sec,
            self.duration.as_secs_f32()
        )
        .as_str();
        s
    }
}
