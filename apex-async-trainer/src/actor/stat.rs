use std::time::Duration;

/// Stats of sampling process in each [`Actor`](crate::Actor).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActorStat {
    /// The number of steps for interaction between agent and env.
    pub env_steps: usize,

    /// The number of finished episodes.
    pub episodes: usize,

    /// The number of transitions sent to the replay buffer.
    pub pushed_samples: usize,

    /// The number of times newer global parameters were loaded.
    pub n_syncs: usize,

    /// Exploration rate of the actor.
    pub epsilon: f32,

    /// Duration of sampling loop.
    pub duration: Duration,
}

impl ActorStat {
    /// Environment steps per second.
    pub fn samples_per_sec(&self) -> f32 {
        let d = self.duration.as_secs_f32();
        if d > 0.0 {
            self.env_steps as f32 / d
        } else {
            0.0
        }
    }
}

/// Returns a formatted string of the set of [`ActorStat`] for reporting.
pub fn actor_stats_fmt(stats: &[ActorStat]) -> String {
    let mut s =
        "actor id, epsilon, samples, episodes, syncs, duration [sec], samples per sec\n".to_string();
    for (i, stat) in stats.iter().enumerate() {
        s += format!(
            "{}, {:.4}, {}, {}, {}, {:.2}, {:.1}\n",
            i,
            stat.epsilon,
            stat.env_steps,
            stat.episodes,
            stat.n_syncs,
            stat.duration.as_secs_f32(),
            stat.samples_per_sec()
        )
        .as_str();
    }
    s
}
