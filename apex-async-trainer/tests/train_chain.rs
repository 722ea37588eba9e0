use anyhow::{bail, Result};
use apex_async_trainer::{train_async, ActorManagerConfig, AsyncTrainerConfig};
use apex_core::{
    model::LinearQModel,
    record::{BufferedRecorder, RecordValue},
    Env, LearnerConfig, LrScheduler, PriorityBufferConfig, QModel, Role, Step,
};
use ndarray::ArrayD;
use std::{sync::mpsc, thread, time::Duration};
use test_log::test;

const N_POSITIONS: usize = 5;
const MAX_EPISODE_STEPS: usize = 50;

/// Walk on a chain. Action 1 moves right, action 0 moves left. Reaching the
/// right end gives reward 1 and ends the episode.
struct ChainEnv {
    position: usize,
    steps: usize,
}

impl ChainEnv {
    fn new() -> Self {
        Self {
            position: 0,
            steps: 0,
        }
    }

    fn obs(&self) -> ArrayD<f32> {
        let mut obs = ArrayD::zeros(vec![N_POSITIONS]);
        obs[[self.position]] = 1.0;
        obs
    }
}

impl Env for ChainEnv {
    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<ArrayD<f32>> {
        self.position = 0;
        self.steps = 0;
        Ok(self.obs())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        match action {
            0 => self.position = self.position.saturating_sub(1),
            1 => self.position += 1,
            _ => bail!("invalid action {}", action),
        }
        self.steps += 1;
        let goal = self.position == N_POSITIONS - 1;
        Ok(Step {
            next_state: self.obs(),
            reward: if goal { 1.0 } else { 0.0 },
            done: goal || self.steps >= MAX_EPISODE_STEPS,
        })
    }
}

/// [`ChainEnv`] taking a while per step, so actors are often mid-step when
/// training stops.
struct SlowChainEnv(ChainEnv);

impl Env for SlowChainEnv {
    fn num_actions(&self) -> usize {
        self.0.num_actions()
    }

    fn reset(&mut self) -> Result<ArrayD<f32>> {
        self.0.reset()
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        thread::sleep(Duration::from_millis(20));
        self.0.step(action)
    }
}

fn configs() -> (
    LearnerConfig,
    PriorityBufferConfig,
    ActorManagerConfig,
    AsyncTrainerConfig,
) {
    let learner = LearnerConfig::default()
        .batch_size(16)
        .discount_factor(0.9)
        .lr(LrScheduler::constant(0.05))
        .target_refresh_interval(50);
    let buffer = PriorityBufferConfig::default().capacity(2000);
    let actors = ActorManagerConfig::new(2)
        .samples_per_push(16)
        .base_epsilon(0.5)
        .epsilon_alpha(1.0)
        .global_sync_interval(20)
        .channel_capacity(64);
    let trainer = AsyncTrainerConfig::default()
        .max_opts(300)
        .warmup_period(100)
        .global_sync_interval(25)
        .record_interval(50)
        .idle_sleep_ms(1);
    (learner, buffer, actors, trainer)
}

#[test]
fn test_train_chain() -> Result<()> {
    let (learner_config, buffer_config, actor_config, trainer_config) = configs();
    let mut recorder = BufferedRecorder::new();

    let (model, trainer_stat, actor_stats) = train_async(
        LinearQModel::new(N_POSITIONS, 2, 0),
        |i| Ok(LinearQModel::new(N_POSITIONS, 2, 100 + i as u64)),
        |_| Ok(ChainEnv::new()),
        &learner_config,
        &buffer_config,
        &actor_config,
        &trainer_config,
        &mut recorder,
    )?;

    assert_eq!(trainer_stat.opt_steps, 300);
    assert!(trainer_stat.n_samples >= 100);
    assert_eq!(trainer_stat.n_rejected, 0);

    assert_eq!(actor_stats.len(), 2);
    assert!((actor_stats[0].epsilon - 0.5).abs() < 1e-6);
    assert!((actor_stats[1].epsilon - 0.25).abs() < 1e-6);
    for stat in actor_stats.iter() {
        assert!(stat.env_steps > 0);
        assert!(stat.n_syncs >= 1);
        assert!(stat.pushed_samples <= stat.env_steps);
    }
    let pushed = actor_stats.iter().map(|s| s.pushed_samples).sum::<usize>();
    assert!(trainer_stat.n_samples <= pushed);

    let losses = recorder
        .iter()
        .filter_map(|r| match r.get("loss") {
            Some(RecordValue::Scalar(v)) => Some(*v),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(losses.len(), 300);
    assert!(losses.iter().all(|v| v.is_finite()));

    let params = model.parameters(Role::Main)?;
    assert!(params.iter().all(|(_, t)| t.iter().all(|v| v.is_finite())));
    Ok(())
}

#[test]
fn test_env_builder_failure() {
    let (learner_config, buffer_config, actor_config, trainer_config) = configs();
    let result = train_async(
        LinearQModel::new(N_POSITIONS, 2, 0),
        |i| Ok(LinearQModel::new(N_POSITIONS, 2, i as u64)),
        |i| {
            if i == 1 {
                bail!("no simulator for actor {}", i)
            }
            Ok(ChainEnv::new())
        },
        &learner_config,
        &buffer_config,
        &actor_config,
        &trainer_config,
        &mut BufferedRecorder::new(),
    );
    assert!(result.is_err());
}

#[test]
fn test_shutdown_with_full_channel() -> Result<()> {
    let learner_config = LearnerConfig::default()
        .batch_size(4)
        .lr(LrScheduler::constant(0.01));
    let buffer_config = PriorityBufferConfig::default().capacity(100);
    let actor_config = ActorManagerConfig::new(3)
        .samples_per_push(1)
        .channel_capacity(1);
    let trainer_config = AsyncTrainerConfig::default()
        .max_opts(3)
        .warmup_period(4)
        .idle_sleep_ms(1);

    let (done_s, done_r) = mpsc::channel();
    thread::spawn(move || {
        let result = train_async(
            LinearQModel::new(N_POSITIONS, 2, 0),
            |i| Ok(LinearQModel::new(N_POSITIONS, 2, i as u64)),
            |_| Ok(SlowChainEnv(ChainEnv::new())),
            &learner_config,
            &buffer_config,
            &actor_config,
            &trainer_config,
            &mut BufferedRecorder::new(),
        )
        .map(|(_, trainer_stat, actor_stats)| (trainer_stat.opt_steps, actor_stats.len()));
        let _ = done_s.send(result.map_err(|e| e.to_string()));
    });

    let (opt_steps, n_actors) = match done_r.recv_timeout(Duration::from_secs(15)) {
        Ok(result) => result.map_err(anyhow::Error::msg)?,
        Err(_) => bail!("training did not shut down"),
    };
    assert_eq!(opt_steps, 3);
    assert_eq!(n_actors, 3);
    Ok(())
}
