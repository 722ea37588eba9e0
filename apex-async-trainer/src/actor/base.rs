use crate::{ActorStat, AsyncTrainerError, PushedItemMessage, ReplayBufferProxy, ReplayBufferProxyConfig};
use apex_core::{ActorAgent, Env, PrioritizedTransition, QModel, Transition};
use crossbeam_channel::Sender;
use log::{debug, info};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::SystemTime,
};

/// Runs interaction between an [`ActorAgent`] and an [`Env`], taking samples.
///
/// Each transition gets its TD-error under the local parameters as initial
/// priority and is pushed to the replay buffer through a [`ReplayBufferProxy`].
/// The first action of an episode is preceded by action 0.
pub struct Actor<M, E>
where
    M: QModel,
    E: Env,
{
    id: usize,
    agent: ActorAgent<M>,
    env: E,
    epsilon: f32,
    global_sync_interval: usize,
    replay_buffer_config: ReplayBufferProxyConfig,

    /// Stops sampling process if this field is set to `true`.
    stop: Arc<AtomicBool>,
}

impl<M, E> Actor<M, E>
where
    M: QModel,
    E: Env,
{
    /// Creates an actor.
    ///
    /// `global_sync_interval` is the number of environment steps between
    /// pulls of the global parameters.
    pub fn build(
        id: usize,
        agent: ActorAgent<M>,
        env: E,
        epsilon: f32,
        global_sync_interval: usize,
        replay_buffer_config: ReplayBufferProxyConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            agent,
            env,
            epsilon,
            global_sync_interval: global_sync_interval.max(1),
            replay_buffer_config,
            stop,
        }
    }

    /// Runs sampling loop until the stop flag becomes `true`.
    ///
    /// Items buffered in the proxy are sent before returning.
    pub fn run(
        mut self,
        sender: Sender<PushedItemMessage<PrioritizedTransition>>,
    ) -> Result<ActorStat, AsyncTrainerError> {
        let mut buffer =
            ReplayBufferProxy::build_with_sender(self.id, &self.replay_buffer_config, sender);
        let mut stat = ActorStat {
            epsilon: self.epsilon,
            ..ActorStat::default()
        };
        let time = SystemTime::now();

        if self.agent.pull_global()? {
            stat.n_syncs += 1;
        }
        let mut state = self.env.reset()?;
        let mut previous_action = 0;
        info!("Actor {} started with epsilon {}", self.id, self.epsilon);

        while !self.stop.load(Ordering::Acquire) {
            let selection = self
                .agent
                .select_action(state.view(), previous_action, self.epsilon)?;
            let step = self.env.step(selection.action)?;
            let transition = Transition::new(
                state,
                step.next_state.clone(),
                previous_action,
                selection.action,
                step.reward,
                step.done,
            );
            self.agent.record_experience(&mut buffer, transition)?;
            stat.env_steps += 1;

            if step.done {
                stat.episodes += 1;
                state = self.env.reset()?;
                previous_action = 0;
            } else {
                state = step.next_state;
                previous_action = selection.action;
            }

            if stat.env_steps % self.global_sync_interval == 0 && self.agent.pull_global()? {
                stat.n_syncs += 1;
                debug!(
                    "Actor {} synced to version {:?}",
                    self.id,
                    self.agent.synced_version()
                );
            }
        }

        buffer.flush()?;
        stat.pushed_samples = buffer.n_sent();
        stat.duration = time.elapsed().unwrap_or_default();
        info!("Actor {} stopped after {} steps", self.id, stat.env_steps);
        Ok(stat)
    }
}
