use crate::{
    Actor, ActorManagerConfig, ActorStat, AsyncTrainerError, PushedItemMessage,
    ReplayBufferProxyConfig,
};
use anyhow::Result;
use apex_core::{
    ActorAgent, Env, GlobalParameters, LearnerConfig, PrioritizedTransition, QModel,
    SyncController, TargetComputer,
};
use crossbeam_channel::Sender;
use log::{error, info};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

type ActorHandle = JoinHandle<Result<ActorStat, AsyncTrainerError>>;

/// Manages [`Actor`]s.
///
/// Each actor runs on its own thread with its own model and environment,
/// pulls global parameters from a shared [`GlobalParameters`] store and sends
/// prioritized transitions to the [`AsyncTrainer`](crate::AsyncTrainer)
/// through a bounded channel.
pub struct ActorManager<M, E>
where
    M: QModel + 'static,
    E: Env + Send + 'static,
{
    config: ActorManagerConfig,

    /// Target computation used for initial priorities.
    target_computer: TargetComputer,

    /// Parameters published by the learner.
    global: GlobalParameters,

    /// Sender of [`PushedItemMessage`]s, moved to the actors by [`ActorManager::run`].
    sender: Option<Sender<PushedItemMessage<PrioritizedTransition>>>,

    /// Flag to stop actors, shared with the trainer.
    stop: Arc<AtomicBool>,

    /// Thread handles.
    threads: Vec<ActorHandle>,

    phantom: std::marker::PhantomData<(M, E)>,
}

impl<M, E> ActorManager<M, E>
where
    M: QModel + 'static,
    E: Env + Send + 'static,
{
    /// Builds a [`ActorManager`].
    ///
    /// Initial priorities are computed with the discount factor and the
    /// reward clipping of `learner_config`.
    pub fn build(
        config: &ActorManagerConfig,
        learner_config: &LearnerConfig,
        global: GlobalParameters,
        sender: Sender<PushedItemMessage<PrioritizedTransition>>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, AsyncTrainerError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            target_computer: TargetComputer::new(
                learner_config.discount_factor,
                learner_config.reward_clipping,
            ),
            global,
            sender: Some(sender),
            stop,
            threads: vec![],
            phantom: std::marker::PhantomData,
        })
    }

    /// Spawns the actor threads.
    ///
    /// `model_builder(i)` and `env_builder(i)` create the model and the
    /// environment of actor `i`. The sender is handed over to the actors, so
    /// the channel disconnects once every actor has stopped.
    pub fn run(
        &mut self,
        model_builder: impl Fn(usize) -> Result<M>,
        env_builder: impl Fn(usize) -> Result<E>,
    ) -> Result<(), AsyncTrainerError> {
        let sender = self.sender.take().ok_or(AsyncTrainerError::AlreadyRunning)?;

        for id in 0..self.config.n_actors {
            let model = model_builder(id)?;
            let env = env_builder(id)?;
            let agent = ActorAgent::new(
                model,
                SyncController::new(self.global.clone()),
                self.target_computer,
                id as u64,
            );
            let actor = Actor::build(
                id,
                agent,
                env,
                self.config.epsilon(id),
                self.config.global_sync_interval,
                ReplayBufferProxyConfig {
                    n_buffer: self.config.samples_per_push,
                },
                self.stop.clone(),
            );
            let sender = sender.clone();

            let handle = std::thread::spawn(move || {
                let result = actor.run(sender);
                if let Err(e) = &result {
                    error!("Actor {} failed: {}", id, e);
                }
                result
            });
            self.threads.push(handle);
        }
        info!("Started {} actors", self.config.n_actors);
        Ok(())
    }

    /// Waits until all actors finish.
    ///
    /// Returns the first error of an actor, if any.
    pub fn join(self) -> Result<Vec<ActorStat>, AsyncTrainerError> {
        let mut stats = vec![];
        let mut first_err = None;
        for (id, h) in self.threads.into_iter().enumerate() {
            match h.join() {
                Ok(Ok(stat)) => stats.push(stat),
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(_) => {
                    first_err.get_or_insert(AsyncTrainerError::ThreadPanicked(format!("actor {}", id)));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    /// Stops actor threads.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stops and joins actors.
    pub fn stop_and_join(self) -> Result<Vec<ActorStat>, AsyncTrainerError> {
        self.stop();
        self.join()
    }
}
