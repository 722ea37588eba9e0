//! Utility function.
use crate::{
    actor_stats_fmt, ActorManager, ActorManagerConfig, ActorStat, AsyncTrainer,
    AsyncTrainerConfig, AsyncTrainerError, AsyncTrainerStat,
};
use anyhow::Result;
use apex_core::{
    record::Recorder, Env, GlobalParameters, Learner, LearnerConfig, PriorityBufferConfig,
    QModel, SharedPriorityBuffer, SyncController,
};
use crossbeam_channel::bounded;
use log::{debug, info};
use std::sync::{atomic::AtomicBool, Arc};

/// Runs asynchronous training.
///
/// This function runs [`ActorManager`] and [`AsyncTrainer`] on threads.
/// These communicate using [`crossbeam_channel`] and a shared
/// [`GlobalParameters`] store.
///
/// * `model` - Model trained by the learner.
/// * `model_builder` - Builds the local model of actor `i`. It must have the
///   parameter shapes of `model`.
/// * `env_builder` - Builds the environment of actor `i`.
///
/// Returns the trained model and the stats of the trainer and the actors.
#[allow(clippy::too_many_arguments)]
pub fn train_async<M, E>(
    model: M,
    model_builder: impl Fn(usize) -> Result<M>,
    env_builder: impl Fn(usize) -> Result<E>,
    learner_config: &LearnerConfig,
    replay_buffer_config: &PriorityBufferConfig,
    actor_man_config: &ActorManagerConfig,
    async_trainer_config: &AsyncTrainerConfig,
    recorder: &mut impl Recorder,
) -> Result<(M, AsyncTrainerStat, Vec<ActorStat>), AsyncTrainerError>
where
    M: QModel + 'static,
    E: Env + Send + 'static,
{
    // Shared flag to stop actor threads
    let stop = Arc::new(AtomicBool::new(false));

    // Items pushed to replay buffer
    let (item_s, item_r) = bounded(actor_man_config.channel_capacity);

    let global = GlobalParameters::new();
    let buffer = SharedPriorityBuffer::build(replay_buffer_config)?;
    let mut learner = Learner::build(
        learner_config,
        model,
        buffer,
        SyncController::new(global.clone()),
    )?;
    learner.publish_global()?;

    // Actor manager and async trainer
    let mut actors = ActorManager::<M, E>::build(
        actor_man_config,
        learner_config,
        global,
        item_s,
        stop.clone(),
    )?;
    let mut trainer = AsyncTrainer::build(async_trainer_config, item_r, stop)?;

    // Starts sampling and training
    if let Err(e) = actors.run(model_builder, env_builder) {
        actors.stop();
        return Err(e);
    }
    let trainer_result = trainer.train(&mut learner, recorder);

    // Actors may be blocked on a full channel, so keep receiving until the
    // last sender is dropped.
    let drain = trainer.drain();
    let actor_result = actors.stop_and_join();
    let n_discarded = drain
        .join()
        .map_err(|_| AsyncTrainerError::ThreadPanicked("drain".to_string()))?;
    debug!("{} items arrived after the replay buffer thread stopped", n_discarded);

    let trainer_stats = trainer_result?;
    info!("Stats of async trainer");
    info!("{}", trainer_stats.fmt());

    let actor_stats = actor_result?;
    info!("Stats of generated samples in actors");
    info!("{}", actor_stats_fmt(&actor_stats));

    Ok((learner.into_model(), trainer_stats, actor_stats))
}
