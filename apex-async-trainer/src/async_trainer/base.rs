use crate::{AsyncTrainerConfig, AsyncTrainerError, AsyncTrainerStat, PushedItemMessage};
use apex_core::{
    record::{Record, RecordValue::Scalar, Recorder},
    ApexError, Learner, PrioritizedTransition, QModel, SharedPriorityBuffer,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, SystemTime},
};

/// Counts of items handled by the replay buffer thread.
#[derive(Debug, Default)]
struct PushCounts {
    inserted: usize,
    rejected: usize,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages asynchronous training loop in a single machine.
///
/// It is used with [`ActorManager`](crate::ActorManager):
///
/// ```mermaid
/// flowchart LR
///     A[Actors] -->|PushedItemMessage| B[Replay buffer thread]
///     B -->|add| C[SharedPriorityBuffer]
///     C -->|sample / update_batch| D[Learner]
///     D -->|publish_global| E[GlobalParameters]
///     E -->|pull_global| A
/// ```
///
/// [`AsyncTrainer::train`] runs as follows:
///
/// 1. Spawns a thread inserting every received transition into the replay
///    buffer exactly once.
/// 2. Publishes the initial parameters.
/// 3. Waits until the buffer holds `warmup_period` transitions and at least
///    one batch.
/// 4. Runs [`Learner::step`] until `max_opts` optimization steps. Global
///    parameters are published every `global_sync_interval` steps and
///    records are flushed every `record_interval` steps.
/// 5. Sets the stop flag and joins the replay buffer thread.
///
/// Setting the stop flag from outside ends the loop early. Errors of the
/// learner stop training and are returned.
pub struct AsyncTrainer {
    config: AsyncTrainerConfig,

    /// Receiver of pushed items.
    receiver: Receiver<PushedItemMessage<PrioritizedTransition>>,

    /// Stops actors and the replay buffer thread if set to `true`.
    stop: Arc<AtomicBool>,
}

impl AsyncTrainer {
    /// Creates [`AsyncTrainer`].
    pub fn build(
        config: &AsyncTrainerConfig,
        receiver: Receiver<PushedItemMessage<PrioritizedTransition>>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, AsyncTrainerError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            receiver,
            stop,
        })
    }

    fn idle(&self) {
        std::thread::sleep(Duration::from_millis(self.config.idle_sleep_ms));
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Runs a thread for replay buffer.
    ///
    /// The thread ends when every sender is dropped, or when the stop flag
    /// is set and no message arrives for the idle period.
    fn run_replay_buffer_thread(
        &self,
        buffer: SharedPriorityBuffer,
    ) -> JoinHandle<Result<PushCounts, AsyncTrainerError>> {
        let r = self.receiver.clone();
        let stop = self.stop.clone();
        let timeout = Duration::from_millis(self.config.idle_sleep_ms.max(1));

        std::thread::spawn(move || {
            let mut counts = PushCounts::default();
            loop {
                match r.recv_timeout(timeout) {
                    Ok(msg) => {
                        for item in msg.pushed_items {
                            match buffer.add(item.priority, item.transition) {
                                Ok(_) => counts.inserted += 1,
                                Err(e @ ApexError::InvalidPriority(_)) => {
                                    warn!("Rejected a transition of actor {}: {}", msg.id, e);
                                    counts.rejected += 1;
                                }
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if stop.load(Ordering::Acquire) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("Stopped replay buffer thread");
            Ok(counts)
        })
    }

    /// Receives and discards pushed items on a thread until every sender is
    /// dropped. Returns the number of discarded items.
    ///
    /// Run this after [`AsyncTrainer::train`] while joining the actors, so an
    /// actor blocked on a full channel can finish its last send.
    pub fn drain(&self) -> JoinHandle<usize> {
        let r = self.receiver.clone();
        std::thread::spawn(move || {
            let n = r.iter().map(|msg| msg.pushed_items.len()).sum::<usize>();
            if n > 0 {
                info!("Discarded {} items pushed after training", n);
            }
            n
        })
    }

    /// Waits until the buffer holds enough transitions. Returns `false` if
    /// stopped while waiting.
    fn warmup(
        &self,
        buffer: &SharedPriorityBuffer,
        batch_size: usize,
    ) -> Result<bool, AsyncTrainerError> {
        let n = self.config.warmup_period.max(batch_size);
        loop {
            if self.stopped() {
                return Ok(false);
            }
            if buffer.len()? >= n {
                info!("Warmup finished with {} transitions", n);
                return Ok(true);
            }
            self.idle();
        }
    }

    fn train_loop<M: QModel>(
        &self,
        learner: &mut Learner<M>,
        recorder: &mut impl Recorder,
    ) -> Result<(), AsyncTrainerError> {
        learner.publish_global()?;
        if !self.warmup(learner.buffer(), learner.batch_size())? {
            info!("Stopped during warmup");
            return Ok(());
        }

        let mut opt_steps_ = 0;
        let mut time = SystemTime::now();

        while learner.n_opts() < self.config.max_opts {
            if self.stopped() {
                info!("Stop requested at {} optimization steps", learner.n_opts());
                break;
            }
            let record = match learner.step()? {
                Some(record) => record,
                None => {
                    debug!("Not enough data for a batch");
                    self.idle();
                    continue;
                }
            };
            let opt_steps = learner.n_opts();
            opt_steps_ += 1;
            recorder.store(record);

            if opt_steps % self.config.global_sync_interval == 0 {
                learner.publish_global()?;
            }
            if opt_steps % self.config.record_interval == 0 {
                let duration = time.elapsed().unwrap_or_default().as_secs_f32();
                let ops = if duration > 0.0 {
                    opt_steps_ as f32 / duration
                } else {
                    0.0
                };
                recorder.write(Record::from_slice(&[
                    ("opt_steps", Scalar(opt_steps as f32)),
                    ("opt_steps_per_sec", Scalar(ops)),
                    ("replay_buffer_len", Scalar(learner.buffer().len()? as f32)),
                ]));
                recorder.flush(opt_steps as i64);
                opt_steps_ = 0;
                time = SystemTime::now();
            }
        }
        Ok(())
    }

    /// Runs training loop.
    ///
    /// The stop flag is set when this method returns, which also stops the
    /// actors sharing it.
    pub fn train<M: QModel>(
        &mut self,
        learner: &mut Learner<M>,
        recorder: &mut impl Recorder,
    ) -> Result<AsyncTrainerStat, AsyncTrainerError> {
        let handle = self.run_replay_buffer_thread(learner.buffer().clone());
        let time = SystemTime::now();
        let n_opts_start = learner.n_opts();

        let result = self.train_loop(learner, recorder);
        self.stop.store(true, Ordering::Release);
        let counts = handle
            .join()
            .map_err(|_| AsyncTrainerError::ThreadPanicked("replay buffer".to_string()))?;
        result?;
        let counts = counts?;

        let duration = time.elapsed().unwrap_or_default();
        let secs = duration.as_secs_f32().max(f32::EPSILON);
        let opt_steps = learner.n_opts() - n_opts_start;
        info!("Finished training at {} optimization steps", learner.n_opts());
        Ok(AsyncTrainerStat {
            opt_steps,
            n_samples: counts.inserted,
            n_rejected: counts.rejected,
            samples_per_sec: counts.inserted as f32 / secs,
            duration,
            opt_per_sec: opt_steps as f32 / secs,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use apex_core::{
        model::LinearQModel, record::BufferedRecorder, GlobalParameters, LearnerConfig,
        LrScheduler, PriorityBufferConfig, SyncController, Transition,
    };
    use crossbeam_channel::bounded;
    use ndarray::ArrayD;
    use test_log::test;

    fn item(i: usize, priority: f32) -> PrioritizedTransition {
        let s = ArrayD::from_elem(vec![2], i as f32 * 0.01);
        PrioritizedTransition {
            priority,
            transition: Transition::new(s.clone(), s, 0, i % 2, 0.5, i % 10 == 9),
        }
    }

    #[test]
    fn test_train_from_channel() -> anyhow::Result<()> {
        let buffer = SharedPriorityBuffer::build(&PriorityBufferConfig::default().capacity(256))?;
        let global = GlobalParameters::new();
        let learner_config = LearnerConfig::default()
            .batch_size(8)
            .lr(LrScheduler::constant(0.01))
            .target_refresh_interval(10);
        let mut learner = Learner::build(
            &learner_config,
            LinearQModel::new(2, 2, 0),
            buffer.clone(),
            SyncController::new(global.clone()),
        )?;

        let (s, r) = bounded(16);
        let stop = Arc::new(AtomicBool::new(false));
        let config = AsyncTrainerConfig::default()
            .max_opts(30)
            .warmup_period(32)
            .global_sync_interval(10)
            .record_interval(10)
            .idle_sleep_ms(1);
        let mut trainer = AsyncTrainer::build(&config, r, stop.clone())?;

        // One valid message and one rejected item, then the sender is dropped.
        let mut items = (0..40).map(|i| item(i, 1.0)).collect::<Vec<_>>();
        items.push(item(40, f32::NAN));
        s.send(PushedItemMessage {
            id: 0,
            pushed_items: items,
        })?;
        drop(s);

        let mut recorder = BufferedRecorder::new();
        let stat = trainer.train(&mut learner, &mut recorder)?;

        assert_eq!(stat.opt_steps, 30);
        assert_eq!(stat.n_samples, 40);
        assert_eq!(stat.n_rejected, 1);
        assert_eq!(buffer.len()?, 40);
        assert!(stop.load(Ordering::Acquire));
        assert_eq!(global.version()?, Some(30));
        // 3 flushes, each with 10 stored learner records and 1 written record.
        assert_eq!(recorder.len(), 33);
        Ok(())
    }

    #[test]
    fn test_drain_unblocks_full_channel() -> anyhow::Result<()> {
        let (s, r) = bounded(1);
        let stop = Arc::new(AtomicBool::new(true));
        let trainer = AsyncTrainer::build(&AsyncTrainerConfig::default(), r, stop)?;

        // The second send blocks until the drain thread receives.
        let sender = std::thread::spawn(move || {
            for i in 0..3 {
                s.send(PushedItemMessage {
                    id: 0,
                    pushed_items: vec![item(i, 1.0), item(i + 1, 1.0)],
                })?;
            }
            anyhow::Ok(())
        });
        let drain = trainer.drain();
        sender.join().expect("sender thread panicked")?;
        assert_eq!(drain.join().expect("drain thread panicked"), 6);
        Ok(())
    }

    #[test]
    fn test_stop_during_warmup() -> anyhow::Result<()> {
        let buffer = SharedPriorityBuffer::build(&PriorityBufferConfig::default().capacity(16))?;
        let mut learner = Learner::build(
            &LearnerConfig::default().batch_size(4),
            LinearQModel::new(2, 2, 0),
            buffer,
            SyncController::new(GlobalParameters::new()),
        )?;
        let (_s, r) = bounded(1);
        let stop = Arc::new(AtomicBool::new(true));
        let config = AsyncTrainerConfig::default().idle_sleep_ms(1);
        let mut trainer = AsyncTrainer::build(&config, r, stop)?;

        let stat = trainer.train(&mut learner, &mut BufferedRecorder::new())?;
        assert_eq!(stat.opt_steps, 0);
        Ok(())
    }
}
