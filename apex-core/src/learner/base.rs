use super::{LearnerConfig, LrScheduler};
use crate::{
    record::{Record, RecordValue::Scalar},
    take_state_action_value, ApexError, ExecContext, PrioritizedBatch, QModel, Role,
    SharedPriorityBuffer, SyncController, TargetComputer, TargetInput, TargetOutput,
    WeightedLoss,
};
use log::{debug, info};

/// Phase of an optimization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerState {
    /// Between steps.
    Idle,

    /// Drawing a prioritized batch.
    Sampling,

    /// Computing double-Q targets with the pre-update parameters.
    ComputingTarget,

    /// Taking a gradient step on the main parameters.
    ApplyingGradient,

    /// Writing TD-errors of the post-update parameters back to the buffer.
    UpdatingPriorities,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Single-threaded learner driving the sample/train/update protocol.
///
/// Each call of [`Learner::step`] runs one cycle of the following state machine:
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Idle
///     Idle --> Sampling
///     Sampling --> Idle: insufficient data
///     Sampling --> ComputingTarget
///     ComputingTarget --> ApplyingGradient
///     ApplyingGradient --> UpdatingPriorities
///     UpdatingPriorities --> Idle
/// ```
///
/// * `Sampling` draws `batch_size` transitions with importance weights.
///   An [`ApexError::InsufficientData`] makes the step a no-op.
/// * `ComputingTarget` evaluates `Q_main(s, a)`, `Q_main(s', .)` and
///   `Q_target(s', .)` and runs the [`TargetComputer`].
/// * `ApplyingGradient` takes one clipped gradient step on the main
///   parameters with the learning rate of the [`LrScheduler`].
/// * `UpdatingPriorities` recomputes TD-errors with the updated parameters
///   and writes them to the buffer. Stale entries are dropped.
///
/// Every `target_refresh_interval` optimization steps the target parameters
/// are refreshed from the main parameters.
pub struct Learner<M: QModel> {
    model: M,
    buffer: SharedPriorityBuffer,
    target_computer: TargetComputer,
    sync: SyncController,
    lr_scheduler: LrScheduler,
    ctx: ExecContext,
    batch_size: usize,
    target_refresh_interval: usize,
    n_opts: usize,
    n_frames: usize,
    state: LearnerState,
}

impl<M: QModel> Learner<M> {
    /// Builds a learner.
    pub fn build(
        config: &LearnerConfig,
        model: M,
        buffer: SharedPriorityBuffer,
        sync: SyncController,
    ) -> Result<Self, ApexError> {
        config.validate()?;
        Ok(Self {
            model,
            buffer,
            target_computer: TargetComputer::new(config.discount_factor, config.reward_clipping),
            sync,
            lr_scheduler: config.lr,
            ctx: ExecContext::training(config.lr.lr(0), config.gradient_clip_norm),
            batch_size: config.batch_size,
            target_refresh_interval: config.target_refresh_interval,
            n_opts: 0,
            n_frames: 0,
            state: LearnerState::Idle,
        })
    }

    /// Runs one optimization step.
    ///
    /// Returns `None` if the buffer does not hold `batch_size` transitions yet.
    /// Numeric instability is returned as an error and nothing is written
    /// back to the buffer.
    pub fn step(&mut self) -> Result<Option<Record>, ApexError> {
        let result = self.step_inner();
        self.state = LearnerState::Idle;
        result
    }

    fn step_inner(&mut self) -> Result<Option<Record>, ApexError> {
        self.state = LearnerState::Sampling;
        let batch = match self.sample(self.batch_size)? {
            Some(batch) => batch,
            None => return Ok(None),
        };

        self.state = LearnerState::ComputingTarget;
        let lr = self.lr_scheduler.lr(self.n_frames);
        self.ctx.learning_rate = lr;
        let out = self.evaluate(&batch)?;

        self.state = LearnerState::ApplyingGradient;
        let states = batch.states();
        let previous_actions = batch.previous_actions();
        let actions = batch.actions();
        let loss = WeightedLoss {
            states: &states,
            previous_actions: &previous_actions,
            actions: &actions,
            targets: &out.targets,
            weights: &batch.weights,
        };
        let loss = self.model.apply_gradient(&mut self.ctx, &loss)?;
        if !loss.is_finite() {
            return Err(ApexError::NumericInstability(format!(
                "loss {} at optimization step {}",
                loss, self.n_opts
            )));
        }

        self.state = LearnerState::UpdatingPriorities;
        let td_errors = self.evaluate(&batch)?.td_errors;
        let n_stale = self.buffer.update_batch(&batch.ids, &td_errors)?;
        if n_stale > 0 {
            debug!("Dropped {} stale priority updates", n_stale);
        }

        self.n_opts += 1;
        self.n_frames += batch.len();
        if self.n_opts % self.target_refresh_interval == 0 {
            self.sync.refresh_target(&mut self.model)?;
            info!("Refreshed target at {} optimization steps", self.n_opts);
        }

        let n = td_errors.len() as f32;
        let td_mean = td_errors.iter().sum::<f32>() / n;
        let td_max = td_errors.iter().copied().fold(0f32, f32::max);
        Ok(Some(Record::from_slice(&[
            ("loss", Scalar(loss)),
            ("td_error_mean", Scalar(td_mean)),
            ("td_error_max", Scalar(td_max)),
            ("learning_rate", Scalar(lr)),
            ("beta", Scalar(self.buffer.beta()?)),
            ("n_stale_updates", Scalar(n_stale as f32)),
            ("opt_steps", Scalar(self.n_opts as f32)),
        ])))
    }

    /// Recomputes priorities of a sampled batch with the current parameters
    /// without a gradient step.
    ///
    /// Returns the number of stale updates, or `None` if the buffer holds
    /// fewer than `batch_size` transitions.
    pub fn refresh_priorities(&mut self, batch_size: usize) -> Result<Option<usize>, ApexError> {
        let batch = match self.sample(batch_size)? {
            Some(batch) => batch,
            None => return Ok(None),
        };
        let td_errors = self.evaluate(&batch)?.td_errors;
        let n_stale = self.buffer.update_batch(&batch.ids, &td_errors)?;
        Ok(Some(n_stale))
    }

    /// Publishes the current parameters to the actors, tagged with the
    /// number of optimization steps.
    pub fn publish_global(&mut self) -> Result<(), ApexError> {
        self.sync.publish_global(&self.model, self.n_opts)
    }

    fn sample(&mut self, batch_size: usize) -> Result<Option<PrioritizedBatch>, ApexError> {
        match self.buffer.sample(batch_size) {
            Ok(batch) => Ok(Some(batch)),
            Err(ApexError::InsufficientData {
                requested,
                available,
            }) => {
                debug!(
                    "Skipped an iteration: {} transitions requested, {} available",
                    requested, available
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn evaluate(&mut self, batch: &PrioritizedBatch) -> Result<TargetOutput, ApexError> {
        let states = batch.states();
        let next_states = batch.next_states();
        let previous_actions = batch.previous_actions();
        let actions = batch.actions();

        let q = self
            .model
            .forward(&mut self.ctx, Role::Main, &states, &previous_actions)?;
        let state_action_values = take_state_action_value(q.view(), &actions)?;
        let (next_main_q, next_target_q) =
            self.model
                .forward_next(&mut self.ctx, &next_states, &actions)?;

        let rewards = batch.rewards();
        let dones = batch.dones();
        self.target_computer.compute(&TargetInput {
            rewards: &rewards,
            dones: &dones,
            next_main_q: next_main_q.view(),
            next_target_q: next_target_q.view(),
            state_action_values: &state_action_values,
            weights: &batch.weights,
        })
    }

    /// Current phase. [`LearnerState::Idle`] between calls of [`Learner::step`].
    pub fn state(&self) -> LearnerState {
        self.state
    }

    /// Number of optimization steps.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Number of transitions consumed by gradient steps.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Batch size of optimization steps.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Learning rate of the next optimization step.
    pub fn learning_rate(&self) -> f32 {
        self.lr_scheduler.lr(self.n_frames)
    }

    /// Execution context used for training.
    pub fn ctx(&self) -> &ExecContext {
        &self.ctx
    }

    /// Reference to the model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable reference to the model.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Consumes the learner and returns the model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// The replay buffer shared with the actors.
    pub fn buffer(&self) -> &SharedPriorityBuffer {
        &self.buffer
    }

    /// The synchronization controller.
    pub fn sync(&self) -> &SyncController {
        &self.sync
    }
}
