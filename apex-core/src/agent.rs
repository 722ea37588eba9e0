//! Actor-side agent: epsilon-greedy action selection and prioritized experience.
use crate::{
    argmax, take_state_action_value, ApexError, ExecContext, ExperienceBufferBase,
    PrioritizedTransition, QModel, Role, SyncController, TargetComputer, TargetInput, Transition,
};
use log::trace;
use ndarray::{ArrayViewD, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Result of [`ActorAgent::select_action`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSelection {
    /// Selected action.
    pub action: usize,

    /// Q-values of every action.
    pub q_values: Vec<f32>,

    /// Q-value of the selected action.
    pub value: f32,

    /// `false` if the action was drawn at random.
    pub greedy: bool,
}

/// Local copy of the model used by an actor.
///
/// The agent selects actions with the main parameters, computes initial
/// priorities of new transitions without any gradient, and mirrors the
/// global parameters published by the learner.
pub struct ActorAgent<M: QModel> {
    model: M,
    sync: SyncController,
    target_computer: TargetComputer,
    ctx: ExecContext,
    rng: StdRng,
    synced_version: Option<usize>,
}

impl<M: QModel> ActorAgent<M> {
    /// Creates an agent. `seed` drives exploration.
    pub fn new(model: M, sync: SyncController, target_computer: TargetComputer, seed: u64) -> Self {
        Self {
            model,
            sync,
            target_computer,
            ctx: ExecContext::inference(),
            rng: StdRng::seed_from_u64(seed),
            synced_version: None,
        }
    }

    /// Epsilon-greedy action selection.
    ///
    /// With probability `1 - epsilon` returns the action of the largest
    /// Q-value for `(state, previous_action)`, otherwise an action drawn
    /// uniformly.
    pub fn select_action(
        &mut self,
        state: ArrayViewD<f32>,
        previous_action: usize,
        epsilon: f32,
    ) -> Result<ActionSelection, ApexError> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(ApexError::InvalidConfig(format!(
                "epsilon must be in [0, 1], got {}",
                epsilon
            )));
        }
        let q = self
            .model
            .forward(&mut self.ctx, Role::Main, &[state], &[previous_action])?;
        let q = q.index_axis(Axis(0), 0);

        let (action, greedy) = if self.rng.gen::<f32>() < epsilon {
            (self.rng.gen_range(0..self.model.num_actions()), false)
        } else {
            (argmax(q), true)
        };

        Ok(ActionSelection {
            action,
            q_values: q.to_vec(),
            value: q[action],
            greedy,
        })
    }

    /// Absolute TD-error of a single transition under the local parameters.
    pub fn td_error(&mut self, transition: &Transition) -> Result<f32, ApexError> {
        let actions = [transition.action];
        let q = self.model.forward(
            &mut self.ctx,
            Role::Main,
            &[transition.state.view()],
            &[transition.previous_action],
        )?;
        let state_action_values = take_state_action_value(q.view(), &actions)?;
        let (next_main_q, next_target_q) =
            self.model
                .forward_next(&mut self.ctx, &[transition.next_state.view()], &actions)?;

        let out = self.target_computer.compute(&TargetInput {
            rewards: &[transition.reward],
            dones: &[transition.done],
            next_main_q: next_main_q.view(),
            next_target_q: next_target_q.view(),
            state_action_values: &state_action_values,
            weights: &[1.0],
        })?;
        Ok(out.td_errors[0])
    }

    /// Pairs a transition with its TD-error as initial priority.
    pub fn prioritize(&mut self, transition: Transition) -> Result<PrioritizedTransition, ApexError> {
        transition.validate(self.model.num_actions())?;
        let priority = self.td_error(&transition)?;
        Ok(PrioritizedTransition {
            priority,
            transition,
        })
    }

    /// Computes the initial priority of a transition and pushes it.
    ///
    /// Returns the priority. The buffer raises it to its epsilon floor, so
    /// new experience is always sampleable.
    pub fn record_experience<B>(
        &mut self,
        buffer: &mut B,
        transition: Transition,
    ) -> Result<f32, ApexError>
    where
        B: ExperienceBufferBase<Item = PrioritizedTransition>,
    {
        let item = self.prioritize(transition)?;
        let priority = item.priority;
        buffer.push(item)?;
        trace!("Recorded a transition with priority {}", priority);
        Ok(priority)
    }

    /// Loads the published global parameters if they are newer than the
    /// local ones. Returns `true` if the parameters changed.
    pub fn pull_global(&mut self) -> Result<bool, ApexError> {
        let version = self.sync.pull_global(&mut self.model, self.synced_version)?;
        let changed = version != self.synced_version;
        self.synced_version = version;
        Ok(changed)
    }

    /// Version of the global parameters held by the agent.
    pub fn synced_version(&self) -> Option<usize> {
        self.synced_version
    }

    /// Number of actions.
    pub fn num_actions(&self) -> usize {
        self.model.num_actions()
    }

    /// Reference to the local model.
    pub fn model(&self) -> &M {
        &self.model
    }
}
