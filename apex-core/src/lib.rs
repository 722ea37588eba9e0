#![warn(missing_docs)]
//! Prioritized experience replay and the learner/actor protocol of APE-X.
//!
//! * [`PriorityBuffer`] stores transitions in a circular buffer and samples
//!   them in proportion to their priority with importance-sampling weights.
//! * [`TargetComputer`] turns model outputs into double-Q targets and
//!   TD-errors.
//! * [`SyncController`] refreshes target parameters and exchanges global
//!   parameters between the learner and the actors.
//! * [`Learner`] runs the sample/train/update loop.
//! * [`ActorAgent`] selects actions and records experience with initial
//!   priorities.
//!
//! The value-estimation network is a collaborator implementing [`QModel`].
pub mod error;
pub mod model;
pub mod record;

mod agent;
mod base;
mod learner;
mod priority_buffer;
mod sync;
mod target;
mod transition;

pub use agent::{ActionSelection, ActorAgent};
pub use base::{Env, ExecContext, ExperienceBufferBase, ParameterSet, QModel, Role, Step, WeightedLoss};
pub use error::ApexError;
pub use learner::{Learner, LearnerConfig, LearnerState, LrScheduler};
pub use priority_buffer::{
    EntryId, IwScheduler, PrioritizedBatch, PriorityBuffer, PriorityBufferConfig,
    SharedPriorityBuffer, WeightNormalizer,
};
pub use sync::{GlobalParameters, GlobalSnapshot, SyncController};
pub use target::{
    argmax, take_state_action_value, RewardClipping, TargetComputer, TargetInput, TargetOutput,
};
pub use transition::{PrioritizedTransition, Transition};
