//! Core interfaces shared by the learner, the actors and their collaborators.
mod env;
mod model;
mod replay_buffer;
pub use env::{Env, Step};
pub use model::{ExecContext, ParameterSet, QModel, Role, WeightedLoss};
pub use replay_buffer::ExperienceBufferBase;
