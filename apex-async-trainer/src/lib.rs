//! Asynchronous APE-X training on a single machine.
//!
//! Actors run on their own threads, select actions with an
//! [`ActorAgent`](apex_core::ActorAgent) and push prioritized transitions to
//! the replay buffer through a [`ReplayBufferProxy`]. The [`AsyncTrainer`]
//! inserts them into a [`SharedPriorityBuffer`](apex_core::SharedPriorityBuffer)
//! and runs the [`Learner`](apex_core::Learner), which publishes parameters
//! that the actors pull on their own schedule.
//!
//! # Messages
//! * From actors to the trainer: [`PushedItemMessage`] over a bounded channel.
//! * From the learner to actors: snapshots in [`GlobalParameters`](apex_core::GlobalParameters).
mod actor;
mod actor_manager;
mod async_trainer;
mod error;
mod messages;
mod replay_buffer_proxy;
mod util;
pub use actor::{actor_stats_fmt, Actor, ActorStat};
pub use actor_manager::{ActorManager, ActorManagerConfig};
pub use async_trainer::{AsyncTrainer, AsyncTrainerConfig, AsyncTrainerStat};
pub use error::AsyncTrainerError;
pub use messages::PushedItemMessage;
pub use replay_buffer_proxy::{ReplayBufferProxy, ReplayBufferProxyConfig};
pub use util::train_async;
