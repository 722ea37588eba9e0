//! Learner loop: sample, compute targets, apply a gradient, write back priorities.
mod base;
mod config;
mod lr_scheduler;
pub use base::{Learner, LearnerState};
pub use config::LearnerConfig;
pub use lr_scheduler::LrScheduler;
