//! Learner loop fed by actors running on other threads.
mod base;
mod config;
mod stat;
pub use base::AsyncTrainer;
pub use config::AsyncTrainerConfig;
pub use stat::AsyncTrainerStat;
