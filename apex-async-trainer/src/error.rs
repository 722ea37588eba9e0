//! Errors of the asynchronous trainer.
use apex_core::ApexError;
use thiserror::Error;

/// Errors of the asynchronous trainer.
#[derive(Error, Debug)]
pub enum AsyncTrainerError {
    /// The channel of pushed items was disconnected.
    #[error("Failed to send pushed items to the replay buffer thread")]
    SendMsgForPush,

    /// A worker thread panicked.
    #[error("Thread {0} panicked")]
    ThreadPanicked(String),

    /// Actors were started twice.
    #[error("Actors have already been started")]
    AlreadyRunning,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error of the learner, the buffer or the parameter store.
    #[error(transparent)]
    Apex(#[from] ApexError),

    /// Error of an environment or a model builder.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
