//! Records of training metrics.
//!
//! The [`Learner`](crate::Learner) returns a [`Record`] for every optimization
//! step, and trainers pass records to a [`Recorder`].
//!
//! ```rust
//! use apex_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.5);
//! record.insert("td_error_max", RecordValue::Scalar(2.0));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
//! ```
mod base;
mod buffered_recorder;
mod log_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use log_recorder::LogRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
