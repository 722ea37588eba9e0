//! Prioritized replay buffer.
//!
//! Transitions are stored in a fixed-capacity circular buffer and sampled in
//! proportion to their priority using a sum tree. Each sample carries an
//! importance-sampling weight correcting for the non-uniform draw.
//!
//! # Examples
//!
//! ```rust
//! use apex_core::{PriorityBuffer, PriorityBufferConfig, Transition};
//! use ndarray::ArrayD;
//!
//! let config = PriorityBufferConfig::default().capacity(8);
//! let mut buffer = PriorityBuffer::build(&config).unwrap();
//! let obs = ArrayD::<f32>::zeros(vec![4]);
//! let tr = Transition::new(obs.clone(), obs, 0, 1, 1.0, false);
//! buffer.add(0.5, tr.clone()).unwrap();
//! buffer.add(2.0, tr).unwrap();
//!
//! let batch = buffer.sample(2).unwrap();
//! buffer.update_batch(&batch.ids, &[1.0, 1.0]).unwrap();
//! ```
mod base;
mod batch;
mod config;
mod iw_scheduler;
mod shared;
mod sum_tree;
pub use base::{EntryId, PriorityBuffer};
pub use batch::PrioritizedBatch;
pub use config::PriorityBufferConfig;
pub use iw_scheduler::IwScheduler;
pub use shared::SharedPriorityBuffer;

use serde::{Deserialize, Serialize};

/// Normalizer of importance weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightNormalizer {
    /// Divide by the largest weight attainable over the whole buffer.
    All,

    /// Divide by the largest weight in the sampled batch.
    #[default]
    Batch,
}
