use serde::{Deserialize, Serialize};

/// Linear learning-rate schedule over training frames.
///
/// `lr(frames) = start + (end - start) * min(frames / anneal_frame_count, 1)`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub struct LrScheduler {
    /// Learning rate at frame 0.
    pub start: f32,

    /// Learning rate after annealing.
    pub end: f32,

    /// Number of frames over which the learning rate is annealed.
    pub anneal_frame_count: usize,
}

impl Default for LrScheduler {
    fn default() -> Self {
        Self {
            start: 1e-4,
            end: 1e-4,
            anneal_frame_count: 0,
        }
    }
}

impl LrScheduler {
    /// Constant learning rate.
    pub fn constant(lr: f32) -> Self {
        Self {
            start: lr,
            end: lr,
            anneal_frame_count: 0,
        }
    }

    /// Learning rate after `frames` training frames.
    pub fn lr(&self, frames: usize) -> f32 {
        if self.anneal_frame_count == 0 {
            return self.end;
        }
        let ratio = (frames as f32 / self.anneal_frame_count as f32).min(1.0);
        self.start + (self.end - self.start) * ratio
    }
}
