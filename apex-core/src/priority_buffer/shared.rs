use super::{EntryId, PrioritizedBatch, PriorityBuffer, PriorityBufferConfig};
use crate::{ApexError, ExperienceBufferBase, PrioritizedTransition, Transition};
use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe handle of a [`PriorityBuffer`].
///
/// Every call runs inside one critical section covering the sum tree and the
/// cursor, so actors and the learner always observe a tree whose root equals
/// the sum of its live leaves. Clones share the same buffer.
#[derive(Clone)]
pub struct SharedPriorityBuffer {
    inner: Arc<Mutex<PriorityBuffer>>,
}

impl SharedPriorityBuffer {
    /// Creates a buffer and wraps it.
    pub fn build(config: &PriorityBufferConfig) -> Result<Self, ApexError> {
        Ok(Self::new(PriorityBuffer::build(config)?))
    }

    /// Wraps an existing buffer.
    pub fn new(buffer: PriorityBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PriorityBuffer>, ApexError> {
        self.inner
            .lock()
            .map_err(|_| ApexError::LockPoisoned("priority buffer"))
    }

    /// See [`PriorityBuffer::add`].
    pub fn add(&self, priority: f32, transition: Transition) -> Result<EntryId, ApexError> {
        self.lock()?.add(priority, transition)
    }

    /// See [`PriorityBuffer::add_with_max_priority`].
    pub fn add_with_max_priority(&self, transition: Transition) -> Result<EntryId, ApexError> {
        Ok(self.lock()?.add_with_max_priority(transition))
    }

    /// See [`PriorityBuffer::sample`].
    pub fn sample(&self, batch_size: usize) -> Result<PrioritizedBatch, ApexError> {
        self.lock()?.sample(batch_size)
    }

    /// See [`PriorityBuffer::update`].
    pub fn update(&self, id: EntryId, priority: f32) -> Result<(), ApexError> {
        self.lock()?.update(id, priority)
    }

    /// See [`PriorityBuffer::update_batch`].
    pub fn update_batch(&self, ids: &[EntryId], priorities: &[f32]) -> Result<usize, ApexError> {
        self.lock()?.update_batch(ids, priorities)
    }

    /// Current number of stored transitions.
    pub fn len(&self) -> Result<usize, ApexError> {
        Ok(self.lock()?.len())
    }

    /// Returns `true` if nothing has been added yet.
    pub fn is_empty(&self) -> Result<bool, ApexError> {
        Ok(self.lock()?.is_empty())
    }

    /// Sum of live priorities.
    pub fn total_priority(&self) -> Result<f64, ApexError> {
        Ok(self.lock()?.total_priority())
    }

    /// Current exponent of importance weights.
    pub fn beta(&self) -> Result<f32, ApexError> {
        Ok(self.lock()?.beta())
    }

    /// Runs `f` with exclusive access to the buffer.
    pub fn with<T>(&self, f: impl FnOnce(&mut PriorityBuffer) -> T) -> Result<T, ApexError> {
        let mut buffer = self.lock()?;
        Ok(f(&mut buffer))
    }
}

impl ExperienceBufferBase for SharedPriorityBuffer {
    type Item = PrioritizedTransition;

    fn push(&mut self, tr: Self::Item) -> anyhow::Result<()> {
        self.add(tr.priority, tr.transition)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::ArrayD;
    use std::thread;

    fn transition(v: f32) -> Transition {
        let obs = ArrayD::from_elem(vec![2], v);
        Transition::new(obs.clone(), obs, 0, 1, v, false)
    }

    #[test]
    fn test_concurrent_add_sample_update() {
        let config = PriorityBufferConfig::default().capacity(64);
        let buffer = SharedPriorityBuffer::build(&config).unwrap();

        let actors = (0..4)
            .map(|a| {
                let mut buffer = buffer.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let p = ((a * 500 + i) % 7) as f32 + 0.5;
                        buffer
                            .push(PrioritizedTransition {
                                priority: p,
                                transition: transition(i as f32),
                            })
                            .unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        let learner = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut n_updates = 0;
                while n_updates < 200 {
                    match buffer.sample(8) {
                        Ok(batch) => {
                            let ps = vec![2.0; batch.len()];
                            buffer.update_batch(&batch.ids, &ps).unwrap();
                            n_updates += 1;
                        }
                        Err(e) => assert!(e.is_recoverable()),
                    }
                }
            })
        };

        for h in actors {
            h.join().unwrap();
        }
        learner.join().unwrap();

        assert_eq!(buffer.len().unwrap(), 64);
        let sum = buffer
            .with(|b| {
                (0..b.len())
                    .map(|slot| b.priority(slot).unwrap() as f64)
                    .sum::<f64>()
            })
            .unwrap();
        assert!((buffer.total_priority().unwrap() - sum).abs() < 1e-6);
        assert_eq!(buffer.with(|b| b.n_added()).unwrap(), 2000);
    }
}
