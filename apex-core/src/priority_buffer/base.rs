//! Prioritized replay buffer backed by a sum tree.
use super::{
    sum_tree::SumTree, IwScheduler, PrioritizedBatch, PriorityBufferConfig, WeightNormalizer,
};
use crate::{ApexError, ExperienceBufferBase, PrioritizedTransition, Transition};
use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Address of an entry in a [`PriorityBuffer`].
///
/// `generation` counts insertions, so an id stops matching its slot as soon as
/// the slot is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId {
    /// Slot in the circular buffer.
    pub slot: usize,

    /// Insertion count at the time the entry was written.
    pub generation: u64,
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    transition: Arc<Transition>,
}

/// Fixed-capacity circular store of transitions sampled proportionally to priority.
///
/// `add`, `sample` and `update` run in `O(log capacity)` per item. The buffer
/// is not synchronized; share it between threads with
/// [`SharedPriorityBuffer`](super::SharedPriorityBuffer).
pub struct PriorityBuffer {
    /// Maximum number of transitions that can be stored.
    capacity: usize,

    /// Next slot to be written.
    cursor: usize,

    /// Current number of stored transitions.
    size: usize,

    /// Total number of insertions.
    n_added: u64,

    entries: Vec<Option<Entry>>,

    sum_tree: SumTree,

    iw_scheduler: IwScheduler,

    normalize: WeightNormalizer,

    /// Lower bound of stored priorities.
    eps: f64,

    rng: StdRng,
}

impl PriorityBuffer {
    /// Creates a buffer.
    ///
    /// Fails with [`ApexError::InvalidCapacity`] if the capacity is zero.
    pub fn build(config: &PriorityBufferConfig) -> Result<Self, ApexError> {
        config.validate()?;
        let capacity = config.capacity;
        let beta_0 = config.importance_sampling_beta;
        let iw_scheduler = match config.importance_sampling_beta_final {
            Some(beta_final) => IwScheduler::new(beta_0, beta_final, config.beta_anneal_steps),
            None => IwScheduler::constant(beta_0),
        };

        Ok(Self {
            capacity,
            cursor: 0,
            size: 0,
            n_added: 0,
            entries: (0..capacity).map(|_| None).collect(),
            sum_tree: SumTree::new(capacity),
            iw_scheduler,
            normalize: config.normalize,
            eps: config.priority_epsilon as f64,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    fn checked_priority(&self, priority: f32) -> Result<f64, ApexError> {
        if !priority.is_finite() || priority < 0.0 {
            return Err(ApexError::InvalidPriority(priority));
        }
        Ok((priority as f64).max(self.eps))
    }

    fn insert(&mut self, p: f64, transition: Transition) -> EntryId {
        let id = EntryId {
            slot: self.cursor,
            generation: self.n_added,
        };
        self.entries[id.slot] = Some(Entry {
            generation: id.generation,
            transition: Arc::new(transition),
        });
        self.sum_tree.set(id.slot, p);

        self.n_added += 1;
        self.cursor = (self.cursor + 1) % self.capacity;
        if self.size < self.capacity {
            self.size += 1;
        }
        id
    }

    /// Inserts a transition at the cursor, evicting the oldest entry once full.
    ///
    /// Priorities below the configured epsilon are raised to it.
    pub fn add(&mut self, priority: f32, transition: Transition) -> Result<EntryId, ApexError> {
        let p = self.checked_priority(priority)?;
        Ok(self.insert(p, transition))
    }

    /// Inserts a transition with the largest live priority, or `1.0` if the
    /// buffer is empty.
    pub fn add_with_max_priority(&mut self, transition: Transition) -> EntryId {
        let p = if self.size == 0 {
            1.0
        } else {
            self.sum_tree.max().max(self.eps)
        };
        self.insert(p, transition)
    }

    /// Samples `batch_size` entries with stratified proportional sampling.
    ///
    /// The total mass is split into `batch_size` segments `[k w, (k+1) w)` and
    /// one value is drawn uniformly from each. Weights are
    /// `(size * P(i))^(-beta)` divided by the normalizer.
    pub fn sample(&mut self, batch_size: usize) -> Result<PrioritizedBatch, ApexError> {
        if batch_size == 0 || batch_size > self.size {
            return Err(ApexError::InsufficientData {
                requested: batch_size,
                available: self.size,
            });
        }

        let total = self.sum_tree.total();
        let width = total / batch_size as f64;
        let beta = self.iw_scheduler.beta() as f64;
        let n = self.size as f64;

        let mut transitions = Vec::with_capacity(batch_size);
        let mut ids = Vec::with_capacity(batch_size);
        let mut probabilities = Vec::with_capacity(batch_size);
        let mut ws = Vec::with_capacity(batch_size);

        for k in 0..batch_size {
            let s = width * (k as f64 + self.rng.gen::<f64>());
            let slot = self.sum_tree.find(s);
            let entry = self.entries[slot].as_ref().ok_or_else(|| {
                ApexError::NumericInstability(format!(
                    "sum tree returned empty slot {} for mass {} of {}",
                    slot, s, total
                ))
            })?;
            let prob = self.sum_tree.priority(slot) / total;

            transitions.push(entry.transition.clone());
            ids.push(EntryId {
                slot,
                generation: entry.generation,
            });
            probabilities.push(prob as f32);
            ws.push((n * prob).powf(-beta));
        }

        let w_max = match self.normalize {
            WeightNormalizer::Batch => ws.iter().cloned().fold(f64::MIN_POSITIVE, f64::max),
            WeightNormalizer::All => (n * self.sum_tree.min() / total).powf(-beta),
        };
        let weights = ws.iter().map(|w| (w / w_max) as f32).collect();

        trace!("Sampled slots {:?} with beta {}", ids, beta);

        Ok(PrioritizedBatch {
            transitions,
            ids,
            weights,
            probabilities,
        })
    }

    /// Replaces the priority of a live entry.
    ///
    /// Fails with [`ApexError::StaleIndex`] if the slot has been overwritten
    /// since `id` was issued, leaving the new occupant untouched.
    pub fn update(&mut self, id: EntryId, priority: f32) -> Result<(), ApexError> {
        let p = self.checked_priority(priority)?;
        let live = self
            .entries
            .get(id.slot)
            .and_then(|e| e.as_ref())
            .map_or(false, |e| e.generation == id.generation);
        if !live {
            return Err(ApexError::StaleIndex {
                slot: id.slot,
                generation: id.generation,
            });
        }
        self.sum_tree.set(id.slot, p);
        Ok(())
    }

    /// Updates the priorities of a sampled batch and advances the $\beta$ schedule.
    ///
    /// All priorities are checked before any is written. Stale ids are skipped;
    /// the number of skipped updates is returned.
    pub fn update_batch(&mut self, ids: &[EntryId], priorities: &[f32]) -> Result<usize, ApexError> {
        debug_assert_eq!(ids.len(), priorities.len());
        if let Some(&p) = priorities.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(ApexError::InvalidPriority(p));
        }

        let mut n_stale = 0;
        for (&id, &p) in ids.iter().zip(priorities.iter()) {
            match self.update(id, p) {
                Ok(()) => {}
                Err(ApexError::StaleIndex { .. }) => n_stale += 1,
                Err(e) => return Err(e),
            }
        }
        self.iw_scheduler.add_n_opts();
        Ok(n_stale)
    }

    /// Returns the transition of a live entry.
    pub fn get(&self, id: EntryId) -> Option<Arc<Transition>> {
        self.entries
            .get(id.slot)
            .and_then(|e| e.as_ref())
            .filter(|e| e.generation == id.generation)
            .map(|e| e.transition.clone())
    }

    /// Returns the priority stored at a slot, if the slot is in use.
    pub fn priority(&self, slot: usize) -> Option<f32> {
        if slot < self.size {
            Some(self.sum_tree.priority(slot) as f32)
        } else {
            None
        }
    }

    /// Current number of stored transitions.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if nothing has been added yet.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Maximum number of stored transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of insertions since construction.
    pub fn n_added(&self) -> u64 {
        self.n_added
    }

    /// Sum of the priorities of all live entries.
    pub fn total_priority(&self) -> f64 {
        self.sum_tree.total()
    }

    /// Largest live priority, `None` if empty.
    pub fn max_priority(&self) -> Option<f32> {
        (self.size > 0).then(|| self.sum_tree.max() as f32)
    }

    /// Smallest live priority, `None` if empty.
    pub fn min_priority(&self) -> Option<f32> {
        (self.size > 0).then(|| self.sum_tree.min() as f32)
    }

    /// Current exponent of importance weights.
    pub fn beta(&self) -> f32 {
        self.iw_scheduler.beta()
    }
}

impl ExperienceBufferBase for PriorityBuffer {
    type Item = PrioritizedTransition;

    fn push(&mut self, tr: Self::Item) -> anyhow::Result<()> {
        self.add(tr.priority, tr.transition)?;
        Ok(())
    }
}
