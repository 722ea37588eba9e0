use super::{Record, RecordValue};
use std::collections::BTreeSet;

/// Storage of records with aggregation of scalar values.
///
/// A scalar key `k` is aggregated into `k_mean`, `k_min` and `k_max` when it
/// appears in more than one record. Other values keep the latest occurrence.
#[derive(Debug, Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let keys = self
            .data
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>();
        let mut out = Record::empty();

        for key in keys {
            let scalars = self
                .data
                .iter()
                .filter_map(|r| match r.get(&key) {
                    Some(RecordValue::Scalar(v)) => Some(*v),
                    _ => None,
                })
                .collect::<Vec<_>>();

            if scalars.len() > 1 {
                let mean = scalars.iter().sum::<f32>() / scalars.len() as f32;
                let min = scalars.iter().copied().fold(f32::INFINITY, f32::min);
                let max = scalars.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                out.insert(format!("{}_mean", key), RecordValue::Scalar(mean));
                out.insert(format!("{}_min", key), RecordValue::Scalar(min));
                out.insert(format!("{}_max", key), RecordValue::Scalar(max));
            } else if let Some(v) = self.data.iter().rev().find_map(|r| r.get(&key)) {
                out.insert(key, v.clone());
            }
        }

        self.data.clear();
        out
    }
}
