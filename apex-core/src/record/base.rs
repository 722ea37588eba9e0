use crate::ApexError;
use std::collections::{
    hash_map::{IntoIter, Iter, Keys},
    HashMap,
};

/// Value stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value such as a loss.
    Scalar(f32),

    /// A 1-dimensional array.
    Array1(Vec<f32>),

    /// A text value.
    String(String),
}

/// Key-value container of metrics.
#[derive(Debug, Clone, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns an iterator that consumes the record.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Gets the value of a key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records. Values of `record` win on duplicated keys.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges another record into this one in place.
    pub fn merge_inplace(&mut self, record: Record) {
        for (k, v) in record.into_iter_in_record() {
            self.0.insert(k, v);
        }
    }

    /// Gets a scalar value.
    pub fn get_scalar(&self, k: &str) -> Result<f32, ApexError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(ApexError::RecordValueTypeError("Scalar".to_string())),
            None => Err(ApexError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a 1-dimensional array.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, ApexError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(ApexError::RecordValueTypeError("Array1".to_string())),
            None => Err(ApexError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a string value.
    pub fn get_string(&self, k: &str) -> Result<String, ApexError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(ApexError::RecordValueTypeError("String".to_string())),
            None => Err(ApexError::RecordKeyError(k.to_string())),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the record has no entry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_values() {
        let record = Record::from_slice(&[
            ("loss", RecordValue::Scalar(0.25)),
            ("name", RecordValue::String("learner".to_string())),
        ]);
        assert_eq!(record.get_scalar("loss").unwrap(), 0.25);
        assert_eq!(record.get_string("name").unwrap(), "learner");
        assert!(matches!(
            record.get_scalar("name"),
            Err(ApexError::RecordValueTypeError(_))
        ));
        assert!(matches!(
            record.get_array1("missing"),
            Err(ApexError::RecordKeyError(_))
        ));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = Record::from_scalar("loss", 1.0);
        a.merge_inplace(Record::from_scalar("loss", 2.0));
        assert_eq!(a.get_scalar("loss").unwrap(), 2.0);

        let b = a.merge(Record::from_scalar("beta", 0.4));
        assert_eq!(b.len(), 2);
    }
}
