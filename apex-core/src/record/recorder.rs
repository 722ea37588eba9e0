use super::Record;

/// Writes records to an output destination.
pub trait Recorder: Send {
    /// Writes a record immediately.
    fn write(&mut self, record: Record);

    /// Stores a record for later aggregation.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records.
    fn flush(&mut self, step: i64);
}
