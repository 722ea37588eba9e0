use super::{Record, Recorder};

/// Recorder keeping every record in memory.
///
/// Stored records are kept apart from written ones until [`Recorder::flush`].
#[derive(Debug, Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    pending: Vec<Record>,
}

impl BufferedRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Number of written records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }

    fn store(&mut self, record: Record) {
        self.pending.push(record);
    }

    fn flush(&mut self, _step: i64) {
        self.buf.append(&mut self.pending);
    }
}
