use super::{Record, RecordStorage, RecordValue, Recorder};
use log::info;

/// Recorder writing records through the `log` facade.
///
/// Stored records are aggregated by [`RecordStorage`] and written on flush.
#[derive(Default)]
pub struct LogRecorder {
    storage: RecordStorage,
}

impl LogRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn format(record: &Record) -> String {
        let mut items = record
            .iter()
            .map(|(k, v)| match v {
                RecordValue::Scalar(v) => format!("{}={:.6}", k, v),
                RecordValue::Array1(v) => format!("{}={:?}", k, v),
                RecordValue::String(s) => format!("{}={}", k, s),
            })
            .collect::<Vec<_>>();
        items.sort();
        items.join(", ")
    }
}

impl Recorder for LogRecorder {
    fn write(&mut self, record: Record) {
        info!("{}", Self::format(&record));
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let record = self.storage.aggregate();
        if !record.is_empty() {
            info!("step={}, {}", step, Self::format(&record));
        }
    }
}
