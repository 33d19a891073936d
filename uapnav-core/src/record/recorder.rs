use super::{Record, RecordValue};
use anyhow::Result;
use std::path::Path;

/// Stores records produced during training or evaluation.
pub trait Recorder {
    /// Stores a record.
    fn store(&mut self, record: Record);

    /// Flushes stored records, tagged with the given step.
    fn flush(&mut self, step: i64);
}

/// Keeps records in memory.
///
/// Mainly useful in tests and short experiments where the caller inspects
/// the records directly.
#[derive(Default)]
pub struct BufferedRecorder(Vec<Record>);

impl BufferedRecorder {
    /// Creates an empty buffered recorder.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the stored records.
    pub fn records(&self) -> &[Record] {
        &self.0
    }
}

impl Recorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.0.push(record);
    }

    fn flush(&mut self, _step: i64) {}
}

/// Appends scalar record entries to a CSV file.
///
/// Rows are `(step, key, value)`. Non-scalar values are skipped.
pub struct CsvRecorder {
    wtr: csv::Writer<std::fs::File>,
    pending: Vec<Record>,
}

impl CsvRecorder {
    /// Creates a recorder writing to the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut wtr = csv::Writer::from_path(path.as_ref())?;
        wtr.write_record(["step", "key", "value"])?;
        Ok(Self {
            wtr,
            pending: Vec::new(),
        })
    }
}

impl Recorder for CsvRecorder {
    fn store(&mut self, record: Record) {
        self.pending.push(record);
    }

    fn flush(&mut self, step: i64) {
        for record in self.pending.drain(..) {
            for (k, v) in record.iter() {
                if let RecordValue::Scalar(v) = v {
                    // A failed write is logged, not fatal to the run.
                    if let Err(e) =
                        self.wtr
                            .write_record([step.to_string(), k.clone(), v.to_string()])
                    {
                        log::warn!("Failed to write record {}: {}", k, e);
                    }
                }
            }
        }
        if let Err(e) = self.wtr.flush() {
            log::warn!("Failed to flush records: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn csv_recorder_writes_scalars() -> Result<()> {
        let dir = TempDir::new("csv_recorder")?;
        let path = dir.path().join("records.csv");
        let mut recorder = CsvRecorder::new(&path)?;
        recorder.store(Record::from_scalar("loss", 0.25));
        recorder.flush(10);
        drop(recorder);

        let body = std::fs::read_to_string(&path)?;
        assert!(body.contains("step,key,value"));
        assert!(body.contains("10,loss,0.25"));
        Ok(())
    }
}
