//! Metric records and recorders.
//!
//! [`Record`] is a key-value container carrying scalar metrics (and the
//! occasional array) out of training and evaluation loops. [`Recorder`] is
//! the sink side: the trainer stores a record per update and flushes
//! periodically. [`CsvRecorder`] persists scalars to disk and
//! [`BufferedRecorder`] keeps them in memory for inspection in tests.
mod base;
mod recorder;

pub use base::{Record, RecordValue};
pub use recorder::{BufferedRecorder, CsvRecorder, Recorder};
