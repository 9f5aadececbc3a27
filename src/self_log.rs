use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfLogLevel {
    Warning,
    Error,
    Critical,
}

impl fmt::Display for SelfLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelfLogLevel::Warning => "WARN",
            SelfLogLevel::Error => "ERROR",
            SelfLogLevel::Critical => "CRITICAL",
        })
    }
}

/// Out-of-band sink for failures of the pipeline itself.
///
/// Implementations must not route records back through `tracing` or the
/// shipping queue.
pub trait SelfLog: Send + Sync {
    fn record(&self, level: SelfLogLevel, message: &str);
}

/// Writes diagnostics to the process' stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrSelfLog;

impl SelfLog for StderrSelfLog {
    fn record(&self, level: SelfLogLevel, message: &str) {
        eprintln!("[log-shipper internal] {}: {}", level, message);
    }
}

/// Keeps every record in memory. Useful in tests and for hosts that want
/// to surface shipper health themselves.
#[derive(Default)]
pub struct RecordingSelfLog {
    records: Mutex<Vec<(SelfLogLevel, String)>>,
}

impl RecordingSelfLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(SelfLogLevel, String)> {
        self.records.lock().clone()
    }

    pub fn count(&self, level: SelfLogLevel) -> usize {
        self.records.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

impl SelfLog for RecordingSelfLog {
    fn record(&self, level: SelfLogLevel, message: &str) {
        self.records.lock().push((level, message.to_string()));
    }
}
