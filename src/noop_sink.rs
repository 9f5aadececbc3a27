use crate::record::LogEntry;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;

/// A sink that simply drops all batches.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// network I/O; the load demos use it to time the producer path alone.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _batch: &[LogEntry]) -> Result<(), SinkError> {
        Ok(())
    }
}
