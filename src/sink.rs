use crate::record::LogEntry;
use async_trait::async_trait;
use std::error::Error;

/// Failure of a single delivery attempt.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// The batch could not be encoded. Retrying cannot help.
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("collector returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl SinkError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SinkError::Serialize(_))
    }
}

/// Asynchronous destination for batches of [`LogEntry`]s.
///
/// Implementations perform exactly one delivery attempt per call; the
/// dispatcher owns retries and backoff (see [`crate::retry::deliver`]).
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send one batch to the backend.
    ///
    /// **Parameters**
    /// - `batch`: entries already stamped with the static process fields,
    ///   in queue order.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the batch.
    /// - `Err(..)` on network failure, a non-success status, or an
    ///   encoding error.
    async fn send(&self, batch: &[LogEntry]) -> Result<(), SinkError>;
}
