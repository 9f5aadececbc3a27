use crate::config::ShipperConfig;
use crate::record::LogEntry;
use crate::self_log::{SelfLog, SelfLogLevel};
use crate::sink::LogSink;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Bounded retry with exponential backoff for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ShipperConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ShipperConfig::default())
    }
}

/// What happened to a batch handed to [`deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent { attempts: u32 },
    Discarded { attempts: u32 },
    /// Shutdown arrived during a backoff wait. Every issued attempt had
    /// failed; the batch was not delivered and no further attempt was made.
    Interrupted { attempts: u32 },
}

/// Send `batch` through `sink`, retrying failed attempts with backoff.
///
/// Every failed attempt is reported as an error to `self_log`. If no
/// attempt succeeds the batch is discarded and exactly one critical record
/// is written. Errors never leave this function.
///
/// `cancel` only cuts the backoff waits short: an attempt that has been
/// issued always runs to completion, so a batch the collector accepted is
/// never reported as undelivered.
pub async fn deliver(
    sink: &dyn LogSink,
    batch: &[LogEntry],
    policy: RetryPolicy,
    self_log: &dyn SelfLog,
    cancel: &CancellationToken,
) -> Delivery {
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempts = 0;

    while attempts < max_attempts {
        attempts += 1;
        match sink.send(batch).await {
            Ok(()) => return Delivery::Sent { attempts },
            Err(e) => {
                self_log.record(
                    SelfLogLevel::Error,
                    &format!("send failed: {}. Attempt {} of {}", e, attempts, max_attempts),
                );
                if !e.is_retryable() {
                    break;
                }
            }
        }

        if attempts < max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self_log.record(
                        SelfLogLevel::Warning,
                        &format!(
                            "retry of {} log entries interrupted by shutdown after {} attempt(s)",
                            batch.len(),
                            attempts
                        ),
                    );
                    return Delivery::Interrupted { attempts };
                }
                _ = sleep(backoff) => {}
            }
            backoff = backoff.saturating_mul(2);
        }
    }

    self_log.record(
        SelfLogLevel::Critical,
        &format!(
            "all retry attempts failed after {} attempt(s); {} log entries in this batch are lost",
            attempts,
            batch.len()
        ),
    );
    Delivery::Discarded { attempts }
}
