use crate::enrich::StaticFields;
use crate::queue::BoundedQueue;
use crate::record::LogEntry;
use crate::retry::{deliver, Delivery, RetryPolicy};
use crate::self_log::{SelfLog, SelfLogLevel};
use crate::sink::LogSink;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// States of the background dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Waiting for data or cancellation.
    Idle,
    /// Draining up to `batch_size` entries from the queue.
    Batching,
    /// Handing the current batch to the sink.
    Sending,
    /// Waiting `flush_interval` before the next cycle.
    Sleeping,
    /// Shutdown requested: flush what remains, then stop.
    Draining,
    Stopped,
}

/// Settings the dispatcher needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub retry: RetryPolicy,
}

/// Background loop that moves entries from the [`BoundedQueue`] to a
/// [`LogSink`] in batches.
///
/// The dispatcher is the only component that suspends: while waiting for
/// data, while sleeping between cycles and while a batch is in flight.
/// Waiting and sleeping end early on cancellation; a batch in flight
/// finishes its current attempt and skips any remaining backoff.
pub struct Dispatcher {
    queue: Arc<BoundedQueue>,
    sink: Arc<dyn LogSink>,
    self_log: Arc<dyn SelfLog>,
    fields: StaticFields,
    config: DispatcherConfig,
    cancel: CancellationToken,
    state: DispatcherState,
    batch: Vec<LogEntry>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<BoundedQueue>,
        sink: Arc<dyn LogSink>,
        self_log: Arc<dyn SelfLog>,
        fields: StaticFields,
        config: DispatcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        let config = DispatcherConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            queue,
            sink,
            self_log,
            fields,
            batch: Vec::with_capacity(config.batch_size),
            config,
            cancel,
            state: DispatcherState::Idle,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Spawn the loop on the current Tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        while self.state != DispatcherState::Stopped {
            let next = self.step().await;
            trace!(from = ?self.state, to = ?next, "dispatcher transition");
            self.state = next;
        }
        debug!("log dispatcher stopped");
    }

    /// Run the current state to completion and return the next one.
    async fn step(&mut self) -> DispatcherState {
        match self.state {
            DispatcherState::Idle => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => DispatcherState::Draining,
                    _ = self.queue.wait_for_data() => {
                        if self.queue.is_empty() {
                            // Closed with nothing left: nothing will ever arrive.
                            DispatcherState::Draining
                        } else {
                            DispatcherState::Batching
                        }
                    }
                }
            }
            DispatcherState::Batching => {
                if self.cancel.is_cancelled() {
                    return DispatcherState::Draining;
                }
                self.fill_batch();
                if self.batch.is_empty() {
                    DispatcherState::Sleeping
                } else {
                    DispatcherState::Sending
                }
            }
            DispatcherState::Sending => {
                // Not raced against the token: an issued attempt always
                // completes. Cancellation only shortens the backoff waits.
                if self.send_current(self.config.retry).await {
                    self.batch.clear();
                }
                if self.cancel.is_cancelled() {
                    DispatcherState::Draining
                } else {
                    DispatcherState::Sleeping
                }
            }
            DispatcherState::Sleeping => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => DispatcherState::Draining,
                    _ = sleep(self.config.flush_interval) => DispatcherState::Idle,
                }
            }
            DispatcherState::Draining => {
                self.flush_remaining().await;
                DispatcherState::Stopped
            }
            DispatcherState::Stopped => DispatcherState::Stopped,
        }
    }

    fn fill_batch(&mut self) {
        let room = self.config.batch_size.saturating_sub(self.batch.len());
        for mut entry in self.queue.drain(room) {
            self.fields.stamp(&mut entry);
            self.batch.push(entry);
        }
    }

    /// Deliver `self.batch`, isolating the loop from a panicking sink.
    ///
    /// Returns `false` when a retry was interrupted by shutdown; the batch
    /// then stays in `self.batch` and gets one more attempt in the final
    /// flush. Every other outcome finishes with the batch.
    async fn send_current(&self, retry: RetryPolicy) -> bool {
        let outcome = AssertUnwindSafe(deliver(
            &*self.sink,
            &self.batch,
            retry,
            &*self.self_log,
            &self.cancel,
        ))
        .catch_unwind()
        .await;

        match outcome {
            Ok(Delivery::Sent { attempts }) => {
                debug!(entries = self.batch.len(), attempts, "log batch sent");
                true
            }
            Ok(Delivery::Discarded { attempts }) => {
                debug!(entries = self.batch.len(), attempts, "log batch discarded");
                true
            }
            Ok(Delivery::Interrupted { attempts }) => {
                debug!(entries = self.batch.len(), attempts, "log batch retry interrupted");
                false
            }
            Err(panic) => {
                self.self_log.record(
                    SelfLogLevel::Error,
                    &format!("dispatcher cycle failed: {}", panic_message(&panic)),
                );
                true
            }
        }
    }

    /// Final best-effort flush: stop accepting writes, then send everything
    /// still buffered, one attempt per batch.
    async fn flush_remaining(&mut self) {
        self.queue.close();
        let once = RetryPolicy {
            max_attempts: 1,
            ..self.config.retry
        };

        loop {
            self.fill_batch();
            if self.batch.is_empty() {
                break;
            }
            // A single attempt has no backoff, so it cannot be interrupted.
            self.send_current(once).await;
            self.batch.clear();
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;
    use crate::self_log::RecordingSelfLog;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<Vec<LogEntry>>>,
    }

    #[async_trait]
    impl LogSink for CollectingSink {
        async fn send(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    /// Panics on the first batch, accepts the rest.
    #[derive(Default)]
    struct PanicOnceSink {
        calls: Mutex<usize>,
        batches: Mutex<Vec<Vec<LogEntry>>>,
    }

    #[async_trait]
    impl LogSink for PanicOnceSink {
        async fn send(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
            let first = {
                let mut calls = self.calls.lock();
                *calls += 1;
                *calls == 1
            };
            if first {
                panic!("sink exploded");
            }
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    /// Accepts every batch, but only after `delay`.
    struct SlowSink {
        delay: Duration,
        batches: Mutex<Vec<Vec<LogEntry>>>,
    }

    #[async_trait]
    impl LogSink for SlowSink {
        async fn send(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
            self.batches.lock().push(batch.to_vec());
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct DownSink {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LogSink for DownSink {
        async fn send(&self, _batch: &[LogEntry]) -> Result<(), SinkError> {
            *self.calls.lock() += 1;
            Err(SinkError::Status {
                status: 503,
                body: "down".to_string(),
            })
        }
    }

    fn fields() -> StaticFields {
        StaticFields {
            project_name: "orders".to_string(),
            environment: "Testing".to_string(),
            machine_name: "worker-7".to_string(),
            ip_address: "10.1.2.3".to_string(),
        }
    }

    fn dispatcher(
        queue: &Arc<BoundedQueue>,
        sink: Arc<dyn LogSink>,
        self_log: Arc<dyn SelfLog>,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(queue),
            sink,
            self_log,
            fields(),
            DispatcherConfig {
                batch_size,
                flush_interval: Duration::from_secs(3),
                retry: RetryPolicy::default(),
            },
            cancel.clone(),
        )
    }

    fn enqueue_n(queue: &BoundedQueue, n: usize) {
        for i in 0..n {
            let mut entry = LogEntry::new(Severity::Information, format!("m{i}"));
            entry.trace_id = format!("t{i}");
            queue.enqueue(entry);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batches_respect_batch_size_and_interval() {
        let queue = Arc::new(BoundedQueue::new(100));
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        enqueue_n(&queue, 5);

        let handle = dispatcher(&queue, sink.clone(), Arc::new(RecordingSelfLog::new()), 2, &cancel).spawn();

        // First cycle happens right away, the next ones one interval apart.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.batches.lock().len(), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.batches.lock().len(), 2);
        tokio::time::sleep(Duration::from_secs(3)).await;

        let sizes: Vec<usize> = sink.batches.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stamps_static_fields_on_every_entry() {
        let queue = Arc::new(BoundedQueue::new(100));
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        enqueue_n(&queue, 3);

        let handle = dispatcher(&queue, sink.clone(), Arc::new(RecordingSelfLog::new()), 50, &cancel).spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        handle.await.unwrap();

        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        for entry in &batches[0] {
            assert_eq!(entry.project_name.as_deref(), Some("orders"));
            assert_eq!(entry.environment.as_deref(), Some("Testing"));
            assert_eq!(entry.ip_address.as_deref(), Some("10.1.2.3"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_skips_sleep_and_flushes_remaining() {
        let queue = Arc::new(BoundedQueue::new(100));
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        enqueue_n(&queue, 1);

        let handle = dispatcher(&queue, sink.clone(), Arc::new(RecordingSelfLog::new()), 10, &cancel).spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Dispatcher is now sleeping out the flush interval.
        enqueue_n(&queue, 15);
        let start = tokio::time::Instant::now();
        cancel.cancel();
        handle.await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        let sizes: Vec<usize> = sink.batches.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 10, 5]);
        assert!(queue.is_closed());

        queue.enqueue(LogEntry::new(Severity::Error, "late"));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn survives_a_panicking_sink() {
        let queue = Arc::new(BoundedQueue::new(100));
        let sink = Arc::new(PanicOnceSink::default());
        let self_log = Arc::new(RecordingSelfLog::new());
        let cancel = CancellationToken::new();
        enqueue_n(&queue, 1);

        let handle = dispatcher(&queue, sink.clone(), self_log.clone(), 10, &cancel).spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;
        enqueue_n(&queue, 2);
        tokio::time::sleep(Duration::from_secs(4)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.batches.lock().len(), 1);
        assert_eq!(sink.batches.lock()[0].len(), 2);
        let records = self_log.records();
        assert!(records
            .iter()
            .any(|(level, msg)| *level == SelfLogLevel::Error && msg.contains("sink exploded")));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_queue_closed_and_empty() {
        let queue = Arc::new(BoundedQueue::new(10));
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();

        let handle = dispatcher(&queue, sink.clone(), Arc::new(RecordingSelfLog::new()), 10, &cancel).spawn();
        queue.close();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(sink.batches.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_in_flight_at_shutdown_is_sent_once() {
        let queue = Arc::new(BoundedQueue::new(10));
        let sink = Arc::new(SlowSink {
            delay: Duration::from_secs(1),
            batches: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        enqueue_n(&queue, 1);

        let handle = dispatcher(&queue, sink.clone(), Arc::new(RecordingSelfLog::new()), 10, &cancel).spawn();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.batches.lock().len(), 1);

        cancel.cancel();
        handle.await.unwrap();

        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].message, "m0");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_backoff_makes_one_final_attempt() {
        let queue = Arc::new(BoundedQueue::new(10));
        let sink = Arc::new(DownSink::default());
        let self_log = Arc::new(RecordingSelfLog::new());
        let cancel = CancellationToken::new();
        enqueue_n(&queue, 1);

        let handle = dispatcher(&queue, sink.clone(), self_log.clone(), 10, &cancel).spawn();
        // First attempt failed; the dispatcher is inside the 2s backoff.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let start = tokio::time::Instant::now();
        cancel.cancel();
        handle.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(*sink.calls.lock(), 2);
        assert_eq!(self_log.count(SelfLogLevel::Warning), 1);
        assert_eq!(self_log.count(SelfLogLevel::Error), 2);
        assert_eq!(self_log.count(SelfLogLevel::Critical), 1);
    }
}
