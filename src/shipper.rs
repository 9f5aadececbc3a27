use crate::config::{ConfigError, ShipperConfig};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::enrich::{HostIdentity, StaticFields};
use crate::filter::LevelFilter;
use crate::http::{HttpSink, HttpSinkConfig};
use crate::layer::ShipperLayer;
use crate::logger::Logger;
use crate::queue::BoundedQueue;
use crate::retry::RetryPolicy;
use crate::self_log::{SelfLog, StderrSelfLog};
use crate::sink::{LogSink, SinkError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors that prevent the shipper from starting.
#[derive(thiserror::Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build http sink: {0}")]
    Sink(#[from] SinkError),

    #[error("log shipper must be started from within a Tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// A running pipeline: the shared queue plus the background dispatcher.
///
/// Hand out producers with [`LogShipper::layer`] or [`LogShipper::logger`];
/// call [`LogShipper::shutdown`] before the runtime goes away to flush what
/// is still buffered.
pub struct LogShipper {
    queue: Arc<BoundedQueue>,
    filter: Arc<LevelFilter>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LogShipper {
    /// Validate `config`, build the HTTP sink and start the dispatcher.
    ///
    /// Must be called from within a Tokio runtime; otherwise
    /// [`StartError::NoRuntime`] is returned. Resolving the host identity
    /// does a blocking DNS lookup of the machine name on the calling
    /// thread, once. Hosts that cannot afford that on a runtime thread
    /// should resolve [`HostIdentity`] themselves and use
    /// [`LogShipper::start_parts`].
    pub fn start(config: ShipperConfig) -> Result<Self, StartError> {
        let sink = HttpSink::new(HttpSinkConfig::from_config(&config)?)?;
        Self::start_with_sink(config, Arc::new(sink), Arc::new(StderrSelfLog))
    }

    /// Start with a custom sink and self-log. The configuration is still
    /// validated in full, even if the sink ignores the endpoint. Host
    /// identity is resolved as in [`LogShipper::start`].
    pub fn start_with_sink(
        config: ShipperConfig,
        sink: Arc<dyn LogSink>,
        self_log: Arc<dyn SelfLog>,
    ) -> Result<Self, StartError> {
        config.validate()?;
        tokio::runtime::Handle::try_current()?;

        let host = HostIdentity::resolve();
        let fields = StaticFields::new(&config, host);
        Ok(Self::start_parts(config, sink, self_log, fields))
    }

    /// Start with an already-resolved host identity. No DNS lookups.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start_parts(
        config: ShipperConfig,
        sink: Arc<dyn LogSink>,
        self_log: Arc<dyn SelfLog>,
        fields: StaticFields,
    ) -> Self {
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let filter = Arc::new(LevelFilter::from_config(&config));
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            sink,
            self_log,
            fields,
            DispatcherConfig {
                batch_size: config.batch_size,
                flush_interval: config.flush_interval,
                retry: RetryPolicy::from_config(&config),
            },
            cancel.clone(),
        );
        let handle = dispatcher.spawn();

        Self {
            queue,
            filter,
            cancel,
            handle: Some(handle),
        }
    }

    /// A `tracing` layer feeding this shipper.
    pub fn layer(&self) -> ShipperLayer {
        ShipperLayer::new(Arc::clone(&self.queue), Arc::clone(&self.filter))
    }

    /// An explicit-context producer for `category`.
    pub fn logger(&self, category: impl Into<String>) -> Logger {
        Logger::new(Arc::clone(&self.queue), Arc::clone(&self.filter), category)
    }

    pub fn queue(&self) -> &Arc<BoundedQueue> {
        &self.queue
    }

    /// Stop accepting entries, flush what is buffered and wait for the
    /// dispatcher to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                eprintln!("[log-shipper internal] ERROR: dispatcher task failed: {}", e);
            }
        }
    }

    fn stop(&self) {
        self.queue.close();
        self.cancel.cancel();
    }
}

impl Drop for LogShipper {
    // Without an explicit shutdown the dispatcher still gets its final
    // flush, but nobody waits for it.
    fn drop(&mut self) {
        self.stop();
    }
}
