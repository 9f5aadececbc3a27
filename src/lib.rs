//! Asynchronous log shipping for `tracing`.
//!
//! Events are turned into [`record::LogEntry`]s on the calling thread,
//! enriched from the active scopes, and pushed into a bounded drop-oldest
//! queue. A background dispatcher drains the queue in batches, stamps
//! process-wide fields and POSTs each batch to the collector with bounded
//! retries. Nothing on the producer side ever blocks on I/O or fails.

pub mod record;
pub mod config;
pub mod env;
pub mod queue;
pub mod scope;
pub mod enrich;
pub mod filter;
pub mod self_log;
pub mod sink;
pub mod http;
pub mod retry;
pub mod dispatcher;
pub mod logger;
pub mod layer;
pub mod shipper;
pub mod init;
pub mod noop_sink;

pub use config::{ConfigError, Environment, ShipperConfig};
pub use record::{LogEntry, Severity};
pub use scope::{LogContext, Scope};
pub use shipper::{LogShipper, StartError};
