use std::sync::Arc;

use async_trait::async_trait;
use tracing_log_shipper::{
    record::LogEntry,
    self_log::StderrSelfLog,
    sink::{LogSink, SinkError},
    Environment, LogContext, LogShipper, Scope, ShipperConfig,
};

/// Example of integrating a completely custom backend by implementing
/// the `LogSink` trait directly. Imagine this talks to some proprietary
/// store for which this crate does not provide a built-in sink.
struct StdoutJsonSink;

#[async_trait]
impl LogSink for StdoutJsonSink {
    async fn send(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
        println!("{}", serde_json::to_string_pretty(batch)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ShipperConfig::new("demo-key", Environment::Testing, "http://localhost/unused");
    let shipper = LogShipper::start_with_sink(config, Arc::new(StdoutJsonSink), Arc::new(StderrSelfLog))?;
    let logger = shipper.logger("demo::custom");

    let request = LogContext::new().with_scope(Scope::new().with("UserId", "u1").with("TraceId", "t1"));
    logger.information(&request, "custom backend example started");

    let handler = request.with_scope(Scope::new().with("StatusCode", 404).with("Path", "/missing"));
    logger.warning(&handler, "resource not found");

    shipper.shutdown().await;
    Ok(())
}
