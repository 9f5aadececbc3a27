use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use tracing_log_shipper::init::install;
use tracing_log_shipper::noop_sink::NoopSink;
use tracing_log_shipper::self_log::StderrSelfLog;
use tracing_log_shipper::{Environment, LogShipper, ShipperConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ShipperConfig::new("load-test", Environment::Testing, "http://localhost/unused");
    let shipper = LogShipper::start_with_sink(config, Arc::new(NoopSink), Arc::new(StderrSelfLog))?;
    install(&shipper, false)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: logged {} events in {:?} (~{:.0} ev/s), {} dropped by the queue",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        shipper.queue().dropped(),
    );

    // Give the dispatcher a little time before the final flush
    sleep(Duration::from_secs(2)).await;
    shipper.shutdown().await;
    Ok(())
}
