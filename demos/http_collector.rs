use tokio::time::{sleep, Duration};
use tracing::{error, info, info_span, warn};

use tracing_log_shipper::init::init_shipper;
use tracing_log_shipper::{Environment, ShipperConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Point this at your collector, or export LOG_SHIPPER_ENDPOINT and
    // use `init_shipper_from_env` instead.
    let endpoint = std::env::var("LOG_SHIPPER_ENDPOINT")
        .unwrap_or_else(|_| "http://127.0.0.1:8080/api/logs".to_string());

    let mut config = ShipperConfig::new("3b241101-e2bb-4255-8caf-4136c566a962", Environment::Development, endpoint);
    config.project_name = "orders-service".to_string();
    config.enable_stdout = true;

    let shipper = init_shipper(config)?;

    info!("starting service");

    {
        let request = info_span!("request", TraceId = "4bf92f3577b34da6", UserId = "42", Method = "POST", Path = "/orders");
        let _request = request.enter();

        warn!("inventory running low");

        let completed = info_span!("completed", StatusCode = 500u64, Elapsed = 37.2);
        let _completed = completed.enter();
        error!(exception = "TimeoutError: payment gateway", "order failed");
    }

    // Let one flush cycle go out, then flush the rest on shutdown.
    sleep(Duration::from_secs(4)).await;
    shipper.shutdown().await;
    Ok(())
}
