use crate::config::ShipperConfig;
use crate::shipper::{LogShipper, StartError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Start a [`LogShipper`] from `config` and install its layer as the
/// global `tracing` subscriber.
///
/// **Parameters**
/// - `config`: validated here; any [`crate::config::ConfigError`] aborts
///   startup.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with the shipper layer, plus a `fmt`
/// layer when `config.enable_stdout` is set, so all `tracing` events in
/// the process are observed.
///
/// **Returns**
///
/// The running shipper. Keep it alive for the lifetime of the process and
/// call [`LogShipper::shutdown`] on exit.
pub fn init_shipper(config: ShipperConfig) -> Result<LogShipper, InitError> {
    let enable_stdout = config.enable_stdout;
    let shipper = LogShipper::start(config)?;
    install(&shipper, enable_stdout)?;
    Ok(shipper)
}

/// Equivalent to [`init_shipper`] with [`ShipperConfig::from_env`].
pub fn init_shipper_from_env() -> Result<LogShipper, InitError> {
    let config = ShipperConfig::from_env().map_err(StartError::from)?;
    init_shipper(config)
}

/// Install `shipper`'s layer as the global default subscriber.
pub fn install(shipper: &LogShipper, enable_stdout: bool) -> Result<(), InitError> {
    let layer = shipper.layer();

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
