/// Environment variable names read by [`crate::config::ShipperConfig::from_env`].
///
/// These are purely helpers; the core pipeline types remain decoupled from
/// environment access.

/// License key sent with every request.
pub const LOG_SHIPPER_LICENSE_KEY_ENV: &str = "LOG_SHIPPER_LICENSE_KEY";

/// Environment tag, e.g. `Production`.
pub const LOG_SHIPPER_ENVIRONMENT_ENV: &str = "LOG_SHIPPER_ENVIRONMENT";

/// Project name stamped on every entry.
pub const LOG_SHIPPER_PROJECT_ENV: &str = "LOG_SHIPPER_PROJECT";

/// Collector endpoint, e.g. `https://logs.example.com/api/logs`.
pub const LOG_SHIPPER_ENDPOINT_ENV: &str = "LOG_SHIPPER_ENDPOINT";

/// Optional batch size override.
pub const LOG_SHIPPER_BATCH_SIZE_ENV: &str = "LOG_SHIPPER_BATCH_SIZE";

/// Optional flush interval override, in milliseconds.
pub const LOG_SHIPPER_FLUSH_INTERVAL_MS_ENV: &str = "LOG_SHIPPER_FLUSH_INTERVAL_MS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and empty the same way.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
