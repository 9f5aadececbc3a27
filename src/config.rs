use crate::env;
use crate::record::Severity;
use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment tag attached to every shipped entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "Development",
            Environment::Testing => "Testing",
            Environment::Staging => "Staging",
            Environment::Production => "Production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Registration-time configuration errors. These are fatal: the shipper
/// refuses to start rather than run with a half-valid setup.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("license key cannot be empty")]
    EmptyLicenseKey,

    #[error("endpoint url cannot be empty")]
    EmptyEndpoint,

    #[error("endpoint url `{0}` must be a valid absolute http(s) url")]
    InvalidEndpoint(String),

    #[error("environment `{0}` is not a recognized environment")]
    UnknownEnvironment(String),

    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),

    #[error("invalid value for {key}: `{value}`")]
    InvalidEnvValue { key: &'static str, value: String },
}

/// Configuration for the log shipper.
///
/// **Fields**
/// - `license_key`: sent as the `X-License-Key` header on every request.
/// - `environment`: tag stamped on every entry.
/// - `project_name`: logical project stamped on every entry.
/// - `endpoint_url`: absolute http(s) URL of the collector.
/// - `batch_size`: maximum entries per POST.
/// - `flush_interval`: pause between dispatcher cycles.
/// - `queue_capacity`: entries buffered before the oldest ones are dropped.
/// - `request_timeout`: per-attempt HTTP timeout.
/// - `max_attempts` / `initial_backoff`: retry policy for one batch.
/// - `min_level`, `noisy_targets`, `noisy_min_level`: producer-side filter.
/// - `enable_stdout`: also install a `fmt` layer when initializing the
///   global subscriber.
#[derive(Clone, Debug)]
pub struct ShipperConfig {
    pub license_key: String,
    pub environment: Environment,
    pub project_name: String,
    pub endpoint_url: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub min_level: Severity,
    pub noisy_targets: Vec<String>,
    pub noisy_min_level: Severity,
    pub enable_stdout: bool,
}

pub const DEFAULT_PROJECT_NAME: &str = "UnknownProject";
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Target prefixes whose chatter is only shipped at `Warning` and above.
pub const DEFAULT_NOISY_TARGETS: &[&str] = &["hyper", "reqwest", "h2", "rustls", "tokio", "tower", "mio"];

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            license_key: String::new(),
            environment: Environment::Development,
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            endpoint_url: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            min_level: Severity::Information,
            noisy_targets: DEFAULT_NOISY_TARGETS.iter().map(|t| t.to_string()).collect(),
            noisy_min_level: Severity::Warning,
            enable_stdout: false,
        }
    }
}

impl ShipperConfig {
    /// Minimal configuration with every knob at its default.
    pub fn new(
        license_key: impl Into<String>,
        environment: Environment,
        endpoint_url: impl Into<String>,
    ) -> Self {
        Self {
            license_key: license_key.into(),
            environment,
            endpoint_url: endpoint_url.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from `LOG_SHIPPER_*` environment variables.
    ///
    /// Missing optional variables keep their defaults; the result still
    /// has to pass [`ShipperConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::env_or(env::LOG_SHIPPER_ENVIRONMENT_ENV, "Development").parse()?;
        let mut config = Self::new(
            env::env_or(env::LOG_SHIPPER_LICENSE_KEY_ENV, ""),
            environment,
            env::env_or(env::LOG_SHIPPER_ENDPOINT_ENV, ""),
        );
        config.project_name = env::env_or(env::LOG_SHIPPER_PROJECT_ENV, DEFAULT_PROJECT_NAME);

        if let Some(raw) = env::env_opt(env::LOG_SHIPPER_BATCH_SIZE_ENV) {
            config.batch_size = raw.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
                key: env::LOG_SHIPPER_BATCH_SIZE_ENV,
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = env::env_opt(env::LOG_SHIPPER_FLUSH_INTERVAL_MS_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
                key: env::LOG_SHIPPER_FLUSH_INTERVAL_MS_ENV,
                value: raw.clone(),
            })?;
            config.flush_interval = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// Check the configuration once, at registration time.
    ///
    /// **Returns**
    /// - the parsed endpoint [`Url`] when everything is acceptable.
    /// - the first [`ConfigError`] found otherwise.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let key = self.license_key.trim();
        if key.is_empty() || is_nil_uuid(key) {
            return Err(ConfigError::EmptyLicenseKey);
        }

        let raw_url = self.endpoint_url.trim();
        if raw_url.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        let url = Url::parse(raw_url).map_err(|_| ConfigError::InvalidEndpoint(raw_url.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(ConfigError::InvalidEndpoint(raw_url.to_string()));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::NotPositive("batch_size"));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::NotPositive("flush_interval"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::NotPositive("queue_capacity"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::NotPositive("request_timeout"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NotPositive("max_attempts"));
        }

        Ok(url)
    }
}

// An all-zero UUID is what an unset GUID-typed key looks like.
fn is_nil_uuid(key: &str) -> bool {
    uuid::Uuid::parse_str(key).map(|u| u.is_nil()).unwrap_or(false)
}
