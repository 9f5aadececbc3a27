use crate::config::{ConfigError, ShipperConfig};
use crate::record::LogEntry;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;

/// Header carrying the license key on every request.
pub const LICENSE_KEY_HEADER: &str = "x-license-key";

/// Configuration for [`HttpSink`].
#[derive(Clone, Debug)]
pub struct HttpSinkConfig {
    /// Absolute collector URL, e.g. "https://logs.example.com/api/logs".
    pub endpoint: Url,
    pub license_key: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl HttpSinkConfig {
    pub fn from_config(config: &ShipperConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: config.validate()?,
            license_key: config.license_key.trim().to_string(),
            timeout: config.request_timeout,
        })
    }
}

/// Collector sink: POSTs each batch as a JSON array.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: Url,
}

impl HttpSink {
    /// Construct a sink with the license key installed as a default header.
    ///
    /// **Returns**
    /// - `Err(SinkError::Network)` if the TLS backend cannot be initialised.
    /// - `Err(SinkError::Other)` if the license key is not a valid header
    ///   value.
    pub fn new(config: HttpSinkConfig) -> Result<Self, SinkError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.license_key).map_err(|e| SinkError::Other(Box::new(e)))?;
        headers.insert(HeaderName::from_static(LICENSE_KEY_HEADER), key);

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl LogSink for HttpSink {
    async fn send(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
        let body = serde_json::to_vec(batch)?;
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(SinkError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}
