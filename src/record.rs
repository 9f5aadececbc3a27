use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Severity of a [`LogEntry`].
///
/// Serialized by name (`"Information"`, `"Warning"`, ...) which is what the
/// collector expects in the `logLevel` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "Trace",
            Severity::Debug => "Debug",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::TRACE {
            Severity::Trace
        } else if *level == tracing::Level::DEBUG {
            Severity::Debug
        } else if *level == tracing::Level::INFO {
            Severity::Information
        } else if *level == tracing::Level::WARN {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown severity `{0}`")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "information" | "info" => Ok(Severity::Information),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// One structured log occurrence as it travels through the pipeline and
/// over the wire.
///
/// Producer-side fields (trace id, user id, HTTP transaction data) are
/// filled from the scope stack when the entry is created. The static
/// process fields (`project_name`, `environment`, `machine_name`,
/// `ip_address`) are stamped by the dispatcher right before sending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub trace_id: String,
    pub environment: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub log_level: Severity,
    pub message: String,
    pub project_name: Option<String>,
    pub machine_name: Option<String>,
    pub ip_address: Option<String>,
    pub exception: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<i32>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub elapsed_milliseconds: Option<f64>,
}

impl LogEntry {
    /// Create an entry timestamped now (UTC). The trace id starts empty and
    /// is resolved by [`crate::scope::LogContext::enrich`] before the entry
    /// is queued.
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        LogEntry {
            trace_id: String::new(),
            environment: None,
            user_id: None,
            timestamp: Utc::now(),
            log_level: level,
            message: message.into(),
            project_name: None,
            machine_name: None,
            ip_address: None,
            exception: None,
            method: None,
            path: None,
            status_code: None,
            request_body: None,
            response_body: None,
            elapsed_milliseconds: None,
        }
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_collector_field_names() {
        let mut entry = LogEntry::new(Severity::Information, "hello");
        entry.trace_id = "abc".to_string();
        entry.status_code = Some(200);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["traceId"], "abc");
        assert_eq!(json["logLevel"], "Information");
        assert_eq!(json["statusCode"], 200);
        assert!(json["userId"].is_null());
        assert!(json.get("elapsedMilliseconds").is_some());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn severity_parses_common_aliases() {
        assert_eq!("info".parse::<Severity>(), Ok(Severity::Information));
        assert_eq!("Warning".parse::<Severity>(), Ok(Severity::Warning));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_maps_from_tracing_levels() {
        assert_eq!(Severity::from(&tracing::Level::INFO), Severity::Information);
        assert_eq!(Severity::from(&tracing::Level::ERROR), Severity::Error);
    }
}
