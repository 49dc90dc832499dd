//! Tracing configuration types.

use serde::Deserialize;

/// Configuration for logging and the optional OpenTelemetry exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    /// Service name reported to the OTLP collector. Each binary supplies its
    /// own name when this is unset.
    #[serde(default)]
    pub service_name: Option<String>,

    /// OTLP collector endpoint (e.g. "http://jaeger:4317").
    /// When `None`, OTLP export is disabled and only fmt logging is used.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Transport protocol for OTLP export.
    #[serde(default)]
    pub protocol: OtlpProtocol,

    /// Log level filter (e.g. "info", "debug", "events_relay=debug,info").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format of the fmt layer.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// OTLP transport protocol.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// Human-readable lines for local runs, JSON lines for log shippers.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TracingConfig {
    /// The configured service name, or `fallback` when none was given.
    pub fn service_name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.service_name.as_deref().unwrap_or(fallback)
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            otlp_endpoint: None,
            protocol: OtlpProtocol::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_section() {
        let config: TracingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.protocol, OtlpProtocol::Grpc);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.service_name_or("events-relay"), "events-relay");
    }

    #[test]
    fn test_explicit_values() {
        let config: TracingConfig = serde_json::from_str(
            r#"{"service_name": "router-canary", "protocol": "http", "log_format": "json"}"#,
        )
        .unwrap();
        assert_eq!(config.protocol, OtlpProtocol::Http);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.service_name_or("movies-proxy"), "router-canary");
    }
}
