//! Configuration types, loading logic and startup validation.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use migration_tracing::TracingConfig;
use serde::Deserialize;
use url::Url;

use crate::routing::Route;

/// Plain environment variables honored without a prefix.
const PLAIN_ENV_KEYS: &[&str] = &[
    "monolith_url",
    "movies_service_url",
    "gradual_migration",
    "movies_migration_percent",
    "port",
];

/// Top-level router configuration, as loaded. Validated into a
/// [`MigrationPolicy`] before the server starts.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub monolith_url: Option<String>,

    #[serde(default)]
    pub movies_service_url: Option<String>,

    /// Only the literal `true` enables gradual migration.
    #[serde(default, deserialize_with = "lenient::flag")]
    pub gradual_migration: bool,

    /// Share of traffic sent to the movies service. Anything outside
    /// 0..=100, or not a number, becomes 0.
    #[serde(default, deserialize_with = "lenient::percent")]
    pub movies_migration_percent: u8,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Outbound client settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamConfig {
    /// Per-request timeout. Unset means the transport default (none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Reasons the router refuses to start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MONOLITH_URL environment variable is required")]
    MissingMonolith,

    #[error("MOVIES_SERVICE_URL environment variable is required when GRADUAL_MIGRATION is true")]
    MissingNewService,

    #[error("{name} is not a valid URL ({value}): {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        source: url::ParseError,
    },
}

/// Validated, immutable routing policy for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct MigrationPolicy {
    pub monolith: Url,
    /// Always `Some` when `gradual` is true.
    pub new_service: Option<Url>,
    pub gradual: bool,
    pub percent: u8,
}

impl MigrationPolicy {
    /// Validate the loaded configuration. Fails when the monolith target is
    /// missing, or when gradual migration is on without a new-service target.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let monolith = match non_empty(&config.monolith_url) {
            Some(raw) => parse_url("MONOLITH_URL", raw)?,
            None => return Err(ConfigError::MissingMonolith),
        };

        let new_service = match non_empty(&config.movies_service_url) {
            Some(raw) => Some(parse_url("MOVIES_SERVICE_URL", raw)?),
            None if config.gradual_migration => return Err(ConfigError::MissingNewService),
            None => None,
        };

        Ok(Self {
            monolith,
            new_service,
            gradual: config.gradual_migration,
            percent: config.movies_migration_percent,
        })
    }

    /// Base URL for a route. A new-service route without a configured target
    /// cannot be produced by validation, so it falls back to the monolith.
    pub fn base_url(&self, route: Route) -> &Url {
        match route {
            Route::NewService => self.new_service.as_ref().unwrap_or(&self.monolith),
            Route::Monolith => &self.monolith,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        name,
        value: raw.to_string(),
        source,
    })
}

impl ProxyConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Prefixed environment variables (MOVIES_PROXY_ prefix, __ for nesting)
    /// 2. Plain environment variables (MONOLITH_URL, PORT, ...)
    /// 3. TOML config file
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: ProxyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::raw().only(PLAIN_ENV_KEYS))
            .merge(Env::prefixed("MOVIES_PROXY_").split("__"))
            .extract()?;

        Ok(config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Deserializers that accept whatever the environment hands over.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Float(f64),
        Str(String),
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => b,
            Raw::Str(s) => s.trim() == "true",
            Raw::Int(_) | Raw::Float(_) => false,
        })
    }

    pub fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let value = match Raw::deserialize(deserializer)? {
            Raw::Int(n) => n,
            Raw::Float(f) if f.is_finite() => f.trunc() as i64,
            Raw::Str(s) => leading_integer(&s).unwrap_or(0),
            Raw::Float(_) | Raw::Bool(_) => 0,
        };
        Ok(u8::try_from(value).ok().filter(|p| *p <= 100).unwrap_or(0))
    }

    /// Leading decimal integer of `s`, so "35%" reads as 35.
    fn leading_integer(s: &str) -> Option<i64> {
        let s = s.trim();
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, s.strip_prefix('+').unwrap_or(s)),
        };
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        digits[..end].parse::<i64>().ok().map(|n| sign * n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> ProxyConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = config(json!({ "monolith_url": "http://monolith:8080" }));
        assert_eq!(cfg.listen_address(), "0.0.0.0:8000");
        assert!(!cfg.gradual_migration);
        assert_eq!(cfg.movies_migration_percent, 0);
        assert!(cfg.upstream.timeout_secs.is_none());
    }

    #[test]
    fn test_missing_monolith_is_rejected() {
        let cfg = config(json!({ "movies_service_url": "http://movies:8081" }));
        assert!(matches!(
            MigrationPolicy::from_config(&cfg),
            Err(ConfigError::MissingMonolith)
        ));

        let blank = config(json!({ "monolith_url": "  " }));
        assert!(matches!(
            MigrationPolicy::from_config(&blank),
            Err(ConfigError::MissingMonolith)
        ));
    }

    #[test]
    fn test_gradual_without_new_service_is_rejected() {
        let cfg = config(json!({
            "monolith_url": "http://monolith:8080",
            "gradual_migration": "true",
        }));
        assert!(matches!(
            MigrationPolicy::from_config(&cfg),
            Err(ConfigError::MissingNewService)
        ));
    }

    #[test]
    fn test_new_service_optional_when_not_gradual() {
        let cfg = config(json!({ "monolith_url": "http://monolith:8080" }));
        let policy = MigrationPolicy::from_config(&cfg).unwrap();
        assert!(policy.new_service.is_none());
        assert_eq!(policy.base_url(Route::Monolith).as_str(), "http://monolith:8080/");
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let cfg = config(json!({ "monolith_url": "not a url" }));
        let err = MigrationPolicy::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("MONOLITH_URL"));
    }

    #[test]
    fn test_flag_only_literal_true() {
        for (raw, expected) in [
            (json!("true"), true),
            (json!(true), true),
            (json!("TRUE"), false),
            (json!("1"), false),
            (json!(1), false),
            (json!("false"), false),
        ] {
            let cfg = config(json!({ "gradual_migration": raw }));
            assert_eq!(cfg.gradual_migration, expected, "input {raw}");
        }
    }

    #[test]
    fn test_percent_is_lenient() {
        for (raw, expected) in [
            (json!(25), 25),
            (json!("40"), 40),
            (json!(" 35% "), 35),
            (json!(12.9), 12),
            (json!(100), 100),
            (json!(101), 0),
            (json!(-5), 0),
            (json!("-5"), 0),
            (json!("abc"), 0),
            (json!(""), 0),
            (json!(true), 0),
        ] {
            let cfg = config(json!({ "movies_migration_percent": raw }));
            assert_eq!(cfg.movies_migration_percent, expected, "input {raw}");
        }
    }

    fn load() -> figment::Result<ProxyConfig> {
        ProxyConfig::load("movies-proxy.toml").map_err(|e| figment::Error::from(e.to_string()))
    }

    #[test]
    fn test_load_from_plain_env() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("MONOLITH_URL", "http://monolith:8080");
            jail.set_env("MOVIES_SERVICE_URL", "http://movies:8081");
            jail.set_env("GRADUAL_MIGRATION", "true");
            jail.set_env("MOVIES_MIGRATION_PERCENT", "35");
            jail.set_env("PORT", "9001");

            let cfg = load()?;
            assert_eq!(cfg.monolith_url.as_deref(), Some("http://monolith:8080"));
            assert_eq!(cfg.movies_service_url.as_deref(), Some("http://movies:8081"));
            assert!(cfg.gradual_migration);
            assert_eq!(cfg.movies_migration_percent, 35);
            assert_eq!(cfg.listen_address(), "0.0.0.0:9001");

            let policy = MigrationPolicy::from_config(&cfg).map_err(|e| e.to_string())?;
            assert!(policy.gradual);
            assert_eq!(policy.percent, 35);
            Ok(())
        });
    }

    #[test]
    fn test_load_non_numeric_percent_env_is_zero() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("MONOLITH_URL", "http://monolith:8080");
            jail.set_env("MOVIES_MIGRATION_PERCENT", "abc");
            jail.set_env("GRADUAL_MIGRATION", "yes");

            let cfg = load()?;
            assert_eq!(cfg.movies_migration_percent, 0);
            assert!(!cfg.gradual_migration);
            Ok(())
        });
    }

    #[test]
    fn test_load_precedence() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "movies-proxy.toml",
                r#"
                monolith_url = "http://file-monolith:8080"
                host = "127.0.0.1"
                port = 7000
                movies_migration_percent = 10

                [upstream]
                timeout_secs = 30
                "#,
            )?;
            jail.set_env("PORT", "9001");
            jail.set_env("MOVIES_MIGRATION_PERCENT", "20");
            jail.set_env("MOVIES_PROXY_MOVIES_MIGRATION_PERCENT", "30");
            jail.set_env("MOVIES_PROXY_UPSTREAM__TIMEOUT_SECS", "5");

            let cfg = load()?;
            // File values survive where nothing overrides them.
            assert_eq!(cfg.monolith_url.as_deref(), Some("http://file-monolith:8080"));
            assert_eq!(cfg.host, "127.0.0.1");
            // Plain env beats the file, prefixed env beats plain env.
            assert_eq!(cfg.port, 9001);
            assert_eq!(cfg.movies_migration_percent, 30);
            assert_eq!(cfg.upstream.timeout_secs, Some(5));

            jail.set_env("MOVIES_PROXY_PORT", "9100");
            assert_eq!(load()?.port, 9100);
            Ok(())
        });
    }

    #[test]
    fn test_load_without_monolith_fails_validation() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("GRADUAL_MIGRATION", "true");
            let cfg = load()?;
            assert!(matches!(
                MigrationPolicy::from_config(&cfg),
                Err(ConfigError::MissingMonolith)
            ));
            Ok(())
        });
    }
}
