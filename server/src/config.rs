//! Environment-driven configuration

use std::str::FromStr;
use std::time::Duration;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Upper bound on the buyer confirmation window
pub const MAX_AUTO_COMPLETE_DAYS: i64 = 3650;

/// Server configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub sweep_interval: Duration,
    pub sweep_batch_size: i64,
    pub auto_complete_days: i64,
    pub event_channel_capacity: usize,
    pub webhook_secret: Option<String>,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let webhook_secret = lookup("WEBHOOK_SECRET").filter(|s| !s.is_empty());
        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let auto_complete_days = parse(&lookup, "AUTO_COMPLETE_DAYS", 7, "number of days")?;
        if !(1..=MAX_AUTO_COMPLETE_DAYS).contains(&auto_complete_days) {
            return Err(ConfigError::Invalid {
                name: "AUTO_COMPLETE_DAYS",
                expected: "number of days between 1 and 3650",
                value: auto_complete_days.to_string(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "postgresql://localhost/marketplace".to_string()),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 5, "integer")?,
            port: parse(&lookup, "PORT", 3001, "port number")?,
            sweep_interval: Duration::from_secs(parse(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                300,
                "number of seconds",
            )?),
            sweep_batch_size: parse(&lookup, "SWEEP_BATCH_SIZE", 200, "integer")?,
            auto_complete_days,
            event_channel_capacity: parse(&lookup, "EVENT_CHANNEL_CAPACITY", 256, "integer")?,
            webhook_secret,
            cors_allowed_origins,
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.auto_complete_days, 7);
        assert!(config.webhook_secret.is_none());
        assert!(config.cors_allowed_origins.is_empty());
    }

    #[test]
    fn values_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("SWEEP_INTERVAL_SECS", "60"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn auto_complete_window_is_bounded() {
        for value in ["0", "-3", "3651", "9223372036854775807"] {
            let err = AppConfig::from_lookup(lookup(&[("AUTO_COMPLETE_DAYS", value)])).unwrap_err();
            assert!(err.to_string().contains("AUTO_COMPLETE_DAYS"), "{value}");
        }
        let config = AppConfig::from_lookup(lookup(&[("AUTO_COMPLETE_DAYS", "14")])).unwrap();
        assert_eq!(config.auto_complete_days, 14);
    }
}
