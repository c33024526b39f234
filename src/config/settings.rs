//! Process settings from environment variables (`.env` is honoured by the binary).

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub port: u16,
    pub config_path: PathBuf,
    /// PostgreSQL schema for data tables.
    pub data_schema: String,
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
    pub max_connections: u32,
    /// Allowed CORS origins; empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs: u64 = parsed(&lookup, "GOMS_REQUEST_TIMEOUT_SECS", 30)?;
        Ok(Settings {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/goms".into()),
            port: parsed(&lookup, "GOMS_PORT", 6336)?,
            config_path: lookup("GOMS_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config")),
            data_schema: lookup("GOMS_DATA_SCHEMA").unwrap_or_else(|| "public".into()),
            request_timeout: Duration::from_secs(timeout_secs),
            body_limit_bytes: parsed(&lookup, "GOMS_BODY_LIMIT_BYTES", 2 * 1024 * 1024)?,
            max_connections: parsed(&lookup, "GOMS_DB_MAX_CONNECTIONS", 5)?,
            cors_origins: lookup("GOMS_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{} must be a number, got '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let s = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(s.port, 6336);
        assert_eq!(s.data_schema, "public");
        assert_eq!(s.request_timeout, Duration::from_secs(30));
        assert!(s.cors_origins.is_empty());
    }

    #[test]
    fn cors_origins_are_comma_separated() {
        let env: HashMap<&str, &str> = [("GOMS_CORS_ORIGINS", " https://a.example , ,https://b.example")].into();
        let s = Settings::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn overrides_and_rejects_garbage() {
        let env: HashMap<&str, &str> = [("GOMS_PORT", "8080"), ("GOMS_DATA_SCHEMA", "app")].into();
        let s = Settings::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.port, 8080);
        assert_eq!(s.data_schema, "app");

        let bad: HashMap<&str, &str> = [("GOMS_REQUEST_TIMEOUT_SECS", "soon")].into();
        assert!(Settings::from_lookup(|k| bad.get(k).map(|v| v.to_string())).is_err());
    }
}
