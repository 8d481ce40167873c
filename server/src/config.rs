//! Server configuration module.
//!
//! Parses configuration from environment variables for the Presence server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PRESENCE_SECRET_TOKEN` | Yes | - | Shared credential reporters must present |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `PRESENCE_DB_PATH` | No | `presence.db` | SQLite database file |
//! | `PRESENCE_ACTIVITY_OFFLINE_SECS` | No | 15 | Activity offline threshold |
//! | `PRESENCE_HEARTRATE_OFFLINE_SECS` | No | 3600 | Heart-rate offline threshold |
//! | `PRESENCE_PHONE_OFFLINE_SECS` | No | 900 | Phone-status offline threshold |
//!
//! The default thresholds are the expected reporting cadence of each channel
//! multiplied by a safety factor of three: the desktop client reports every
//! ~5s, the phone automation every ~5min, and heart-rate sources anywhere
//! from minutes to an hour apart.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Channel;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default SQLite database file, relative to the working directory.
const DEFAULT_DB_PATH: &str = "presence.db";

/// Default offline threshold for the activity channel (5s cadence x 3).
const DEFAULT_ACTIVITY_OFFLINE_SECS: u64 = 15;

/// Default offline threshold for the heart-rate channel.
const DEFAULT_HEARTRATE_OFFLINE_SECS: u64 = 3600;

/// Default offline threshold for the phone-status channel (5min cadence x 3).
const DEFAULT_PHONE_OFFLINE_SECS: u64 = 900;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Per-channel staleness thresholds.
///
/// Channels report at very different natural cadences, so each carries its
/// own cutoff rather than sharing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub activity: Duration,
    pub heart_rate: Duration,
    pub phone_status: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            activity: Duration::from_secs(DEFAULT_ACTIVITY_OFFLINE_SECS),
            heart_rate: Duration::from_secs(DEFAULT_HEARTRATE_OFFLINE_SECS),
            phone_status: Duration::from_secs(DEFAULT_PHONE_OFFLINE_SECS),
        }
    }
}

impl Thresholds {
    /// The offline threshold for one channel.
    #[must_use]
    pub fn for_channel(&self, channel: Channel) -> Duration {
        match channel {
            Channel::Activity => self.activity,
            Channel::HeartRate => self.heart_rate,
            Channel::PhoneStatus => self.phone_status,
        }
    }
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared credential that every reporter must present.
    ///
    /// Held as plain configuration and injected into the ingestion path so
    /// tests can stub it and operators can rotate it by restarting.
    pub secret_token: String,

    /// HTTP server port.
    pub port: u16,

    /// Path of the SQLite database file.
    pub db_path: PathBuf,

    /// Per-channel staleness thresholds.
    pub thresholds: Thresholds,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `PRESENCE_SECRET_TOKEN` is missing or empty,
    /// or if any numeric variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_token = match env::var("PRESENCE_SECRET_TOKEN") {
            Ok(token) if !token.is_empty() => token,
            _ => {
                return Err(ConfigError::MissingEnvVar(
                    "PRESENCE_SECRET_TOKEN".to_string(),
                ))
            }
        };

        let port = parse_port()?;

        let db_path = env::var("PRESENCE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let thresholds = Thresholds {
            activity: parse_threshold("PRESENCE_ACTIVITY_OFFLINE_SECS", DEFAULT_ACTIVITY_OFFLINE_SECS)?,
            heart_rate: parse_threshold(
                "PRESENCE_HEARTRATE_OFFLINE_SECS",
                DEFAULT_HEARTRATE_OFFLINE_SECS,
            )?,
            phone_status: parse_threshold("PRESENCE_PHONE_OFFLINE_SECS", DEFAULT_PHONE_OFFLINE_SECS)?,
        };

        Ok(Self {
            secret_token,
            port,
            db_path,
            thresholds,
        })
    }
}

/// Parse the PORT environment variable, falling back to the default.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse a positive threshold in seconds, falling back to the default.
fn parse_threshold(var: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    let secs = match env::var(var) {
        Ok(value) => value.parse::<u64>().map_err(|err| ConfigError::InvalidValue {
            var: var.to_string(),
            message: err.to_string(),
        })?,
        Err(_) => default_secs,
    };

    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: "threshold must be positive".to_string(),
        });
    }

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn clear_presence_vars(guard: &mut EnvGuard) {
        guard.remove("PRESENCE_SECRET_TOKEN");
        guard.remove("PRESENCE_DB_PATH");
        guard.remove("PRESENCE_ACTIVITY_OFFLINE_SECS");
        guard.remove("PRESENCE_HEARTRATE_OFFLINE_SECS");
        guard.remove("PRESENCE_PHONE_OFFLINE_SECS");
        guard.remove("PORT");
    }

    #[test]
    #[serial]
    fn config_with_defaults() {
        let mut guard = EnvGuard::new();
        clear_presence_vars(&mut guard);
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.secret_token, "s3cret");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.thresholds, Thresholds::default());
    }

    #[test]
    #[serial]
    fn config_missing_secret_token() {
        let mut guard = EnvGuard::new();
        clear_presence_vars(&mut guard);

        let result = Config::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "PRESENCE_SECRET_TOKEN"));
    }

    #[test]
    #[serial]
    fn config_rejects_empty_secret_token() {
        let mut guard = EnvGuard::new();
        clear_presence_vars(&mut guard);
        guard.set("PRESENCE_SECRET_TOKEN", "");

        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn config_with_custom_values() {
        let mut guard = EnvGuard::new();
        clear_presence_vars(&mut guard);
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");
        guard.set("PORT", "9090");
        guard.set("PRESENCE_DB_PATH", "/var/lib/presence/records.db");
        guard.set("PRESENCE_ACTIVITY_OFFLINE_SECS", "30");
        guard.set("PRESENCE_HEARTRATE_OFFLINE_SECS", "600");
        guard.set("PRESENCE_PHONE_OFFLINE_SECS", "120");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, 9090);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/presence/records.db"));
        assert_eq!(config.thresholds.activity, Duration::from_secs(30));
        assert_eq!(config.thresholds.heart_rate, Duration::from_secs(600));
        assert_eq!(config.thresholds.phone_status, Duration::from_secs(120));
    }

    #[test]
    #[serial]
    fn config_rejects_invalid_port() {
        let mut guard = EnvGuard::new();
        clear_presence_vars(&mut guard);
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");
        guard.set("PORT", "not-a-number");

        let result = Config::from_env();
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidPort(_)));
    }

    #[test]
    #[serial]
    fn config_rejects_invalid_threshold() {
        let mut guard = EnvGuard::new();
        clear_presence_vars(&mut guard);
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");
        guard.set("PRESENCE_ACTIVITY_OFFLINE_SECS", "soon");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { ref var, .. } if var == "PRESENCE_ACTIVITY_OFFLINE_SECS"
        ));
    }

    #[test]
    #[serial]
    fn config_rejects_zero_threshold() {
        let mut guard = EnvGuard::new();
        clear_presence_vars(&mut guard);
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");
        guard.set("PRESENCE_PHONE_OFFLINE_SECS", "0");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn thresholds_resolve_per_channel() {
        let thresholds = Thresholds::default();
        assert_eq!(
            thresholds.for_channel(Channel::Activity),
            Duration::from_secs(DEFAULT_ACTIVITY_OFFLINE_SECS)
        );
        assert_eq!(
            thresholds.for_channel(Channel::HeartRate),
            Duration::from_secs(DEFAULT_HEARTRATE_OFFLINE_SECS)
        );
        assert_eq!(
            thresholds.for_channel(Channel::PhoneStatus),
            Duration::from_secs(DEFAULT_PHONE_OFFLINE_SECS)
        );
    }
}
