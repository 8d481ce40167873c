//! Configuration module for the Presence reporter.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PRESENCE_SERVER_URL` | Yes | - | Server URL (e.g., `https://presence.example.com`) |
//! | `PRESENCE_SECRET_TOKEN` | Yes | - | Shared credential, must match the server |
//! | `PRESENCE_SOURCE` | No | hostname | Tag recorded as the report source |

use std::env;

use thiserror::Error;

/// Errors that can occur during configuration parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Configuration for the Presence reporter.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Presence server.
    pub server_url: String,

    /// Shared credential presented with every report.
    pub secret_token: String,

    /// Tag recorded as the `source` of heart-rate and phone reports.
    pub source: String,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `PRESENCE_SERVER_URL` or
    /// `PRESENCE_SECRET_TOKEN` is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = require_env("PRESENCE_SERVER_URL")?;
        let secret_token = require_env("PRESENCE_SECRET_TOKEN")?;

        let source = env::var("PRESENCE_SOURCE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_source);

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            secret_token,
            source,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Default source tag: the machine's hostname.
fn default_source() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

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

    #[test]
    #[serial]
    fn config_parses_required_vars() {
        let mut guard = EnvGuard::new();
        guard.set("PRESENCE_SERVER_URL", "https://presence.example.com/");
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");
        guard.set("PRESENCE_SOURCE", "desk");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.server_url, "https://presence.example.com");
        assert_eq!(config.secret_token, "s3cret");
        assert_eq!(config.source, "desk");
    }

    #[test]
    #[serial]
    fn config_missing_server_url() {
        let mut guard = EnvGuard::new();
        guard.remove("PRESENCE_SERVER_URL");
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");

        let result = Config::from_env();
        assert!(
            matches!(result.unwrap_err(), ConfigError::MissingEnvVar(ref v) if v == "PRESENCE_SERVER_URL")
        );
    }

    #[test]
    #[serial]
    fn config_missing_secret_token() {
        let mut guard = EnvGuard::new();
        guard.set("PRESENCE_SERVER_URL", "https://presence.example.com");
        guard.remove("PRESENCE_SECRET_TOKEN");

        let result = Config::from_env();
        assert!(
            matches!(result.unwrap_err(), ConfigError::MissingEnvVar(ref v) if v == "PRESENCE_SECRET_TOKEN")
        );
    }

    #[test]
    #[serial]
    fn config_source_defaults_to_hostname() {
        let mut guard = EnvGuard::new();
        guard.set("PRESENCE_SERVER_URL", "https://presence.example.com");
        guard.set("PRESENCE_SECRET_TOKEN", "s3cret");
        guard.remove("PRESENCE_SOURCE");

        let config = Config::from_env().expect("should parse config");
        assert!(!config.source.is_empty());
    }
}
