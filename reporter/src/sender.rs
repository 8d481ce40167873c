//! HTTP sender for the Presence reporter.
//!
//! Posts one report at a time to the server's ingestion endpoints with:
//!
//! - Connection pooling via reqwest
//! - Exponential backoff retry on 5xx and transport errors (1s -> 60s max,
//!   +/-25% jitter)
//! - No retry on 4xx: the server considered the request itself wrong, so
//!   resending the same bytes cannot help
//!
//! # Example
//!
//! ```no_run
//! use presence_reporter::sender::{Sender, SenderConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SenderConfig::with_defaults(
//!         "https://presence.example.com".to_string(),
//!         "s3cret".to_string(),
//!     );
//!     let mut sender = Sender::new(config);
//!
//!     let payload = json!({"rate": 72, "source": "watch"});
//!     sender.post_report("/api/heartrate", &payload).await.unwrap();
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Header carrying the shared credential.
const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";

/// Initial retry delay.
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Maximum retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Jitter factor (+/-25%).
const JITTER_FACTOR: f64 = 0.25;

/// Default maximum number of attempts for one report.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while sending a report.
#[derive(Error, Debug)]
pub enum SenderError {
    /// Transport-level failure on the final attempt.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication failed (401). Not retried.
    #[error("authentication failed: check PRESENCE_SECRET_TOKEN")]
    AuthFailed,

    /// The server rejected the report (other 4xx). Not retried.
    #[error("report rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// Every attempt failed with a retryable error.
    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

/// Configuration for the sender.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Server base URL (e.g., `https://presence.example.com`).
    pub server_url: String,

    /// Shared credential presented with every report.
    pub token: String,

    /// Maximum attempts per report, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry. Doubles per attempt up to
    /// [`MAX_RETRY_DELAY`].
    pub initial_retry_delay: Duration,
}

impl SenderConfig {
    /// Creates a configuration with default retry behavior.
    #[must_use]
    pub fn with_defaults(server_url: String, token: String) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            token,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_retry_delay: INITIAL_RETRY_DELAY,
        }
    }
}

/// HTTP report sender with bounded retry.
pub struct Sender {
    config: SenderConfig,
    client: Client,
    current_retry_delay: Duration,
}

impl Sender {
    /// Creates a new sender with the given configuration.
    #[must_use]
    pub fn new(config: SenderConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            current_retry_delay: config.initial_retry_delay,
            config,
            client,
        }
    }

    /// Posts one report to an ingestion endpoint.
    ///
    /// Retries on 5xx responses and transport errors with exponential
    /// backoff; returns immediately on 2xx and on 4xx (the server has made
    /// up its mind about this payload).
    pub async fn post_report<T: Serialize>(
        &mut self,
        endpoint: &str,
        payload: &T,
    ) -> Result<(), SenderError> {
        let url = format!("{}{endpoint}", self.config.server_url);
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            let result = self
                .client
                .post(&url)
                .header(HEADER_AUTH_TOKEN, &self.config.token)
                .json(payload)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        if attempt > 1 {
                            info!(attempt, "Report accepted after retry");
                        }
                        self.current_retry_delay = self.config.initial_retry_delay;
                        return Ok(());
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        return Err(SenderError::AuthFailed);
                    }

                    let message = response.text().await.unwrap_or_default();

                    if status.is_client_error() {
                        return Err(SenderError::Rejected {
                            status: status.as_u16(),
                            message,
                        });
                    }

                    // 5xx: the server told us it is safe to retry.
                    last_error = format!("{status}: {message}");
                    warn!(attempt, status = %status, "Server error, will retry");
                }
                Err(err) => {
                    if attempt == self.config.max_attempts {
                        return Err(SenderError::Http(err));
                    }
                    last_error = err.to_string();
                    warn!(attempt, error = %err, "Request failed, will retry");
                }
            }

            if attempt < self.config.max_attempts {
                let delay = self.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                sleep(delay).await;
            }
        }

        Err(SenderError::MaxRetriesExceeded {
            attempts: self.config.max_attempts,
            last_error,
        })
    }

    /// Returns the jittered delay for the next retry and doubles the base.
    fn next_delay(&mut self) -> Duration {
        let base = self.current_retry_delay.as_secs_f64();
        let jitter = rand::rng().random_range(-JITTER_FACTOR..=JITTER_FACTOR);
        let delay = Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0));

        self.current_retry_delay = (self.current_retry_delay * 2).min(MAX_RETRY_DELAY);
        delay
    }
}
