use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Webhook and admin listeners cannot share {0}")]
    ListenerConflict(String),

    #[error("Webhook path must start with '/': {0}")]
    InvalidWebhookPath(String),

    #[error("Webhook body limit cannot be 0")]
    EmptyBodyLimit,

    #[error("Outbound request timeout cannot be 0")]
    ZeroRequestTimeout,
}

/// Correlator configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener receiving callback deliveries from the remote service
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub retrieval: RetryPolicy,
}

impl Config {
    /// Validates the correlator configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        self.webhook.validate()?;

        if self.outbound.request_timeout_secs == 0 {
            return Err(ValidationError::ZeroRequestTimeout);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Inbound callback route
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    /// Path the remote service posts callback values to
    pub path: String,
    /// Largest callback body accepted, in bytes
    pub max_body_bytes: usize,
}

impl WebhookConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidWebhookPath(self.path.clone()));
        }
        if self.max_body_bytes == 0 {
            return Err(ValidationError::EmptyBodyLimit);
        }
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            path: "/zapier/callback".into(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Outbound requests to the remote automation service
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutboundConfig {
    /// Applies to the whole request/response cycle, not to the callback wait
    pub request_timeout_secs: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        OutboundConfig {
            request_timeout_secs: 30,
        }
    }
}

/// How long a correlated dispatch waits for its callback value.
///
/// One lookup is made immediately, followed by up to `max_retries` further
/// lookups spaced `retry_interval_ms` apart. With `wake_on_delivery` a waiting
/// retrieval also looks again as soon as a value is delivered for its id, so a
/// callback is picked up without waiting for the next scheduled lookup.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_interval_ms: u64,
    pub wake_on_delivery: bool,
}

impl RetryPolicy {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            retry_interval_ms: 1000,
            wake_on_delivery: true,
        }
    }
}
