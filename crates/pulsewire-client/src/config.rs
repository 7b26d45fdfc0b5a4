//! Client configuration management

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::path::PathBuf;
use std::time::Duration;

use pulsewire_transport_traits::{ConnectRequest, TimeoutConfig};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ClientError;
use crate::queue::EvictionPolicy;
use crate::reconnect::ReconnectionPolicy;

/// Everything the connection manager can be tuned with.
///
/// Durations are written as integer milliseconds in configuration files.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint URL (`ws`, `wss`, `http` or `https`)
    pub url: String,
    /// Reconnection budget; `None` is unbounded, `Some(0)` disables retries
    pub reconnect_attempts: Option<u32>,
    /// Health probe interval
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub ping_interval: Duration,
    /// How long a probe may go unanswered; defaults to twice `ping_interval`
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub health_grace: Option<Duration>,
    /// First reconnection delay
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub base_delay: Duration,
    /// Largest reconnection delay
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_delay: Duration,
    /// Backoff jitter factor in `[0, 1)`
    pub jitter: f64,
    /// Outbound queue capacity
    pub queue_capacity: usize,
    /// Drop queued messages older than this
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub queue_max_age: Option<Duration>,
    /// Which message gives way when the queue is full
    pub eviction: EvictionPolicy,
    /// Consecutive failures that open the circuit
    pub circuit_breaker_threshold: u32,
    /// How long the circuit stays open
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub circuit_breaker_cooldown: Duration,
    /// Upper bound on one handshake
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub handshake_timeout: Duration,
    /// Upper bound on waiting for the transport's write buffer
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub send_timeout: Duration,
    /// Require an encrypted connection
    pub ssl: bool,
    /// Length of the recent-error log
    pub max_recent_errors: usize,
    /// Number of latency samples retained
    pub max_latency_samples: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_attempts: Some(5),
            ping_interval: Duration::from_secs(30),
            health_grace: None,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.2,
            queue_capacity: 1000,
            queue_max_age: None,
            eviction: EvictionPolicy::DropOldest,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            ssl: false,
            max_recent_errors: 50,
            max_latency_samples: 100,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Values that parse but cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl ClientConfig {
    /// Default configuration for `url`
    pub fn client(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// Environment variables with the `PULSEWIRE_` prefix override file
    /// settings, e.g. `PULSEWIRE_QUEUE_CAPACITY=50`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use pulsewire_client::ClientConfig;
    ///
    /// let config = ClientConfig::from_file("pulsewire.toml").expect("Failed to load config");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, has an unsupported
    /// extension, does not parse, or fails [`ClientConfig::validate`].
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, "PULSEWIRE")
    }

    /// Load configuration from a file with custom environment prefix
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let settings = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.ping_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "ping_interval must be greater than zero".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::Invalid(format!(
                "base_delay ({:?}) exceeds max_delay ({:?})",
                self.base_delay, self.max_delay
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the reconnection budget
    #[must_use]
    pub fn with_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Set the health probe interval
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the probe grace window
    #[must_use]
    pub fn with_health_grace(mut self, grace: Duration) -> Self {
        self.health_grace = Some(grace);
        self
    }

    /// Set base and maximum reconnection delays
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff jitter factor
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the outbound queue capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Drop queued messages older than `max_age`
    #[must_use]
    pub fn with_queue_max_age(mut self, max_age: Duration) -> Self {
        self.queue_max_age = Some(max_age);
        self
    }

    /// Set the queue eviction policy
    #[must_use]
    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Set the circuit breaker threshold and cool-down
    #[must_use]
    pub fn with_circuit_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.circuit_breaker_threshold = threshold;
        self.circuit_breaker_cooldown = cooldown;
        self
    }

    /// Set the handshake timeout
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the send timeout
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Require TLS
    #[must_use]
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub(crate) fn reconnection_policy(&self) -> ReconnectionPolicy {
        ReconnectionPolicy {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
            max_attempts: self.reconnect_attempts,
        }
    }

    pub(crate) fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_threshold,
            cooldown: self.circuit_breaker_cooldown,
        }
    }

    pub(crate) fn connect_request(&self) -> ConnectRequest {
        ConnectRequest::new(self.url.clone())
            .with_tls(self.ssl)
            .with_timeouts(TimeoutConfig {
                handshake: self.handshake_timeout,
                send: self.send_timeout,
            })
    }
}
