//! Circuit breaker guarding connection attempts
//!
//! This module provides the breaker the connection manager consults before
//! every handshake:
//! - Counts consecutive failures and trips open at a threshold
//! - Rejects attempts while open, until a cool-down elapses
//! - Allows a single trial attempt in the half-open state
//! - Re-opens with a full cool-down if the trial fails
//!
//! Time is read from `tokio::time::Instant`, so paused-clock tests can drive
//! the cool-down deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,
    /// Time spent open before a trial attempt is allowed
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Attempts allowed
    #[default]
    Closed,
    /// Attempts rejected until the cool-down elapses
    Open,
    /// One trial attempt allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Current circuit state
    pub state: CircuitState,
    /// Consecutive failures since the last success
    pub failure_count: u32,
    /// Failures recorded over the breaker's lifetime
    pub total_failures: u64,
    /// Successes recorded over the breaker's lifetime
    pub total_successes: u64,
    /// Number of closed/half-open to open transitions
    pub times_opened: u64,
    /// Time since the last failure, if any
    pub since_last_failure: Option<Duration>,
    /// Time spent in current state
    pub time_in_current_state: Duration,
}

/// Circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    total_failures: u64,
    total_successes: u64,
    times_opened: u64,
    last_failure: Option<Instant>,
    last_state_change: Instant,
    /// Set once the half-open trial has been handed out
    trial_in_flight: bool,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            total_failures: 0,
            total_successes: 0,
            times_opened: 0,
            last_failure: None,
            last_state_change: Instant::now(),
            trial_in_flight: false,
        }
    }

    /// Create a circuit breaker with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Reports whether a connection attempt may proceed, and claims the
    /// half-open trial if that is what allows it.
    pub fn permits(&mut self) -> bool {
        self.update_state();

        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen if self.trial_in_flight => false,
            CircuitState::HalfOpen => {
                self.trial_in_flight = true;
                true
            }
        }
    }

    /// Record a failed attempt or a dropped connection
    pub fn record_failure(&mut self) {
        self.update_state();
        self.total_failures += 1;
        self.last_failure = Some(Instant::now());

        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    self.trip_circuit();
                }
            }
            CircuitState::HalfOpen => {
                self.failure_count += 1;
                self.trip_circuit();
            }
            CircuitState::Open => {
                self.failure_count += 1;
            }
        }
    }

    /// Record a connection confirmed live by its first inbound frame
    pub fn record_success(&mut self) {
        self.total_successes += 1;
        self.failure_count = 0;
        self.trial_in_flight = false;
        if self.state != CircuitState::Closed {
            self.state = CircuitState::Closed;
            self.last_state_change = Instant::now();
        }
    }

    /// Give back a claimed half-open trial whose attempt was cancelled,
    /// or ended in a way that says nothing about the backend.
    pub fn abandon_trial(&mut self) {
        self.trial_in_flight = false;
    }

    /// Get current circuit state, accounting for an elapsed cool-down
    pub fn state(&self) -> CircuitState {
        if self.cooldown_elapsed() {
            CircuitState::HalfOpen
        } else {
            self.state
        }
    }

    /// Time left before an open circuit admits a trial; zero unless open.
    pub fn remaining_cooldown(&self) -> Duration {
        match self.state {
            CircuitState::Open => self
                .config
                .cooldown
                .saturating_sub(self.last_state_change.elapsed()),
            _ => Duration::ZERO,
        }
    }

    /// The breaker's configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get circuit breaker statistics
    pub fn statistics(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            failure_count: self.failure_count,
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            times_opened: self.times_opened,
            since_last_failure: self.last_failure.map(|at| at.elapsed()),
            time_in_current_state: self.last_state_change.elapsed(),
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.trial_in_flight = false;
        self.last_state_change = Instant::now();
    }

    fn cooldown_elapsed(&self) -> bool {
        self.state == CircuitState::Open
            && self.last_state_change.elapsed() >= self.config.cooldown
    }

    fn trip_circuit(&mut self) {
        self.state = CircuitState::Open;
        self.last_state_change = Instant::now();
        self.trial_in_flight = false;
        self.times_opened += 1;
    }

    fn update_state(&mut self) {
        if self.cooldown_elapsed() {
            self.state = CircuitState::HalfOpen;
            self.last_state_change = Instant::now();
            self.trial_in_flight = false;
        }
    }
}
