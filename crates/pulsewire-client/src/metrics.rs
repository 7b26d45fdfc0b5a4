//! Connection metrics
//!
//! The connection manager is the only writer. Callers receive cloned
//! snapshots through `ConnectionManager::metrics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::collections::VecDeque;
use std::time::Duration;

use crate::circuit_breaker::CircuitState;
use crate::manager::ConnectionState;

/// Ring buffer of recent round-trip times.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyTracker {
    #[serde_as(as = "VecDeque<DurationMilliSeconds<u64>>")]
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl LatencyTracker {
    /// Create a tracker keeping the last `max_samples` samples
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples.min(1024)),
            max_samples,
        }
    }

    /// Record a round-trip time, dropping the oldest sample when full
    pub fn record(&mut self, latency: Duration) {
        if self.max_samples == 0 {
            return;
        }
        while self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    /// Mean of the retained samples
    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    /// Nearest-rank percentile (`p` in `0.0..=1.0`) of the retained samples
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = (p.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }

    /// Most recent sample
    pub fn last(&self) -> Option<Duration> {
        self.samples.back().copied()
    }

    /// Retained samples, oldest first
    pub fn samples(&self) -> impl Iterator<Item = Duration> + '_ {
        self.samples.iter().copied()
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples have been recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One entry of the recent-error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
    /// Rendered error
    pub message: String,
}

/// Snapshot of connection health and traffic counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    /// Set while connected; `None` otherwise
    pub connected_at: Option<DateTime<Utc>>,
    /// Frames written to the transport
    pub messages_sent: u64,
    /// Frames read from the transport
    pub messages_received: u64,
    /// Reconnection attempts since the last confirmed connection
    pub reconnect_attempts: u32,
    /// Recent health-check round trips
    pub latency_samples: LatencyTracker,
    /// Most recent errors, oldest first
    pub recent_errors: VecDeque<ErrorRecord>,
    /// Messages currently waiting in the outbound queue
    pub messages_queued: usize,
    /// Messages dropped from the queue for capacity or age
    pub messages_evicted: u64,
    /// Inbound frames dropped as malformed or unhandled
    pub messages_dropped_protocol: u64,
    /// Health probes sent
    pub health_checks_sent: u64,
    /// Probes that went unanswered past the grace window
    pub health_check_failures: u64,
    /// Connection state at the time of the snapshot
    pub connection_state: ConnectionState,
    /// Circuit breaker state at the time of the snapshot
    pub circuit_state: CircuitState,
    max_recent_errors: usize,
}

impl ConnectionMetrics {
    /// Empty metrics with the given buffer limits
    pub fn new(max_latency_samples: usize, max_recent_errors: usize) -> Self {
        Self {
            connected_at: None,
            messages_sent: 0,
            messages_received: 0,
            reconnect_attempts: 0,
            latency_samples: LatencyTracker::new(max_latency_samples),
            recent_errors: VecDeque::new(),
            messages_queued: 0,
            messages_evicted: 0,
            messages_dropped_protocol: 0,
            health_checks_sent: 0,
            health_check_failures: 0,
            connection_state: ConnectionState::Disconnected,
            circuit_state: CircuitState::Closed,
            max_recent_errors,
        }
    }

    /// Append to the recent-error log, dropping the oldest entry when full
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.max_recent_errors == 0 {
            return;
        }
        while self.recent_errors.len() >= self.max_recent_errors {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(ErrorRecord {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Mean health-check round trip
    pub fn average_latency(&self) -> Option<Duration> {
        self.latency_samples.average()
    }

    /// 95th percentile health-check round trip
    pub fn p95_latency(&self) -> Option<Duration> {
        self.latency_samples.percentile(0.95)
    }

    /// Time since the current connection was established
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at
            .and_then(|at| (Utc::now() - at).to_std().ok())
    }
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new(100, 50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_latency_ring_buffer_capped() {
        let mut tracker = LatencyTracker::new(3);
        for n in 1..=5 {
            tracker.record(ms(n));
        }
        assert_eq!(tracker.samples().collect::<Vec<_>>(), vec![ms(3), ms(4), ms(5)]);
        assert_eq!(tracker.average(), Some(ms(4)));
        assert_eq!(tracker.last(), Some(ms(5)));
    }

    #[test]
    fn test_percentile() {
        let mut tracker = LatencyTracker::new(100);
        for n in 1..=100 {
            tracker.record(ms(n));
        }
        assert_eq!(tracker.percentile(0.95), Some(ms(95)));
        assert_eq!(tracker.percentile(0.5), Some(ms(50)));
        assert_eq!(tracker.percentile(1.0), Some(ms(100)));
        assert_eq!(LatencyTracker::new(10).percentile(0.95), None);
    }

    #[test]
    fn test_recent_errors_bounded() {
        let mut metrics = ConnectionMetrics::new(10, 2);
        metrics.record_error("first");
        metrics.record_error("second");
        metrics.record_error("third");
        let messages: Vec<_> = metrics
            .recent_errors
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn test_uptime_only_when_connected() {
        let mut metrics = ConnectionMetrics::default();
        assert_eq!(metrics.uptime(), None);
        metrics.connected_at = Some(Utc::now() - chrono::Duration::seconds(5));
        assert!(metrics.uptime().unwrap() >= Duration::from_secs(5));
    }

    #[test]
    fn test_snapshot_serializes_latency_as_millis() {
        let mut metrics = ConnectionMetrics::default();
        metrics.latency_samples.record(ms(12));
        let value = serde_json::to_value(&metrics).unwrap();
        assert_eq!(value["latency_samples"]["samples"], serde_json::json!([12]));
        assert_eq!(value["connection_state"], "disconnected");
        assert_eq!(value["circuit_state"], "closed");
    }
}
