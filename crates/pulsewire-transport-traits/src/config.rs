//! Transport configuration types.

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::time::Duration;

/// Configuration for handshake and write timeouts.
///
/// Durations are written as whole milliseconds.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Upper bound on the transport handshake (TCP + TLS + upgrade).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub handshake: Duration,

    /// Upper bound on waiting for room in the transport's write buffer.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub send: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            send: Duration::from_secs(5),
        }
    }
}
