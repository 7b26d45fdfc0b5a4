//! Liveness probing for an established connection
//!
//! The monitor owns a ticker task and a table of unanswered probes. The
//! ticker never touches connection state: it only posts a tick, tagged with
//! the epoch it was started for, onto the connection manager's command
//! channel. The manager then calls [`HealthMonitor::on_tick`] and acts on the
//! returned [`HealthAction`].
//!
//! A probe that stays unanswered for the grace window marks the connection
//! as silently dead, even if the transport still reports it as open.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::envelope::Envelope;

/// What the manager should do for one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAction {
    /// Transmit this probe.
    Probe(Envelope),
    /// The oldest probe went unanswered for `waited`; tear the connection down.
    Expired {
        /// How long the probe has been outstanding
        waited: Duration,
    },
}

/// Periodic probe scheduling and round-trip bookkeeping.
#[derive(Debug)]
pub struct HealthMonitor {
    interval: Duration,
    grace: Duration,
    pending: VecDeque<(String, Instant)>,
    ticker: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Create a monitor; `grace` defaults to twice the interval.
    pub fn new(interval: Duration, grace: Option<Duration>) -> Self {
        Self {
            interval,
            grace: grace.unwrap_or(interval * 2),
            pending: VecDeque::new(),
            ticker: None,
        }
    }

    /// Probe interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Grace window for an unanswered probe
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Whether a ticker is running
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Number of probes awaiting an echo
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Start ticking. `post` is awaited once per interval, first after one
    /// full interval; the ticker exits when it returns `false`. Any previous
    /// ticker is stopped first.
    pub fn start<F, Fut>(&mut self, mut post: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.stop();
        let period = self.interval;
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !post().await {
                    break;
                }
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "Health monitor started");
    }

    /// Stop ticking and forget outstanding probes. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            debug!("Health monitor stopped");
        }
        self.pending.clear();
    }

    /// Decide what one tick means: either a fresh probe, or expiry of the
    /// oldest unanswered one.
    pub fn on_tick(&mut self) -> HealthAction {
        if let Some((_, sent_at)) = self.pending.front() {
            let waited = sent_at.elapsed();
            if waited >= self.grace {
                return HealthAction::Expired { waited };
            }
        }

        let probe = Envelope::health_check();
        self.pending.push_back((probe.id.clone(), Instant::now()));
        trace!(id = %probe.id, "Health probe issued");
        HealthAction::Probe(probe)
    }

    /// Match an echo against outstanding probes and return the round trip.
    ///
    /// Probes older than the echoed one are considered answered as well.
    pub fn on_echo(&mut self, echo: &Envelope) -> Option<Duration> {
        let position = self.pending.iter().position(|(id, _)| *id == echo.id)?;
        let (_, sent_at) = self.pending.drain(..=position).last()?;
        Some(sent_at.elapsed())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
