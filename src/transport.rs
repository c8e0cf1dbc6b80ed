//! The transport contract the session core relies on, plus the timing
//! utilities layered on top of it: heartbeat jitter, reconnect backoff, and
//! bootstrap-stall detection.
//!
//! The actual message channel (and the anonymity-network tunnel beneath
//! it) lives outside this crate; [`Transport`] is the narrow interface the
//! core needs to drive it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;

use crate::core::constants::{
    BUFFER_PURGE_INTERVAL, HEARTBEAT_JITTER_FRACTION, RECONNECT_BACKOFF_BASE,
    RECONNECT_BACKOFF_JITTER, RECONNECT_BACKOFF_MAX, RECONNECT_MAX_ATTEMPTS, REKEY_CHECK_INTERVAL,
};
#[cfg(all(feature = "crypto", feature = "wire"))]
use crate::session::{HeartbeatConfig, Session};

/// Periodic rekey maintenance a role wrapper plugs into
/// [`run_session_worker`]. `Host` is the only real implementor — only the
/// host originates rekey rounds and tracks per-client confirm deadlines; a
/// client has nothing to drive here and passes `None`.
#[cfg(all(feature = "crypto", feature = "wire"))]
pub trait RekeyDriver: Send + Sync {
    /// Evaluate the configured rekey policy and, if a round is due, start
    /// one and send each resulting `REKEY_DIRECT` out over `transport`.
    fn poll_rekey(&self, transport: &dyn Transport);
    /// Drop pending per-client rekey confirmations that have outlived their
    /// deadline.
    fn sweep_pending_rekeys(&self);
}

/// The full-duplex message channel the session core sends sealed frames
/// and control messages over.
///
/// Implementations own the anonymity-network tunnel and relay connection;
/// the core only needs to push bytes out and be told when bytes (or a
/// disconnect) arrive.
pub trait Transport: Send + Sync {
    /// Send a UTF-8 control message (a serialized [`crate::wire`] type).
    fn send_text(&self, text: &str) -> Result<(), std::io::Error>;

    /// Send raw bytes (an unusual path; most traffic goes out as the
    /// base64-in-JSON `MESSAGE`/`BROADCAST`/`REKEY_DIRECT` wire types).
    fn send_binary(&self, bytes: &[u8]) -> Result<(), std::io::Error>;

    /// Tear down the connection.
    fn disconnect(&self);
}

/// Exponential reconnect backoff with jitter, doubling from a base delay up
/// to a cap, giving up after a maximum number of attempts.
///
/// Mirrors the doubling-and-clamp shape of an RTO backoff, without the RTT
/// estimation this protocol has no use for (there is no retransmission
/// here, only "try the next connection attempt").
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    attempt: u32,
    current: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectBackoff {
    /// Start a fresh backoff sequence.
    pub fn new() -> Self {
        Self {
            attempt: 0,
            current: RECONNECT_BACKOFF_BASE,
        }
    }

    /// Compute the next delay, or `None` once [`RECONNECT_MAX_ATTEMPTS`] has
    /// been exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= RECONNECT_MAX_ATTEMPTS {
            return None;
        }
        let base = if self.attempt == 0 {
            self.current
        } else {
            (self.current * 2).min(RECONNECT_BACKOFF_MAX)
        };
        self.current = base;
        self.attempt += 1;

        let jitter_ms = rand::rngs::OsRng.gen_range(0..=RECONNECT_BACKOFF_JITTER.as_millis() as u64);
        Some(base + Duration::from_millis(jitter_ms))
    }

    /// Reset after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = RECONNECT_BACKOFF_BASE;
    }

    /// Number of attempts made so far in the current sequence.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Apply `+/- fraction` jitter to a base interval, for heartbeat scheduling.
pub fn jittered_interval(base: Duration, fraction: f64) -> Duration {
    let base_ms = base.as_millis() as f64;
    let jitter_ms = base_ms * fraction;
    let delta = rand::rngs::OsRng.gen_range(-jitter_ms..=jitter_ms);
    Duration::from_millis((base_ms + delta).max(0.0) as u64)
}

/// Apply the default heartbeat jitter fraction.
pub fn jittered_heartbeat_interval(base: Duration) -> Duration {
    jittered_interval(base, HEARTBEAT_JITTER_FRACTION)
}

/// Tracks whether the anonymity-network tunnel bootstrap is still making
/// progress, so a stalled bootstrap can be treated as fatal after a
/// configured timeout.
#[derive(Debug, Clone)]
pub struct BootstrapStallDetector {
    last_progress: Instant,
    stall_timeout: Duration,
}

impl BootstrapStallDetector {
    /// Start tracking progress as of now.
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            last_progress: Instant::now(),
            stall_timeout,
        }
    }

    /// Record a progress update from the tunnel.
    pub fn on_progress(&mut self) {
        self.last_progress = Instant::now();
    }

    /// True once the stall timeout has elapsed with no progress.
    pub fn is_stalled(&self) -> bool {
        self.last_progress.elapsed() > self.stall_timeout
    }
}

/// Validate that a server/relay URL's host is on the anonymity network.
///
/// In `strict` mode, a non-`.onion` host is a programmer error — connecting
/// a security-sensitive session to a clearnet relay can deanonymize the
/// user, so this function aborts the process rather than returning an
/// error the caller might accidentally ignore. Outside strict mode it
/// returns `false` and leaves the decision to the caller.
pub fn validate_onion_host(host: &str, strict: bool) -> bool {
    let is_onion = host.ends_with(".onion");
    if !is_onion && strict {
        eprintln!(
            "fatal: refusing to connect to non-onion host {host:?} in strict-anonymity mode"
        );
        std::process::abort();
    }
    is_onion
}

/// Background task driving a session's timer-based upkeep: jittered
/// heartbeats over `transport`, periodic expiry of the volatile message
/// buffer, and (when `rekey_driver` is given) periodic rekey-policy checks
/// and pending-confirm expiry. Runs until `transport.send_text` fails, at
/// which point the caller's reconnect logic (driven separately, with
/// [`ReconnectBackoff`]) takes over.
#[cfg(all(feature = "crypto", feature = "wire"))]
pub async fn run_session_worker(
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    heartbeat: HeartbeatConfig,
    rekey_driver: Option<Arc<dyn RekeyDriver>>,
) {
    let mut next_heartbeat = jittered_heartbeat_interval(heartbeat.interval);
    let mut heartbeat_due = tokio::time::Instant::now() + next_heartbeat;
    let mut purge_interval = tokio::time::interval(BUFFER_PURGE_INTERVAL);
    let mut rekey_interval = tokio::time::interval(REKEY_CHECK_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(heartbeat_due) => {
                if let Err(err) = transport.send_text("") {
                    debug!(error = %err, "heartbeat send failed, worker exiting");
                    return;
                }
                next_heartbeat = jittered_heartbeat_interval(heartbeat.interval);
                heartbeat_due = tokio::time::Instant::now() + next_heartbeat;
            }
            _ = purge_interval.tick() => {
                session.purge_expired_messages();
            }
            _ = rekey_interval.tick(), if rekey_driver.is_some() => {
                if let Some(driver) = &rekey_driver {
                    driver.poll_rekey(transport.as_ref());
                    driver.sweep_pending_rekeys();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::new();
        let mut previous = Duration::ZERO;
        for _ in 0..RECONNECT_MAX_ATTEMPTS {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= previous || previous == Duration::ZERO);
            previous = delay.saturating_sub(RECONNECT_BACKOFF_JITTER);
        }
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn backoff_resets() {
        let mut backoff = ReconnectBackoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
    }

    #[test]
    fn bootstrap_stall_detector_flags_after_timeout() {
        let detector = BootstrapStallDetector::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(detector.is_stalled());
    }

    #[test]
    fn bootstrap_stall_detector_resets_on_progress() {
        let mut detector = BootstrapStallDetector::new(Duration::from_secs(60));
        detector.on_progress();
        assert!(!detector.is_stalled());
    }

    #[test]
    fn onion_validator_accepts_onion_non_strict() {
        assert!(validate_onion_host("abc123.onion", false));
        assert!(!validate_onion_host("example.com", false));
    }
}
