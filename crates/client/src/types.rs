//! Public types for the telemetry client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::error::ConnectError;

/// Connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no connection attempt in progress.
    Disconnected,
    /// Handshake in progress, or waiting to retry after a failure.
    Connecting,
    /// Link established; events flow and commands can be sent.
    Connected,
    /// User-initiated shutdown in progress.
    Disconnecting,
}

/// A connection state transition reported by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub state: ConnectionState,
    /// Retry attempt this transition belongs to; `0` outside of retries.
    pub attempt: u32,
    /// Failure that caused the transition, if any.
    pub error: Option<ConnectError>,
}

impl StateChange {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            attempt: 0,
            error: None,
        }
    }

    pub(crate) fn retry(attempt: u32, error: ConnectError) -> Self {
        Self {
            state: ConnectionState::Connecting,
            attempt,
            error: Some(error),
        }
    }

    pub(crate) fn failed(error: ConnectError) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            error: Some(error),
        }
    }
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Relative jitter applied to each delay, in `[0, 1)`.
    pub jitter: f64,
    /// Retries allowed after a failure before giving up.
    pub retry_limit: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        use telelink_protocol::constants::{
            DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_CAP_SECS, DEFAULT_BACKOFF_JITTER,
            DEFAULT_RETRY_LIMIT,
        };
        Self {
            initial_delay: Duration::from_secs_f64(DEFAULT_BACKOFF_BASE_SECS),
            max_delay: Duration::from_secs_f64(DEFAULT_BACKOFF_CAP_SECS),
            backoff_factor: 2.0,
            jitter: DEFAULT_BACKOFF_JITTER,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given retry (1-based), without jitter.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before the given retry (1-based), with random jitter so that
    /// many clients dropped at once do not retry in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt).as_secs_f64();
        let offset = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64((base * (1.0 + offset)).max(0.0))
    }
}

/// Snapshot of the receive pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Payloads delivered by the transport.
    pub received: u64,
    /// Payloads decoded into events.
    pub decoded: u64,
    /// Payloads dropped because they failed to decode.
    pub malformed: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) received: AtomicU64,
    pub(crate) decoded: AtomicU64,
    pub(crate) malformed: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, handler_failures: u64) -> ClientStats {
        ClientStats {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            handler_failures,
        }
    }
}
