//! Error types for the telemetry client.

use tokio_tungstenite::tungstenite;

/// Errors from establishing a connection.
///
/// Carries only owned strings so it can be recorded as the last error and
/// reported through state changes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("connection attempt timed out")]
    Timeout,

    #[error("giving up after {attempts} attempts: {last_error}")]
    GivingUp { attempts: u32, last_error: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("connection attempt cancelled")]
    Cancelled,
}

impl ConnectError {
    /// Whether another attempt may succeed without a configuration change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }
}

impl From<crate::config::ConfigError> for ConnectError {
    fn from(e: crate::config::ConfigError) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}

/// Errors from sending an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,

    #[error("outbound queue is full")]
    TransportFull,
}

/// Failures of an established link. Any of these ends the link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds {limit} bytes")]
    FrameTooLong { limit: usize },

    #[error("link closed")]
    Closed,
}
