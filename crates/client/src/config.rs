//! Client configuration.
//!
//! Configuration is plain data, usually read from a TOML file:
//!
//! ```toml
//! transport = "tcp"
//! host = "gateway.local"
//! port = 4001
//! retry_limit = 5
//! buffer_capacity = 500
//!
//! [credentials]
//! kind = "token"
//! token = "s3cret"
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use telelink_protocol::constants::{
    DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_CAP_SECS, DEFAULT_BACKOFF_JITTER,
    DEFAULT_BUFFER_CAPACITY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_PERIOD,
    DEFAULT_RETRY_LIMIT, DEFAULT_SEND_TIMEOUT, MAX_PAYLOAD_SIZE,
};

use crate::types::ReconnectConfig;

/// Largest accepted value for any `*_seconds` field (one day).
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Wire transport used to reach the telemetry source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// `ws://host:port/path`, one payload per message.
    #[default]
    #[serde(alias = "ws")]
    WebSocket,
    /// Plain TCP, one payload per line.
    Tcp,
}

/// Credentials presented when connecting.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    #[default]
    None,
    Token {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

impl Credentials {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Token { .. } => f.debug_struct("Token").field("token", &"***").finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Full client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    /// WebSocket request path.
    #[serde(default = "default_path")]
    pub path: String,
    /// Channel id attached to events without their own `source`.
    /// Defaults to the endpoint address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_seconds: f64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_seconds: f64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: f64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: f64,
    /// Heartbeat period; `0` disables keepalive.
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: f64,
    /// Drop a link that delivers nothing for this long; `0` disables.
    #[serde(default)]
    pub idle_timeout_seconds: f64,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
    #[serde(default, skip_serializing_if = "Credentials::is_none")]
    pub credentials: Credentials,
}

fn default_path() -> String {
    "/".into()
}
fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}
fn default_backoff_base() -> f64 {
    DEFAULT_BACKOFF_BASE_SECS
}
fn default_backoff_cap() -> f64 {
    DEFAULT_BACKOFF_CAP_SECS
}
fn default_backoff_jitter() -> f64 {
    DEFAULT_BACKOFF_JITTER
}
fn default_connect_timeout() -> f64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs_f64()
}
fn default_send_timeout() -> f64 {
    DEFAULT_SEND_TIMEOUT.as_secs_f64()
}
fn default_keepalive() -> f64 {
    DEFAULT_KEEPALIVE_PERIOD.as_secs_f64()
}
fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}
fn default_max_payload() -> usize {
    MAX_PAYLOAD_SIZE
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the endpoint.
    pub fn new(transport: TransportKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
            path: default_path(),
            source_id: None,
            retry_limit: default_retry_limit(),
            backoff_base_seconds: default_backoff_base(),
            backoff_cap_seconds: default_backoff_cap(),
            backoff_jitter: default_backoff_jitter(),
            connect_timeout_seconds: default_connect_timeout(),
            send_timeout_seconds: default_send_timeout(),
            keepalive_seconds: default_keepalive(),
            idle_timeout_seconds: 0.0,
            buffer_capacity: default_buffer_capacity(),
            max_payload_bytes: default_max_payload(),
            credentials: Credentials::None,
        }
    }

    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), host = %config.host, "configuration loaded");
        Ok(config)
    }

    /// Parses and validates TOML configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if self.host.contains("://") || self.host.chars().any(char::is_whitespace) {
            return Err(invalid("host", "expected a bare host name or address"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must be between 1 and 65535"));
        }
        if self.transport == TransportKind::WebSocket && !self.path.starts_with('/') {
            return Err(invalid("path", "must start with '/'"));
        }
        if self.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity", "must be greater than zero"));
        }
        if self.max_payload_bytes == 0 {
            return Err(invalid("max_payload_bytes", "must be greater than zero"));
        }
        positive("backoff_base_seconds", self.backoff_base_seconds)?;
        positive("connect_timeout_seconds", self.connect_timeout_seconds)?;
        positive("send_timeout_seconds", self.send_timeout_seconds)?;
        non_negative("keepalive_seconds", self.keepalive_seconds)?;
        non_negative("idle_timeout_seconds", self.idle_timeout_seconds)?;
        positive("backoff_cap_seconds", self.backoff_cap_seconds)?;
        if self.backoff_cap_seconds < self.backoff_base_seconds {
            return Err(invalid(
                "backoff_cap_seconds",
                "must be at least backoff_base_seconds",
            ));
        }
        if !(0.0..1.0).contains(&self.backoff_jitter) {
            return Err(invalid("backoff_jitter", "must be in [0, 1)"));
        }
        match &self.credentials {
            Credentials::Token { token } if token.is_empty() => {
                return Err(invalid("credentials.token", "must not be empty"));
            }
            Credentials::Basic { username, .. } if username.is_empty() => {
                return Err(invalid("credentials.username", "must not be empty"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Endpoint as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket URL for this endpoint.
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }

    /// Channel id reported for events from this endpoint.
    pub fn channel_id(&self) -> String {
        if let Some(id) = &self.source_id {
            return id.clone();
        }
        match self.transport {
            TransportKind::WebSocket => self.websocket_url(),
            TransportKind::Tcp => format!("tcp://{}", self.address()),
        }
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: seconds(self.backoff_base_seconds),
            max_delay: seconds(self.backoff_cap_seconds),
            backoff_factor: 2.0,
            jitter: self.backoff_jitter,
            retry_limit: self.retry_limit,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout_seconds)
    }

    pub fn send_timeout(&self) -> Duration {
        seconds(self.send_timeout_seconds)
    }

    pub fn keepalive(&self) -> Option<Duration> {
        optional_duration(self.keepalive_seconds)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        optional_duration(self.idle_timeout_seconds)
    }
}

/// Converts seconds to a `Duration`, clamped to `[0, MAX_DURATION_SECS]`.
/// NaN maps to zero.
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_DURATION_SECS)).unwrap_or_default()
}

fn optional_duration(secs: f64) -> Option<Duration> {
    (secs > 0.0).then(|| seconds(secs))
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(field, "must be a positive number"));
    }
    at_most_a_day(field, value)
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(invalid(field, "must be zero or a positive number"));
    }
    at_most_a_day(field, value)
}

fn at_most_a_day(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > MAX_DURATION_SECS {
        return Err(invalid(field, format!("must not exceed {MAX_DURATION_SECS} seconds")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(config: &ClientConfig) -> &'static str {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn new_uses_defaults() {
        let config = ClientConfig::new(TransportKind::Tcp, "10.0.0.5", 4001);
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_limit, 10);
        assert_eq!(config.buffer_capacity, 1024);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.keepalive(), Some(Duration::from_secs(15)));
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn minimal_toml() {
        let config = ClientConfig::from_toml_str("host = \"gateway\"\nport = 8080").unwrap();
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.path, "/");
        assert!(config.credentials.is_none());
        assert_eq!(config.websocket_url(), "ws://gateway:8080/");
        assert_eq!(config.channel_id(), "ws://gateway:8080/");
    }

    #[test]
    fn full_toml() {
        let toml_str = r#"
            transport = "tcp"
            host = "ser2net.local"
            port = 4001
            source_id = "balance-bench"
            retry_limit = 3
            backoff_base_seconds = 0.5
            backoff_cap_seconds = 10.0
            buffer_capacity = 64
            idle_timeout_seconds = 90

            [credentials]
            kind = "basic"
            username = "lab"
            password = "hunter2"
        "#;
        let config = ClientConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.transport, TransportKind::Tcp);
        assert_eq!(config.channel_id(), "balance-bench");
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(
            config.credentials,
            Credentials::Basic {
                username: "lab".into(),
                password: "hunter2".into()
            }
        );
        let reconnect = config.reconnect();
        assert_eq!(reconnect.retry_limit, 3);
        assert_eq!(reconnect.initial_delay, Duration::from_millis(500));
        assert_eq!(reconnect.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn ws_alias_and_tcp_channel_id() {
        let config = ClientConfig::from_toml_str("transport = \"ws\"\nhost = \"h\"\nport = 1").unwrap();
        assert_eq!(config.transport, TransportKind::WebSocket);

        let config = ClientConfig::new(TransportKind::Tcp, "rfid", 7000);
        assert_eq!(config.channel_id(), "tcp://rfid:7000");
    }

    #[test]
    fn missing_port_is_parse_error() {
        let err = ClientConfig::from_toml_str("host = \"gateway\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_bad_values() {
        let base = ClientConfig::new(TransportKind::WebSocket, "gateway", 8080);

        let mut c = base.clone();
        c.host = " ".into();
        assert_eq!(invalid_field(&c), "host");

        let mut c = base.clone();
        c.host = "ws://gateway".into();
        assert_eq!(invalid_field(&c), "host");

        let mut c = base.clone();
        c.port = 0;
        assert_eq!(invalid_field(&c), "port");

        let mut c = base.clone();
        c.path = "events".into();
        assert_eq!(invalid_field(&c), "path");

        let mut c = base.clone();
        c.buffer_capacity = 0;
        assert_eq!(invalid_field(&c), "buffer_capacity");

        let mut c = base.clone();
        c.backoff_base_seconds = 0.0;
        assert_eq!(invalid_field(&c), "backoff_base_seconds");

        let mut c = base.clone();
        c.backoff_cap_seconds = 0.5;
        assert_eq!(invalid_field(&c), "backoff_cap_seconds");

        let mut c = base.clone();
        c.backoff_jitter = 1.0;
        assert_eq!(invalid_field(&c), "backoff_jitter");

        let mut c = base.clone();
        c.connect_timeout_seconds = f64::NAN;
        assert_eq!(invalid_field(&c), "connect_timeout_seconds");

        let mut c = base.clone();
        c.keepalive_seconds = -1.0;
        assert_eq!(invalid_field(&c), "keepalive_seconds");

        let mut c = base.clone();
        c.credentials = Credentials::Token { token: String::new() };
        assert_eq!(invalid_field(&c), "credentials.token");

        let mut c = base;
        c.credentials = Credentials::Basic {
            username: String::new(),
            password: "x".into(),
        };
        assert_eq!(invalid_field(&c), "credentials.username");
    }

    #[test]
    fn rejects_durations_longer_than_a_day() {
        let base = ClientConfig::new(TransportKind::Tcp, "gateway", 4001);

        let mut c = base.clone();
        c.connect_timeout_seconds = 1e20;
        assert_eq!(invalid_field(&c), "connect_timeout_seconds");

        let mut c = base.clone();
        c.backoff_cap_seconds = 1e20;
        assert_eq!(invalid_field(&c), "backoff_cap_seconds");

        let mut c = base.clone();
        c.idle_timeout_seconds = MAX_DURATION_SECS + 1.0;
        assert_eq!(invalid_field(&c), "idle_timeout_seconds");

        let mut c = base;
        c.send_timeout_seconds = MAX_DURATION_SECS;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn duration_helpers_never_panic_on_unvalidated_values() {
        let mut c = ClientConfig::new(TransportKind::Tcp, "gateway", 4001);
        c.connect_timeout_seconds = 1e20;
        c.backoff_cap_seconds = f64::INFINITY;
        c.backoff_base_seconds = f64::NAN;
        c.keepalive_seconds = 1e300;

        let max = Duration::from_secs_f64(MAX_DURATION_SECS);
        assert_eq!(c.connect_timeout(), max);
        assert_eq!(c.reconnect().max_delay, max);
        assert_eq!(c.reconnect().initial_delay, Duration::ZERO);
        assert_eq!(c.keepalive(), Some(max));
    }

    #[test]
    fn debug_redacts_secrets() {
        let token = Credentials::Token {
            token: "s3cret".into(),
        };
        let basic = Credentials::Basic {
            username: "lab".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{token:?}").contains("s3cret"));
        let basic_dbg = format!("{basic:?}");
        assert!(basic_dbg.contains("lab"));
        assert!(!basic_dbg.contains("hunter2"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telelink.toml");
        std::fs::write(&path, "host = \"10.1.2.3\"\nport = 9001\nbuffer_capacity = 16\n").unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.host, "10.1.2.3");
        assert_eq!(config.buffer_capacity, 16);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn load_invalid_values_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "host = \"h\"\nport = 1\nbuffer_capacity = 0\n").unwrap();
        assert!(matches!(
            ClientConfig::load(&path),
            Err(ConfigError::Invalid {
                field: "buffer_capacity",
                ..
            })
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = ClientConfig::new(TransportKind::Tcp, "h", 7);
        config.credentials = Credentials::Token { token: "t".into() };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), config);
    }
}
