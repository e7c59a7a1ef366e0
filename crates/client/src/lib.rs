//! Client for streaming telemetry sources.
//!
//! Connects to a WebSocket or newline-delimited TCP endpoint, reconnects
//! with exponential backoff, decodes each payload into an event, keeps a
//! bounded history and fans events out to registered handlers.

pub mod client;
pub mod config;
pub mod connectors;
pub mod dispatcher;
pub mod error;
mod pumps;
pub(crate) mod reconnection;
pub mod transport;
pub mod types;

#[cfg(test)]
mod fake;

pub use client::Client;
pub use config::{ClientConfig, ConfigError, Credentials, TransportKind};
pub use connectors::{AutoConnector, Connector, Frame, Link, TcpConnector, WsConnector};
pub use dispatcher::{ChannelHandler, Dispatcher, Handler, HandlerError, HandlerId};
pub use error::{ConnectError, LinkError, SendError};
pub use transport::Transport;
pub use types::{ClientStats, ConnectionState, ReconnectConfig, StateChange};

pub use telelink_protocol::{Codec, Command, DecodeError, Envelope, Event, JsonCodec, Payload};
