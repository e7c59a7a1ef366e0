//! Connectors open one [`Link`] to a telemetry source.
//!
//! A link is a pair of boxed halves: a stream of inbound [`Frame`]s and a
//! sink for outbound ones. The transport owns reconnection and pumping; a
//! connector only knows how to perform a single handshake.

pub mod tcp;
pub mod ws;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Sink, Stream};

use crate::config::{ClientConfig, TransportKind};
use crate::error::{ConnectError, LinkError};

pub use tcp::{LineCodec, TcpConnector};
pub use ws::WsConnector;

/// Unit of data moving over a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One complete payload.
    Data(Bytes),
    /// Liveness signal with no payload.
    Heartbeat,
}

/// Inbound half of a link.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, LinkError>> + Send>>;

/// Outbound half of a link.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = LinkError> + Send>>;

/// One established connection.
pub struct Link {
    /// Channel id reported with every payload from this link.
    pub source_id: String,
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens links for a [`Transport`](crate::transport::Transport).
pub trait Connector: Send + Sync + 'static {
    /// Performs one connection attempt, including any authentication.
    ///
    /// The caller applies the connect timeout and cancellation.
    fn open(&self, config: &ClientConfig)
    -> impl Future<Output = Result<Link, ConnectError>> + Send;
}

/// Connector chosen from [`ClientConfig::transport`] at connect time.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConnector;

impl Connector for AutoConnector {
    async fn open(&self, config: &ClientConfig) -> Result<Link, ConnectError> {
        match config.transport {
            TransportKind::WebSocket => WsConnector.open(config).await,
            TransportKind::Tcp => TcpConnector.open(config).await,
        }
    }
}
