//! Newline-delimited TCP links.
//!
//! Each line is one payload; `\r\n` endings are accepted. A blank line is a
//! heartbeat in both directions. This also covers serial devices exposed
//! through a TCP bridge.
//!
//! When credentials are configured the client sends `AUTH <secret>` as its
//! first line and waits for an `OK` line before the link is handed out.

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info};

use telelink_protocol::constants::{TCP_AUTH_OK, TCP_AUTH_TIMEOUT};

use super::{Connector, Frame, Link};
use crate::config::{ClientConfig, Credentials};
use crate::error::{ConnectError, LinkError};

/// Line framing for [`Frame`]s.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
}

impl LineCodec {
    /// Creates a codec rejecting lines longer than `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, LinkError> {
        let Some(pos) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > self.max_length {
                return Err(LinkError::FrameTooLong {
                    limit: self.max_length,
                });
            }
            return Ok(None);
        };

        let mut line = src.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.len() > self.max_length {
            return Err(LinkError::FrameTooLong {
                limit: self.max_length,
            });
        }
        if line.is_empty() {
            return Ok(Some(Frame::Heartbeat));
        }
        Ok(Some(Frame::Data(line.freeze())))
    }
}

impl Encoder<Frame> for LineCodec {
    type Error = LinkError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), LinkError> {
        if let Frame::Data(data) = frame {
            if data.contains(&b'\n') {
                return Err(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "payload contains a line break",
                )));
            }
            dst.reserve(data.len() + 1);
            dst.put_slice(&data);
        }
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Connector for newline-delimited TCP sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    async fn open(&self, config: &ClientConfig) -> Result<Link, ConnectError> {
        let addr = config.address();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ConnectError::Unreachable(format!("{addr}: {e}")))?;
        // Telemetry lines are small; do not hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, error = %e, "failed to set TCP_NODELAY");
        }

        let mut framed = Framed::new(stream, LineCodec::new(config.max_payload_bytes));

        if let Some(secret) = auth_secret(&config.credentials) {
            authenticate(&mut framed, &secret).await?;
            debug!(%addr, "TCP link authenticated");
        }

        info!(%addr, "TCP link connected");
        let (sink, stream) = framed.split();
        Ok(Link {
            source_id: config.channel_id(),
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn auth_secret(credentials: &Credentials) -> Option<String> {
    match credentials {
        Credentials::None => None,
        Credentials::Token { token } => Some(token.clone()),
        Credentials::Basic { username, password } => Some(format!("{username}:{password}")),
    }
}

async fn authenticate(
    framed: &mut Framed<TcpStream, LineCodec>,
    secret: &str,
) -> Result<(), ConnectError> {
    let line = Bytes::from(format!("AUTH {secret}"));
    framed
        .send(Frame::Data(line))
        .await
        .map_err(|e| ConnectError::Unreachable(e.to_string()))?;

    let reply = tokio::time::timeout(TCP_AUTH_TIMEOUT, async {
        loop {
            match framed.next().await {
                Some(Ok(Frame::Heartbeat)) => continue,
                other => return other,
            }
        }
    })
    .await
    .map_err(|_| ConnectError::Timeout)?;

    match reply {
        Some(Ok(Frame::Data(line))) if line.as_ref() == TCP_AUTH_OK.as_bytes() => Ok(()),
        Some(Ok(Frame::Data(line))) => Err(ConnectError::AuthFailed(
            String::from_utf8_lossy(&line).into_owned(),
        )),
        Some(Ok(Frame::Heartbeat)) => Err(ConnectError::AuthFailed("no reply".into())),
        Some(Err(e)) => Err(ConnectError::Unreachable(e.to_string())),
        None => Err(ConnectError::AuthFailed(
            "connection closed during authentication".into(),
        )),
    }
}
