//! WebSocket links.
//!
//! Text and binary messages both carry payloads. Ping and pong frames are
//! reported as heartbeats; tungstenite answers incoming pings on its own.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, future};
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION},
    protocol::WebSocketConfig,
};
use tracing::{debug, info};

use super::{Connector, Frame, Link};
use crate::config::{ClientConfig, Credentials};
use crate::error::{ConnectError, LinkError};

/// Connector for WebSocket sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn open(&self, config: &ClientConfig) -> Result<Link, ConnectError> {
        let url = config.websocket_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::InvalidConfig(format!("{url}: {e}")))?;
        if let Some(value) = authorization(&config.credentials)? {
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_payload_bytes);
        ws_config.max_frame_size = Some(config.max_payload_bytes);

        let (ws_stream, response) =
            tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false)
                .await
                .map_err(map_handshake_error)?;
        debug!(%url, status = %response.status(), "WebSocket handshake complete");
        info!(%url, "WebSocket link connected");

        let (write, read) = ws_stream.split();
        let sink = write
            .sink_map_err(LinkError::from)
            .with(|frame: Frame| future::ready(Ok::<_, LinkError>(to_message(frame))));
        let stream = read.filter_map(|msg| future::ready(from_message(msg)));

        Ok(Link {
            source_id: config.channel_id(),
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn authorization(credentials: &Credentials) -> Result<Option<HeaderValue>, ConnectError> {
    let value = match credentials {
        Credentials::None => return Ok(None),
        Credentials::Token { token } => format!("Bearer {token}"),
        Credentials::Basic { username, password } => {
            format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
        }
    };
    HeaderValue::from_str(&value)
        .map(Some)
        .map_err(|_| ConnectError::InvalidConfig("credentials contain invalid characters".into()))
}

fn map_handshake_error(e: tungstenite::Error) -> ConnectError {
    match e {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                ConnectError::AuthFailed(format!("server answered {status}"))
            } else {
                ConnectError::Unreachable(format!("server answered {status}"))
            }
        }
        tungstenite::Error::Url(e) => ConnectError::InvalidConfig(e.to_string()),
        other => ConnectError::Unreachable(other.to_string()),
    }
}

fn to_message(frame: Frame) -> tungstenite::Message {
    match frame {
        Frame::Data(data) => match std::str::from_utf8(&data) {
            Ok(text) => tungstenite::Message::Text(text.to_owned().into()),
            Err(_) => tungstenite::Message::Binary(data),
        },
        Frame::Heartbeat => tungstenite::Message::Ping(Bytes::new()),
    }
}

fn from_message(
    msg: Result<tungstenite::Message, tungstenite::Error>,
) -> Option<Result<Frame, LinkError>> {
    match msg {
        Ok(tungstenite::Message::Text(text)) => {
            Some(Ok(Frame::Data(Bytes::copy_from_slice(text.as_bytes()))))
        }
        Ok(tungstenite::Message::Binary(data)) => Some(Ok(Frame::Data(data))),
        Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_)) => {
            Some(Ok(Frame::Heartbeat))
        }
        Ok(tungstenite::Message::Close(frame)) => {
            debug!(?frame, "received close frame");
            None
        }
        Ok(tungstenite::Message::Frame(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}
