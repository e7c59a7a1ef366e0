//! The telemetry client: transport, codec, history and dispatch wired
//! together.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use telelink_history::EventBuffer;
use telelink_protocol::{Codec, Command, Event, JsonCodec};

use crate::config::{ClientConfig, ConfigError};
use crate::connectors::{AutoConnector, Connector};
use crate::dispatcher::{ChannelHandler, Dispatcher, Handler, HandlerId};
use crate::error::{ConnectError, SendError};
use crate::transport::Transport;
use crate::types::{ClientStats, ConnectionState, StatsCounters};

/// Receive path shared with the transport callback.
struct Pipeline<K> {
    codec: K,
    buffer: EventBuffer,
    dispatcher: Dispatcher,
    stats: StatsCounters,
}

impl<K: Codec> Pipeline<K> {
    fn receive(&self, raw: &[u8], source_id: &str) {
        StatsCounters::bump(&self.stats.received);
        match self.codec.decode(raw, source_id) {
            Ok(event) => {
                let event = Arc::new(event);
                self.buffer.append(event.clone());
                self.dispatcher.dispatch(&event);
                StatsCounters::bump(&self.stats.decoded);
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.malformed);
                warn!(source = %source_id, bytes = raw.len(), error = %e, "dropping undecodable payload");
            }
        }
    }
}

/// Client for one telemetry endpoint.
///
/// Incoming payloads are decoded, appended to a bounded history and handed
/// to every registered handler, in arrival order. Payloads that fail to
/// decode are logged, counted and dropped; they never end the connection.
pub struct Client<C: Connector = AutoConnector, K: Codec = JsonCodec> {
    config: ClientConfig,
    transport: Transport<C>,
    pipeline: Arc<Pipeline<K>>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl Client {
    /// Creates a client using the transport named in `config` and the JSON
    /// codec.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let codec = JsonCodec::with_max_payload(config.max_payload_bytes);
        Self::with_parts(config, AutoConnector, codec)
    }
}

impl<C: Connector, K: Codec> Client<C, K> {
    /// Creates a client from explicit parts.
    pub fn with_parts(config: ClientConfig, connector: C, codec: K) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.buffer_capacity).ok_or(ConfigError::Invalid {
            field: "buffer_capacity",
            reason: "must be greater than zero".into(),
        })?;

        let pipeline = Arc::new(Pipeline {
            codec,
            buffer: EventBuffer::new(capacity),
            dispatcher: Dispatcher::new(),
            stats: StatsCounters::default(),
        });
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let state = Arc::new(state);

        let transport = Transport::new(connector);
        let receiver = pipeline.clone();
        transport.on_receive(move |data: Bytes, source_id: &str| receiver.receive(&data, source_id));
        let publisher = state.clone();
        transport.on_state_change(move |change| {
            publisher.send_if_modified(|current| {
                let modified = *current != change.state;
                *current = change.state;
                modified
            });
        });

        Ok(Self {
            config,
            transport,
            pipeline,
            state,
        })
    }

    /// Connects to the configured endpoint. See [`Transport::connect`].
    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.transport.connect(self.config.clone()).await
    }

    /// Disconnects and stops reconnecting. Idempotent.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
        info!(channel = %self.config.channel_id(), "client disconnected");
    }

    /// Encodes and sends a command.
    ///
    /// Fails with [`SendError::NotConnected`] without encoding anything
    /// unless the client is connected.
    pub async fn publish(&self, command: &Command) -> Result<(), SendError> {
        if self.state() != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }
        let payload = self.pipeline.codec.encode(command);
        self.transport.send(Bytes::from(payload)).await
    }

    /// Registers a handler for every later event.
    pub fn add_handler(&self, handler: impl Handler + 'static) -> HandlerId {
        self.pipeline.dispatcher.register(handler)
    }

    /// Removes a handler. Returns `false` for unknown ids.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.pipeline.dispatcher.unregister(id)
    }

    /// Registers a [`ChannelHandler`] and returns its receiver.
    pub fn subscribe(&self, capacity: usize) -> (HandlerId, mpsc::Receiver<Event>) {
        let (handler, rx) = ChannelHandler::new(capacity);
        (self.add_handler(handler), rx)
    }

    pub fn last_event(&self) -> Option<Arc<Event>> {
        self.pipeline.buffer.last()
    }

    /// Buffered events, oldest first.
    pub fn all_events(&self) -> Vec<Arc<Event>> {
        self.pipeline.buffer.all()
    }

    pub fn event_count(&self) -> usize {
        self.pipeline.buffer.count()
    }

    /// Buffered events from one source, oldest first.
    pub fn events_from(&self, source_id: &str) -> Vec<Arc<Event>> {
        self.pipeline.buffer.from_source(source_id)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change from now on.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn last_error(&self) -> Option<ConnectError> {
        self.transport.last_error()
    }

    pub fn stats(&self) -> ClientStats {
        let stats = &self.pipeline.stats;
        stats.snapshot(self.pipeline.dispatcher.failures())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
