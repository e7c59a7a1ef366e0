//! Connection lifecycle on top of a [`Connector`].
//!
//! A [`Transport`] runs at most one session at a time. A session starts with
//! [`connect`](Transport::connect), owns one background task, and survives
//! link drops by reconnecting with backoff until it is cancelled or gives up.
//!
//! Every state transition passes through one lock together with the session's
//! cancellation check, so once [`disconnect`](Transport::disconnect) returns
//! no transition from the old session can be observed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use telelink_protocol::constants::{DEFAULT_SEND_TIMEOUT, WRITE_QUEUE_CAPACITY};

use crate::config::ClientConfig;
use crate::connectors::{Connector, Frame};
use crate::error::{ConnectError, SendError};
use crate::reconnection::{SessionContext, establish, supervise};
use crate::types::{ConnectionState, StateChange};

/// Callback for inbound payloads: raw bytes plus the link's channel id.
pub type ReceiveCallback = Arc<dyn Fn(Bytes, &str) + Send + Sync>;

/// Callback for state transitions.
///
/// Runs under the transport's state lock; it must not call back into the
/// transport.
pub type StateCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;

struct Inner {
    state: ConnectionState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    writer: Option<mpsc::Sender<Frame>>,
    send_timeout: Duration,
    last_error: Option<ConnectError>,
}

/// State shared between a [`Transport`] and its session task.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    on_receive: RwLock<Option<ReceiveCallback>>,
    on_state: RwLock<Option<StateCallback>>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                cancel: None,
                task: None,
                writer: None,
                send_timeout: DEFAULT_SEND_TIMEOUT,
                last_error: None,
            }),
            on_receive: RwLock::new(None),
            on_state: RwLock::new(None),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, inner: &mut Inner, change: StateChange) {
        debug!(state = ?change.state, attempt = change.attempt, "state transition");
        inner.state = change.state;
        if let Some(e) = &change.error {
            inner.last_error = Some(e.clone());
        }
        let callback = self
            .on_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(cb) = callback {
            cb(&change);
        }
    }

    /// Applies `change` unless the session behind `cancel` was cancelled.
    pub(crate) fn transition(&self, cancel: &CancellationToken, change: StateChange) -> bool {
        let mut inner = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        self.apply(&mut inner, change);
        true
    }

    /// Makes `writer` the outbound queue and reports `Connected`.
    pub(crate) fn install_writer(
        &self,
        cancel: &CancellationToken,
        writer: mpsc::Sender<Frame>,
    ) -> bool {
        let mut inner = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        inner.writer = Some(writer);
        self.apply(&mut inner, StateChange::new(ConnectionState::Connected));
        true
    }

    /// Drops the outbound queue of a link that ended.
    pub(crate) fn clear_writer(&self, cancel: &CancellationToken) {
        let mut inner = self.lock();
        if !cancel.is_cancelled() {
            inner.writer = None;
        }
    }

    /// Hands one inbound payload to the receive callback.
    pub(crate) fn deliver(&self, data: Bytes, source_id: &str) {
        let callback = self
            .on_receive
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(cb) => cb(data, source_id),
            None => debug!(source = %source_id, "no receive callback, dropping payload"),
        }
    }
}

/// Connection lifecycle manager for a single endpoint.
pub struct Transport<C: Connector> {
    connector: Arc<C>,
    shared: Arc<Shared>,
}

impl<C: Connector> Transport<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Sets the callback for inbound payloads, replacing any previous one.
    pub fn on_receive<F>(&self, callback: F)
    where
        F: Fn(Bytes, &str) + Send + Sync + 'static,
    {
        *self
            .shared
            .on_receive
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Sets the callback for state transitions, replacing any previous one.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        *self
            .shared
            .on_state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Most recent connection failure, kept until the next one replaces it.
    pub fn last_error(&self) -> Option<ConnectError> {
        self.shared.lock().last_error.clone()
    }

    /// Opens a link to the configured endpoint and starts a session.
    ///
    /// Returns once the first link is up or the attempt budget is spent. A
    /// no-op when already connected. A session that is retrying or has given
    /// up is replaced.
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidConfig`] before any I/O, the terminal error of
    /// the last attempt, [`ConnectError::GivingUp`] once retries run out, or
    /// [`ConnectError::Cancelled`] when [`disconnect`](Self::disconnect)
    /// interrupts the attempt.
    pub async fn connect(&self, config: ClientConfig) -> Result<(), ConnectError> {
        config.validate()?;
        if self.state() == ConnectionState::Connected {
            debug!("already connected");
            return Ok(());
        }
        self.stop_session().await;

        let cancel = CancellationToken::new();
        {
            let mut inner = self.shared.lock();
            inner.cancel = Some(cancel.clone());
            inner.send_timeout = config.send_timeout();
            self.shared
                .apply(&mut inner, StateChange::new(ConnectionState::Connecting));
        }

        let session = uuid::Uuid::new_v4();
        let span = info_span!("session", %session, channel = %config.channel_id());
        let ctx = SessionContext {
            connector: self.connector.clone(),
            config: Arc::new(config),
            shared: self.shared.clone(),
        };
        info!(parent: &span, address = %ctx.config.address(), "connecting");

        let link = match establish(&ctx, &cancel, None).instrument(span.clone()).await {
            Ok(link) => link,
            Err(ConnectError::Cancelled) => return Err(ConnectError::Cancelled),
            Err(e) => {
                warn!(parent: &span, error = %e, "connect failed");
                self.shared.transition(&cancel, StateChange::failed(e.clone()));
                return Err(e);
            }
        };

        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let mut inner = self.shared.lock();
        if cancel.is_cancelled() {
            return Err(ConnectError::Cancelled);
        }
        inner.writer = Some(write_tx.clone());
        self.shared
            .apply(&mut inner, StateChange::new(ConnectionState::Connected));
        info!(parent: &span, source = %link.source_id, "connected");
        let task = supervise(ctx, link, write_tx, write_rx, cancel);
        inner.task = Some(tokio::spawn(task.instrument(span)));
        Ok(())
    }

    /// Closes the link and stops the session. Idempotent.
    ///
    /// Interrupts a pending connect or backoff sleep, and waits for the
    /// session task so no callback fires after this returns.
    pub async fn disconnect(&self) {
        let task = {
            let mut inner = self.shared.lock();
            let Some(cancel) = inner.cancel.take() else {
                debug!("disconnect: no active session");
                return;
            };
            cancel.cancel();
            inner.writer = None;
            if inner.state != ConnectionState::Disconnected {
                self.shared
                    .apply(&mut inner, StateChange::new(ConnectionState::Disconnecting));
            }
            inner.task.take()
        };

        info!("disconnecting");
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "session task panicked");
        }

        let mut inner = self.shared.lock();
        if inner.state != ConnectionState::Disconnected {
            self.shared
                .apply(&mut inner, StateChange::new(ConnectionState::Disconnected));
        }
    }

    /// Queues one outbound payload.
    ///
    /// # Errors
    ///
    /// [`SendError::NotConnected`] when no link is up, including while
    /// reconnecting. [`SendError::TransportFull`] when the outbound queue
    /// stays full for the configured send timeout.
    pub async fn send(&self, payload: Bytes) -> Result<(), SendError> {
        let (writer, timeout) = {
            let inner = self.shared.lock();
            match (&inner.writer, inner.state) {
                (Some(writer), ConnectionState::Connected) => (writer.clone(), inner.send_timeout),
                _ => return Err(SendError::NotConnected),
            }
        };

        match writer.send_timeout(Frame::Data(payload), timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "outbound queue full");
                Err(SendError::TransportFull)
            }
            Err(SendTimeoutError::Closed(_)) => Err(SendError::NotConnected),
        }
    }

    /// Cancels the current session, if any, and waits for its task.
    async fn stop_session(&self) {
        let task = {
            let mut inner = self.shared.lock();
            let Some(cancel) = inner.cancel.take() else {
                return;
            };
            cancel.cancel();
            inner.writer = None;
            inner.task.take()
        };
        debug!("replacing previous session");
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "session task panicked");
        }
    }
}

impl<C: Connector> Drop for Transport<C> {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.lock().cancel.take() {
            cancel.cancel();
        }
    }
}
