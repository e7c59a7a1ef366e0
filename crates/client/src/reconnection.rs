//! Session supervision: connection attempts with exponential backoff, and
//! the per-session task that runs a link and reconnects when it drops.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use telelink_protocol::constants::WRITE_QUEUE_CAPACITY;

use crate::config::ClientConfig;
use crate::connectors::{Connector, Frame, Link};
use crate::error::ConnectError;
use crate::pumps::ping::ping_pump;
use crate::pumps::read::{LinkEnd, read_pump};
use crate::pumps::write::write_pump;
use crate::transport::Shared;
use crate::types::StateChange;

/// Everything a session needs, shared between `connect` and the session
/// task. Avoids threading the pieces through every function separately.
pub(crate) struct SessionContext<C> {
    pub(crate) connector: Arc<C>,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) shared: Arc<Shared>,
}

impl<C> Clone for SessionContext<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Opens a link, retrying transient failures with backoff.
///
/// With `dropped` unset this is an initial connect: one immediate attempt
/// plus up to `retry_limit` retries. With `dropped` set (the reason a live
/// link was lost) every attempt is a retry and waits its backoff delay first.
///
/// Terminal errors are returned as-is. Exhausting the budget returns
/// [`ConnectError::GivingUp`]. The one exception is an initial connect with a
/// zero `retry_limit`, which returns the raw error of its single attempt.
pub(crate) async fn establish<C: Connector>(
    ctx: &SessionContext<C>,
    cancel: &CancellationToken,
    dropped: Option<ConnectError>,
) -> Result<Link, ConnectError> {
    let policy = ctx.config.reconnect();
    let mut attempts: u32 = 0;
    let mut retry: u32 = 0;
    let reconnecting = dropped.is_some();
    let mut last_error = dropped;

    loop {
        if let Some(err) = last_error.take() {
            if !err.is_transient() {
                return Err(err);
            }
            if retry >= policy.retry_limit {
                if policy.retry_limit == 0 && !reconnecting {
                    return Err(err);
                }
                return Err(ConnectError::GivingUp {
                    attempts,
                    last_error: err.to_string(),
                });
            }

            retry += 1;
            let delay = policy.delay_for_attempt(retry);
            let delay_secs = delay.as_secs_f64();
            info!(
                attempt = retry,
                delay_secs = format_args!("{delay_secs:.1}"),
                error = %err,
                "retrying connection"
            );
            if !ctx.shared.transition(cancel, StateChange::retry(retry, err)) {
                return Err(ConnectError::Cancelled);
            }

            // Wait for the backoff delay (or cancellation).
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("retry cancelled during backoff");
                    return Err(ConnectError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        attempts += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            r = tokio::time::timeout(ctx.config.connect_timeout(), ctx.connector.open(&ctx.config)) => {
                r.unwrap_or(Err(ConnectError::Timeout))
            }
        };

        match result {
            Ok(link) => return Ok(link),
            Err(e) => {
                warn!(attempt = attempts, error = %e, "connection attempt failed");
                last_error = Some(e);
            }
        }
    }
}

/// Session task: runs links until the session is cancelled or gives up.
pub(crate) async fn supervise<C: Connector>(
    ctx: SessionContext<C>,
    mut link: Link,
    mut write_tx: mpsc::Sender<Frame>,
    mut write_rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) {
    loop {
        let end = run_link(&ctx, link, write_tx, write_rx, &cancel).await;
        if cancel.is_cancelled() {
            debug!("session cancelled");
            return;
        }

        let reason = drop_reason(&end);
        warn!(reason = %reason, "link dropped");
        if !ctx
            .shared
            .transition(&cancel, StateChange::retry(0, reason.clone()))
        {
            return;
        }

        match establish(&ctx, &cancel, Some(reason)).await {
            Ok(new_link) => {
                let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
                if !ctx.shared.install_writer(&cancel, tx.clone()) {
                    return;
                }
                info!(source = %new_link.source_id, "reconnected");
                link = new_link;
                write_tx = tx;
                write_rx = rx;
            }
            Err(ConnectError::Cancelled) => return,
            Err(e) => {
                warn!(error = %e, "giving up on connection");
                ctx.shared.transition(&cancel, StateChange::failed(e));
                return;
            }
        }
    }
}

/// Runs one link until it ends. Spawns the write pump (and the ping pump when
/// keepalive is on) and runs the read pump inline.
async fn run_link<C: Connector>(
    ctx: &SessionContext<C>,
    link: Link,
    write_tx: mpsc::Sender<Frame>,
    write_rx: mpsc::Receiver<Frame>,
    cancel: &CancellationToken,
) -> LinkEnd {
    let link_cancel = cancel.child_token();
    let Link {
        source_id,
        sink,
        stream,
    } = link;

    let writer = tokio::spawn(write_pump(sink, write_rx, link_cancel.clone()));
    let pinger = ctx
        .config
        .keepalive()
        .map(|period| tokio::spawn(ping_pump(write_tx, period, link_cancel.clone())));

    let shared = &ctx.shared;
    let end = read_pump(
        stream,
        ctx.config.idle_timeout(),
        |data| shared.deliver(data, &source_id),
        link_cancel.clone(),
    )
    .await;

    link_cancel.cancel();
    shared.clear_writer(cancel);
    if let Err(e) = writer.await {
        warn!(error = %e, "write pump panicked");
    }
    if let Some(pinger) = pinger
        && let Err(e) = pinger.await
    {
        warn!(error = %e, "ping pump panicked");
    }
    end
}

fn drop_reason(end: &LinkEnd) -> ConnectError {
    let detail = match end {
        LinkEnd::Closed => "closed by remote".to_string(),
        LinkEnd::Idle => "idle timeout".to_string(),
        LinkEnd::Failed(e) => e.to_string(),
        // Only the write pump cancels the link token on its own.
        LinkEnd::Cancelled => "write failed".to_string(),
    };
    ConnectError::Unreachable(format!("link lost: {detail}"))
}
