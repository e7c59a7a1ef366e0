//! Channel-backed connector for transport and client tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{sink, stream};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::ClientConfig;
use crate::connectors::{Connector, Frame, Link};
use crate::error::{ConnectError, LinkError};
use crate::types::{ConnectionState, StateChange};

/// What the next connection attempt does.
#[derive(Debug, Clone)]
pub(crate) enum FakeOutcome {
    /// Hand out a link whose far end is a [`FakeRemote`].
    Accept,
    Fail(ConnectError),
    /// Never complete.
    Hang,
}

#[derive(Default)]
struct FakeState {
    script: Mutex<VecDeque<FakeOutcome>>,
    fallback: Mutex<Option<FakeOutcome>>,
    attempts: AtomicU32,
    remotes: Mutex<VecDeque<FakeRemote>>,
    remote_ready: Notify,
}

/// Connector following a script of outcomes.
///
/// Once the script runs out every attempt gets the fallback outcome, or
/// fails as unreachable when there is none.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    state: Arc<FakeState>,
}

impl FakeConnector {
    pub(crate) fn new(outcomes: impl IntoIterator<Item = FakeOutcome>) -> Self {
        let connector = Self::default();
        connector.script(outcomes);
        connector
    }

    /// Every attempt gets `outcome`.
    pub(crate) fn repeat(outcome: FakeOutcome) -> Self {
        let connector = Self::default();
        *connector.state.fallback.lock().unwrap() = Some(outcome);
        connector
    }

    /// Appends outcomes to the script.
    pub(crate) fn script(&self, outcomes: impl IntoIterator<Item = FakeOutcome>) {
        self.state.script.lock().unwrap().extend(outcomes);
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Waits for the far end of the next accepted link.
    pub(crate) async fn next_remote(&self) -> FakeRemote {
        loop {
            let ready = self.state.remote_ready.notified();
            if let Some(remote) = self.state.remotes.lock().unwrap().pop_front() {
                return remote;
            }
            ready.await;
        }
    }

    fn next_outcome(&self) -> FakeOutcome {
        let scripted = self.state.script.lock().unwrap().pop_front();
        scripted
            .or_else(|| self.state.fallback.lock().unwrap().clone())
            .unwrap_or_else(|| {
                FakeOutcome::Fail(ConnectError::Unreachable("no scripted outcome".into()))
            })
    }
}

impl Connector for FakeConnector {
    async fn open(&self, config: &ClientConfig) -> Result<Link, ConnectError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome() {
            FakeOutcome::Accept => {
                let (link, remote) = channel_link(config.channel_id());
                self.state.remotes.lock().unwrap().push_back(remote);
                self.state.remote_ready.notify_waiters();
                Ok(link)
            }
            FakeOutcome::Fail(e) => Err(e),
            FakeOutcome::Hang => std::future::pending().await,
        }
    }
}

/// Far end of a fake link.
///
/// Dropping it (or calling [`close`](Self::close)) ends the link's stream.
pub(crate) struct FakeRemote {
    inbound: UnboundedSender<Result<Frame, LinkError>>,
    outbound: UnboundedReceiver<Frame>,
    fail_writes: Arc<AtomicBool>,
}

impl FakeRemote {
    /// Sends one payload to the client.
    pub(crate) fn push(&self, payload: &[u8]) {
        let _ = self
            .inbound
            .send(Ok(Frame::Data(Bytes::copy_from_slice(payload))));
    }

    /// Next frame written by the client.
    pub(crate) async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next payload written by the client, skipping heartbeats.
    pub(crate) async fn recv_data(&mut self) -> Option<Bytes> {
        loop {
            match self.outbound.recv().await? {
                Frame::Data(data) => return Some(data),
                Frame::Heartbeat => continue,
            }
        }
    }

    /// Makes every later write on the link fail.
    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn close(self) {}
}

fn channel_link(source_id: String) -> (Link, FakeRemote) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let fail_writes = Arc::new(AtomicBool::new(false));

    let stream = stream::unfold(
        inbound_rx,
        |mut rx: UnboundedReceiver<Result<Frame, LinkError>>| async move {
            rx.recv().await.map(|item| (item, rx))
        },
    );

    let failing = fail_writes.clone();
    let sink = sink::unfold(outbound_tx, move |tx, frame: Frame| {
        let failing = failing.clone();
        async move {
            if failing.load(Ordering::SeqCst) {
                return Err(LinkError::Closed);
            }
            tx.send(frame).map_err(|_| LinkError::Closed)?;
            Ok(tx)
        }
    });

    let link = Link {
        source_id,
        sink: Box::pin(sink),
        stream: Box::pin(stream),
    };
    let remote = FakeRemote {
        inbound: inbound_tx,
        outbound: outbound_rx,
        fail_writes,
    };
    (link, remote)
}

/// Records state transitions for assertions.
#[derive(Clone, Default)]
pub(crate) struct StateLog {
    changes: Arc<Mutex<Vec<StateChange>>>,
    changed: Arc<Notify>,
}

impl StateLog {
    pub(crate) fn push(&self, change: &StateChange) {
        self.changes.lock().unwrap().push(change.clone());
        self.changed.notify_waiters();
    }

    pub(crate) fn changes(&self) -> Vec<StateChange> {
        self.changes.lock().unwrap().clone()
    }

    pub(crate) fn states(&self) -> Vec<ConnectionState> {
        self.changes().into_iter().map(|c| c.state).collect()
    }

    pub(crate) async fn wait_for(&self, state: ConnectionState) {
        self.wait_until(|c| c.state == state).await;
    }

    pub(crate) async fn wait_for_attempt(&self, attempt: u32) {
        self.wait_until(|c| c.attempt == attempt).await;
    }

    async fn wait_until(&self, predicate: impl Fn(&StateChange) -> bool) {
        loop {
            let changed = self.changed.notified();
            if self.changes.lock().unwrap().iter().any(&predicate) {
                return;
            }
            changed.await;
        }
    }
}
