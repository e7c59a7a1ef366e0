//! Fan-out of decoded events to registered handlers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use telelink_protocol::Event;

/// Error a handler may return. Logged and counted, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every event dispatched after its registration.
pub trait Handler: Send + Sync {
    fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Opaque handle returned by [`Dispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered handler registry.
///
/// Dispatch works on a snapshot taken under the registry lock and invokes the
/// handlers after releasing it, so a handler may register or unregister
/// handlers (including itself) without deadlocking. Such changes apply from
/// the next event on.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<Vec<(HandlerId, Arc<dyn Handler>)>>,
    next_id: AtomicU64,
    failures: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(HandlerId, Arc<dyn Handler>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a handler; it runs after all handlers registered before it.
    pub fn register(&self, handler: impl Handler + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        trace!(id = id.0, "handler registered");
        id
    }

    /// Removes a handler. Returns `false` for unknown ids.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        before != handlers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invokes every handler with `event`, in registration order.
    ///
    /// A handler that fails or panics is logged and counted; the rest still
    /// run. Returns the number of failures for this event.
    pub fn dispatch(&self, event: &Event) -> usize {
        let snapshot: Vec<(HandlerId, Arc<dyn Handler>)> = self.lock().clone();
        let mut failed = 0;

        for (id, handler) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            failed += 1;
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                handler = id.0,
                source = %event.source_id(),
                kind = event.kind().unwrap_or("-"),
                error = %reason,
                "handler failed"
            );
        }
        failed
    }

    /// Total handler failures since creation.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Handler forwarding events into a bounded channel.
///
/// Never blocks the receive path: when the channel is full the event is
/// dropped with a warning. Once the receiver is gone the handler reports an
/// error for every event, so remove it with the id it was registered under.
pub struct ChannelHandler {
    tx: mpsc::Sender<Event>,
}

impl ChannelHandler {
    /// Creates the handler and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Handler for ChannelHandler {
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(source = %event.source_id(), "subscriber channel full, dropping event");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err("subscriber channel closed".into()),
        }
    }
}
