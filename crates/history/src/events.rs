use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use telelink_protocol::Event;
use tracing::trace;

use crate::buffer::RingBuffer;

/// Shared, bounded history of received events.
///
/// The receive loop appends while any number of readers take snapshots.
/// The lock is held only for a single push or a snapshot copy.
#[derive(Debug)]
pub struct EventBuffer {
    inner: Mutex<RingBuffer<Arc<Event>>>,
}

impl EventBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingBuffer<Arc<Event>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event, evicting the oldest one when at capacity.
    pub fn append(&self, event: Arc<Event>) {
        if let Some(evicted) = self.lock().push(event) {
            trace!(source = %evicted.source_id(), "evicted oldest event from history");
        }
    }

    /// The most recently appended event.
    pub fn last(&self) -> Option<Arc<Event>> {
        self.lock().last().cloned()
    }

    /// Snapshot of all retained events, oldest first.
    pub fn all(&self) -> Vec<Arc<Event>> {
        self.lock().to_vec()
    }

    /// Snapshot of the retained events produced by `source_id`, oldest first.
    pub fn from_source(&self, source_id: &str) -> Vec<Arc<Event>> {
        self.lock()
            .iter()
            .filter(|e| e.source_id() == source_id)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
