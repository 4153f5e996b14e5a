//! Producer/consumer handoff for incoming conversation events.
//!
//! The [`EventQueue`] is an unbounded FIFO of [`TimedItem`]s guarded by a
//! mutex, paired with a [`Notify`] used to wake a waiting consumer. The
//! [`Producer`] is the enqueue-side handle: it stamps each event with the
//! local monotonic clock, appends it and wakes one consumer.
//!
//! # Ordering
//!
//! Items leave the queue in insertion order. A consumer removes the whole
//! backlog in one atomic [`drain`](EventQueue::drain), so an item is handed
//! to exactly one consumer.
//!
//! # Closing
//!
//! [`close_and_drain`](EventQueue::close_and_drain) atomically marks the
//! queue closed and takes what is left. Pushes after that point are
//! rejected with [`QueueClosed`] instead of sitting in a queue nobody will
//! read again.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use chatpump_proto::message::ConversationEvent;

/// A conversation event stamped with its local receipt time.
///
/// The receipt time comes from the local monotonic clock rather than the
/// transport's own timestamp, which may have coarse resolution. It is
/// metadata for latency reporting, never a sort key.
#[derive(Debug, Clone)]
pub struct TimedItem {
    event: ConversationEvent,
    received_at: Instant,
}

impl TimedItem {
    /// Stamps `event` with the current monotonic time.
    #[must_use]
    pub fn new(event: ConversationEvent) -> Self {
        Self {
            event,
            received_at: Instant::now(),
        }
    }

    /// The wrapped event.
    #[must_use]
    pub const fn event(&self) -> &ConversationEvent {
        &self.event
    }

    /// When the producer accepted the event.
    #[must_use]
    pub const fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Time elapsed since the producer accepted the event.
    #[must_use]
    pub fn queued_for(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Unwraps the event.
    #[must_use]
    pub fn into_event(self) -> ConversationEvent {
        self.event
    }
}

/// Returned when pushing into a queue whose consumers have shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event queue is closed")]
pub struct QueueClosed;

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<TimedItem>,
    closed: bool,
}

/// Unbounded, thread-safe FIFO of [`TimedItem`]s with a wake-up signal.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl EventQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item and wakes one waiting consumer.
    ///
    /// Only ever blocks for the time needed to take the internal lock.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if [`close_and_drain`](Self::close_and_drain)
    /// has already run.
    pub fn push(&self, item: TimedItem) -> Result<(), QueueClosed> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(QueueClosed);
            }
            inner.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Removes and returns every queued item, oldest first.
    pub fn drain(&self) -> Vec<TimedItem> {
        self.inner.lock().items.drain(..).collect()
    }

    /// Closes the queue and returns what was left in it, oldest first.
    pub fn close_and_drain(&self) -> Vec<TimedItem> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.items.drain(..).collect()
    }

    /// Waits until at least one item is queued.
    ///
    /// Cancel-safe: dropping the future loses nothing. A wake-up that
    /// arrives while no consumer is waiting is stored by [`Notify`] and
    /// consumed by the next call.
    pub async fn wait_non_empty(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Returns `true` once the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// Enqueue-side handle onto an [`EventQueue`].
///
/// Cheap to clone; safe to use from any number of threads at once.
#[derive(Debug, Clone)]
pub struct Producer {
    queue: Arc<EventQueue>,
}

impl Producer {
    /// Creates a producer feeding `queue`.
    #[must_use]
    pub const fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// Stamps `event` with the current time, appends it and wakes a consumer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] once the consumers have shut down.
    pub fn enqueue(&self, event: ConversationEvent) -> Result<(), QueueClosed> {
        let message_id = event.message_id.clone();
        self.queue.push(TimedItem::new(event))?;
        tracing::trace!(message_id = %message_id, "event enqueued");
        Ok(())
    }
}
