//! The consumer worker that drains the event queue and dispatches items.
//!
//! Each wake-up drains the whole backlog and dispatches the items one by one
//! in arrival order. Content matching a reserved command token goes to
//! [`MessageHandler::handle_command`]; everything else is written to the
//! [`EditableMessageCache`] and then handed to
//! [`MessageHandler::handle_message`].
//!
//! A failing or panicking handler only affects its own item: the outcome is
//! logged, counted, and the worker moves on to the next item.
//!
//! On cancellation the worker finishes its current batch, closes the queue,
//! dispatches whatever was still queued and exits.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use chatpump_proto::command::{Classification, CommandSet};

use crate::cache::EditableMessageCache;
use crate::handler::{HandlerContext, HandlerError, MessageHandler};
use crate::identity::BotIdentity;
use crate::members::UserDirectory;
use crate::queue::{EventQueue, TimedItem};
use crate::transport::Conversation;

/// Counters shared by every consumer worker of one conversation.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed: AtomicU64,
    commands: AtomicU64,
    messages: AtomicU64,
    handler_failures: AtomicU64,
    batches: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStatsSnapshot {
    /// Items fully dispatched (success or failure).
    pub processed: u64,
    /// Items routed to the command handler.
    pub commands: u64,
    /// Items routed to the normal-message handler.
    pub messages: u64,
    /// Items whose handler returned an error or panicked.
    pub handler_failures: u64,
    /// Non-empty drains performed.
    pub batches: u64,
}

impl ConsumerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            processed: self.processed.load(Ordering::Acquire),
            commands: self.commands.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

/// One consumer worker bound to a conversation's queue and cache.
pub struct Consumer<H: MessageHandler> {
    worker: usize,
    conversation: Arc<Conversation>,
    queue: Arc<EventQueue>,
    cache: Arc<EditableMessageCache>,
    members: Arc<UserDirectory>,
    commands: Arc<CommandSet>,
    handler: Arc<H>,
    bot: Arc<BotIdentity>,
    stats: Arc<ConsumerStats>,
}

/// Shared state a [`Consumer`] is wired to.
pub struct ConsumerParts<H: MessageHandler> {
    /// Conversation the queue belongs to.
    pub conversation: Arc<Conversation>,
    /// Queue to drain.
    pub queue: Arc<EventQueue>,
    /// Cache of editable messages to populate.
    pub cache: Arc<EditableMessageCache>,
    /// Member directory handed to handlers.
    pub members: Arc<UserDirectory>,
    /// Reserved command tokens.
    pub commands: Arc<CommandSet>,
    /// Downstream handler.
    pub handler: Arc<H>,
    /// The bot's own account.
    pub bot: Arc<BotIdentity>,
    /// Counters to update.
    pub stats: Arc<ConsumerStats>,
}

impl<H: MessageHandler> Clone for ConsumerParts<H> {
    fn clone(&self) -> Self {
        Self {
            conversation: Arc::clone(&self.conversation),
            queue: Arc::clone(&self.queue),
            cache: Arc::clone(&self.cache),
            members: Arc::clone(&self.members),
            commands: Arc::clone(&self.commands),
            handler: Arc::clone(&self.handler),
            bot: Arc::clone(&self.bot),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<H: MessageHandler + 'static> Consumer<H> {
    /// Creates worker number `worker` over the given parts.
    #[must_use]
    pub fn new(worker: usize, parts: ConsumerParts<H>) -> Self {
        Self {
            worker,
            conversation: parts.conversation,
            queue: parts.queue,
            cache: parts.cache,
            members: parts.members,
            commands: parts.commands,
            handler: parts.handler,
            bot: parts.bot,
            stats: parts.stats,
        }
    }

    /// Spawns [`run`](Self::run) onto the current tokio runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs the wait/drain/dispatch loop until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between batches. Items still queued at that
    /// point are dispatched before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::debug!(
            conversation = %self.conversation.id,
            worker = self.worker,
            "consumer started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = self.queue.wait_non_empty() => {}
            }
            let batch = self.queue.drain();
            self.dispatch_batch(batch).await;
        }

        let remaining = self.queue.close_and_drain();
        if !remaining.is_empty() {
            tracing::debug!(
                conversation = %self.conversation.id,
                worker = self.worker,
                remaining = remaining.len(),
                "draining backlog before exit"
            );
            self.dispatch_batch(remaining).await;
        }

        tracing::debug!(
            conversation = %self.conversation.id,
            worker = self.worker,
            "consumer stopped"
        );
    }

    async fn dispatch_batch(&self, batch: Vec<TimedItem>) {
        if batch.is_empty() {
            return;
        }
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            conversation = %self.conversation.id,
            worker = self.worker,
            size = batch.len(),
            "dispatching batch"
        );
        for item in batch {
            self.dispatch(&item).await;
        }
    }

    /// Dispatches one item. Never fails; handler problems are logged here.
    async fn dispatch(&self, item: &TimedItem) {
        let event = item.event();
        let ctx = HandlerContext {
            conversation: &self.conversation,
            message_id: &event.message_id,
            sender: &event.sender,
            content: &event.content,
            direction: event.direction,
            members: &self.members,
            bot: &self.bot,
            received_at: item.received_at(),
        };

        let outcome = match self.commands.classify(&event.content) {
            Classification::Command(token) => {
                self.stats.commands.fetch_add(1, Ordering::Relaxed);
                AssertUnwindSafe(self.handler.handle_command(&ctx, &token))
                    .catch_unwind()
                    .await
            }
            Classification::Normal => {
                self.cache
                    .put(event.message_id.clone(), event.content.clone());
                self.stats.messages.fetch_add(1, Ordering::Relaxed);
                AssertUnwindSafe(self.handler.handle_message(&ctx))
                    .catch_unwind()
                    .await
            }
        };

        self.record_outcome(item, outcome);
        self.stats.processed.fetch_add(1, Ordering::Release);
    }

    fn record_outcome(
        &self,
        item: &TimedItem,
        outcome: Result<Result<(), HandlerError>, Box<dyn Any + Send>>,
    ) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    conversation = %self.conversation.id,
                    message_id = %item.event().message_id,
                    error = %e,
                    "handler failed, continuing with next item"
                );
            }
            Err(panic) => {
                self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    conversation = %self.conversation.id,
                    message_id = %item.event().message_id,
                    panic = panic_message(&*panic),
                    "handler panicked, continuing with next item"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
