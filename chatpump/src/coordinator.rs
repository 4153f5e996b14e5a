//! Per-conversation ownership of queue, cache, members and worker tasks.
//!
//! A [`ConversationCoordinator`] is created by [`ConversationCoordinator::start`]
//! once the conversation's handle is known. Start-up seeds the user
//! directory from the transport, spawns the configured consumer workers and
//! the sweeper, and marks the coordinator active. From then on the
//! transport-facing entry points feed the producer until
//! [`shutdown`](ConversationCoordinator::shutdown) cancels the tasks, lets
//! the consumers drain the backlog and joins them.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::{ConversationEvent, MemberId};

use crate::cache::EditableMessageCache;
use crate::config::EngineConfig;
use crate::consumer::{Consumer, ConsumerParts, ConsumerStats, ConsumerStatsSnapshot};
use crate::edit::EditFacade;
use crate::handler::MessageHandler;
use crate::identity::BotIdentity;
use crate::members::UserDirectory;
use crate::queue::{EventQueue, Producer};
use crate::report::ProblemReporter;
use crate::sweeper::{PeriodicSweeper, SweepReport};
use crate::transport::{ChatTransport, Conversation};

/// Lifecycle of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Constructed, tasks not yet running.
    Unattached,
    /// Accepting events.
    Active,
    /// Shut down; events are ignored.
    Stopped,
}

/// Collaborators shared by every coordinator.
pub struct EngineContext<T, H> {
    /// The external chat client.
    pub transport: Arc<T>,
    /// Business logic for dequeued messages.
    pub handler: Arc<H>,
    /// Where operator-visible problems go.
    pub reporter: Arc<dyn ProblemReporter>,
    /// The bot's own account.
    pub bot: Arc<BotIdentity>,
    /// Engine settings.
    pub config: EngineConfig,
}

impl<T, H> EngineContext<T, H> {
    /// Bundles the collaborators.
    pub fn new(
        transport: Arc<T>,
        handler: Arc<H>,
        reporter: Arc<dyn ProblemReporter>,
        bot: BotIdentity,
        config: EngineConfig,
    ) -> Self {
        Self {
            transport,
            handler,
            reporter,
            bot: Arc::new(bot),
            config,
        }
    }
}

impl<T, H> Clone for EngineContext<T, H> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            handler: Arc::clone(&self.handler),
            reporter: Arc::clone(&self.reporter),
            bot: Arc::clone(&self.bot),
            config: self.config.clone(),
        }
    }
}

/// Point-in-time view of one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Lifecycle state.
    pub state: CoordinatorState,
    /// Consumer counters.
    pub consumer: ConsumerStatsSnapshot,
    /// Items waiting in the queue.
    pub queued: usize,
    /// Messages in the editable cache.
    pub cached: usize,
    /// Known members.
    pub members: usize,
    /// Completed sweeps.
    pub sweeps: u64,
}

/// Owner of one conversation's queue, cache, user directory and tasks.
pub struct ConversationCoordinator<T: ChatTransport> {
    conversation: Arc<Conversation>,
    queue: Arc<EventQueue>,
    producer: Producer,
    cache: Arc<EditableMessageCache>,
    members: Arc<UserDirectory>,
    stats: Arc<ConsumerStats>,
    sweeper: Arc<PeriodicSweeper<T>>,
    edit_facade: OnceLock<Arc<EditFacade>>,
    state: Mutex<CoordinatorState>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl<T: ChatTransport + 'static> ConversationCoordinator<T> {
    /// Builds a coordinator for `conversation` and starts its tasks.
    ///
    /// A failure to list members is reported and leaves the directory
    /// empty; it does not prevent the coordinator from starting.
    pub async fn start<H: MessageHandler + 'static>(
        conversation: Conversation,
        ctx: &EngineContext<T, H>,
    ) -> Arc<Self> {
        let members = Arc::new(UserDirectory::new());
        match ctx.transport.members(&conversation.id).await {
            Ok(list) => members.seed(list),
            Err(e) => {
                tracing::warn!(
                    conversation = %conversation.id,
                    error = %e,
                    "could not load conversation members"
                );
                ctx.reporter.report(&format!(
                    "could not load members of {}: {e}",
                    conversation.title
                ));
            }
        }

        let conversation = Arc::new(conversation);
        let queue = Arc::new(EventQueue::new());
        let cache = Arc::new(EditableMessageCache::new());
        let sweeper = Arc::new(PeriodicSweeper::new(
            conversation.id.clone(),
            Arc::clone(&cache),
            Arc::clone(&ctx.transport),
            Arc::clone(&ctx.reporter),
            ctx.config.sweep_interval,
        ));

        let coordinator = Arc::new(Self {
            conversation: Arc::clone(&conversation),
            producer: Producer::new(Arc::clone(&queue)),
            queue: Arc::clone(&queue),
            cache: Arc::clone(&cache),
            members: Arc::clone(&members),
            stats: Arc::new(ConsumerStats::new()),
            sweeper,
            edit_facade: OnceLock::new(),
            state: Mutex::new(CoordinatorState::Unattached),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            shutdown_timeout: ctx.config.shutdown_timeout,
        });

        let parts = ConsumerParts {
            conversation,
            queue,
            cache,
            members,
            commands: Arc::new(ctx.config.commands.clone()),
            handler: Arc::clone(&ctx.handler),
            bot: Arc::clone(&ctx.bot),
            stats: Arc::clone(&coordinator.stats),
        };
        let workers = ctx.config.consumer_workers.max(1);
        {
            let mut tasks = coordinator.tasks.lock();
            for worker in 0..workers {
                let consumer = Consumer::new(worker, parts.clone());
                tasks.push(consumer.spawn(coordinator.shutdown.child_token()));
            }
            tasks.push(coordinator.sweeper.spawn(coordinator.shutdown.child_token()));
        }
        *coordinator.state.lock() = CoordinatorState::Active;

        tracing::info!(
            conversation = %coordinator.conversation.id,
            title = %coordinator.conversation.title,
            workers,
            members = coordinator.members.len(),
            "conversation coordinator started"
        );
        coordinator
    }

    /// The conversation this coordinator owns.
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        *self.state.lock()
    }

    /// Feeds a message another member posted into the queue.
    ///
    /// Events of other conversations and events arriving after shutdown
    /// are ignored.
    pub fn on_event_received(&self, event: ConversationEvent) {
        self.forward(event);
    }

    /// Feeds a message the bot's account posted into the queue.
    ///
    /// Same filtering as [`on_event_received`](Self::on_event_received).
    pub fn on_event_sent(&self, event: ConversationEvent) {
        self.forward(event);
    }

    fn forward(&self, event: ConversationEvent) {
        if event.conversation_id != self.conversation.id {
            tracing::debug!(
                conversation = %self.conversation.id,
                other = %event.conversation_id,
                "ignoring event from another conversation"
            );
            return;
        }
        if self.state() != CoordinatorState::Active {
            tracing::debug!(
                conversation = %self.conversation.id,
                message_id = %event.message_id,
                "ignoring event, coordinator not active"
            );
            return;
        }
        let message_id = event.message_id.clone();
        if let Err(e) = self.producer.enqueue(event) {
            tracing::debug!(
                conversation = %self.conversation.id,
                message_id = %message_id,
                error = %e,
                "event arrived during shutdown, dropped"
            );
        }
    }

    /// The edit facade bound to this coordinator's cache.
    ///
    /// Every call returns the same instance.
    pub fn edit_facade(&self) -> Arc<EditFacade> {
        Arc::clone(self.edit_facade.get_or_init(|| {
            Arc::new(EditFacade::new(
                self.conversation.id.clone(),
                Arc::clone(&self.cache),
            ))
        }))
    }

    /// Records a member joining. Returns the previous entry, if any.
    pub fn on_member_joined(&self, member: MemberInfo) -> Option<MemberInfo> {
        tracing::debug!(
            conversation = %self.conversation.id,
            member = %member.member_id,
            "member joined"
        );
        self.members.upsert(member)
    }

    /// Records a member leaving. Returns the removed entry, if known.
    pub fn on_member_left(&self, member: &MemberId) -> Option<MemberInfo> {
        tracing::debug!(
            conversation = %self.conversation.id,
            member = %member,
            "member left"
        );
        self.members.remove(member)
    }

    /// Runs a sweep immediately, outside the regular schedule.
    pub async fn sweep_now(&self) -> SweepReport {
        self.sweeper.sweep_once().await
    }

    /// The editable-message cache.
    #[must_use]
    pub fn cache(&self) -> &EditableMessageCache {
        &self.cache
    }

    /// The conversation's user directory.
    #[must_use]
    pub fn members(&self) -> &UserDirectory {
        &self.members
    }

    /// Snapshot of queue, cache, member and consumer counters.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            state: self.state(),
            consumer: self.stats.snapshot(),
            queued: self.queue.len(),
            cached: self.cache.len(),
            members: self.members.len(),
            sweeps: self.sweeper.sweeps(),
        }
    }

    /// Stops the sweeper, drains the backlog through the consumers and
    /// joins every task.
    ///
    /// A task still running after the configured shutdown timeout is
    /// aborted and awaited, so none outlives this call.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state == CoordinatorState::Stopped {
                return;
            }
            *state = CoordinatorState::Stopped;
        }

        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock());
        for mut handle in handles {
            match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        conversation = %self.conversation.id,
                        error = %e,
                        "coordinator task join failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        conversation = %self.conversation.id,
                        timeout = ?self.shutdown_timeout,
                        "timed out waiting for coordinator task shutdown, aborting"
                    );
                    handle.abort();
                    match handle.await {
                        Err(e) if !e.is_cancelled() => {
                            tracing::warn!(
                                conversation = %self.conversation.id,
                                error = %e,
                                "aborted coordinator task failed"
                            );
                        }
                        _ => {}
                    }
                }
            }
        }

        let abandoned = self.queue.close_and_drain();
        if !abandoned.is_empty() {
            tracing::warn!(
                conversation = %self.conversation.id,
                count = abandoned.len(),
                "events left undispatched at shutdown"
            );
        }

        tracing::info!(
            conversation = %self.conversation.id,
            processed = self.stats.snapshot().processed,
            "conversation coordinator stopped"
        );
    }
}
