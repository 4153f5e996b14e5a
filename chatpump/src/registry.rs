//! Routing of transport events to per-conversation coordinators.
//!
//! The [`ConversationRegistry`] is the single entry point a transport
//! integration talks to. It owns one [`ConversationCoordinator`] per
//! registered conversation and routes every event to the coordinator of
//! its conversation. Events of unregistered conversations are dropped.
//!
//! Conversations are registered by the bot's own account: when the bot
//! sends the activation token in a conversation the registry starts a
//! coordinator for it and blanks the activation message. Sending the
//! deactivation token stops the coordinator again. Messages from other
//! members never change the registration set.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use chatpump_proto::command::matches_token;
use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::{ConversationEvent, ConversationId, MemberId, MessageEdit};

use crate::coordinator::{ConversationCoordinator, CoordinatorStats, EngineContext};
use crate::edit::EditedMessage;
use crate::handler::MessageHandler;
use crate::sweeper::SweepReport;
use crate::transport::{ChatTransport, TransportError};

/// Errors that can occur while registering a conversation.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The transport could not describe the conversation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// What the registry did with a message the bot sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentOutcome {
    /// The activation token registered the conversation.
    Registered,
    /// The deactivation token deregistered the conversation.
    Deregistered,
    /// The event was handed to the conversation's coordinator.
    Forwarded,
    /// The conversation is not registered; nothing happened.
    Ignored,
}

/// Owner of every active [`ConversationCoordinator`].
pub struct ConversationRegistry<T: ChatTransport, H: MessageHandler> {
    ctx: EngineContext<T, H>,
    coordinators: RwLock<HashMap<ConversationId, Arc<ConversationCoordinator<T>>>>,
}

impl<T, H> ConversationRegistry<T, H>
where
    T: ChatTransport + 'static,
    H: MessageHandler + 'static,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new(ctx: EngineContext<T, H>) -> Self {
        Self {
            ctx,
            coordinators: RwLock::new(HashMap::new()),
        }
    }

    /// The shared engine context.
    #[must_use]
    pub const fn context(&self) -> &EngineContext<T, H> {
        &self.ctx
    }

    /// Starts a coordinator for `id`, or returns the one already running.
    ///
    /// The transport lookups run without holding the registry lock, so
    /// routing for other conversations is never blocked by a slow
    /// registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Transport`] if the transport cannot look up
    /// the conversation. Nothing is registered in that case.
    pub async fn register(
        &self,
        id: ConversationId,
    ) -> Result<Arc<ConversationCoordinator<T>>, RegistryError> {
        self.start_or_get(id).await.map(|(coordinator, _)| coordinator)
    }

    /// Like [`register`](Self::register), also reporting whether this call
    /// created the coordinator.
    async fn start_or_get(
        &self,
        id: ConversationId,
    ) -> Result<(Arc<ConversationCoordinator<T>>, bool), RegistryError> {
        if let Some(existing) = self.get(&id).await {
            return Ok((existing, false));
        }

        let conversation = self.ctx.transport.conversation(&id).await?;
        let started = ConversationCoordinator::start(conversation, &self.ctx).await;

        let mut coordinators = self.coordinators.write().await;
        if let Some(existing) = coordinators.get(&id).cloned() {
            drop(coordinators);
            tracing::debug!(
                conversation = %id,
                "conversation registered concurrently, discarding duplicate"
            );
            started.shutdown().await;
            return Ok((existing, false));
        }
        coordinators.insert(id.clone(), Arc::clone(&started));
        let registered = coordinators.len();
        drop(coordinators);

        tracing::info!(conversation = %id, registered, "conversation registered");
        Ok((started, true))
    }

    /// Removes and shuts down the coordinator for `id`.
    ///
    /// Returns `true` if one was registered.
    pub async fn deregister(&self, id: &ConversationId) -> bool {
        let removed = self.coordinators.write().await.remove(id);
        let Some(coordinator) = removed else {
            return false;
        };
        coordinator.shutdown().await;
        tracing::info!(conversation = %id, "conversation deregistered");
        true
    }

    /// The coordinator for `id`, if registered.
    pub async fn get(&self, id: &ConversationId) -> Option<Arc<ConversationCoordinator<T>>> {
        self.coordinators.read().await.get(id).cloned()
    }

    /// Returns `true` if `id` is registered.
    pub async fn is_registered(&self, id: &ConversationId) -> bool {
        self.coordinators.read().await.contains_key(id)
    }

    /// Number of registered conversations.
    pub async fn len(&self) -> usize {
        self.coordinators.read().await.len()
    }

    /// Returns `true` if no conversation is registered.
    pub async fn is_empty(&self) -> bool {
        self.coordinators.read().await.is_empty()
    }

    /// Registered conversation ids, sorted.
    pub async fn conversations(&self) -> Vec<ConversationId> {
        let mut ids: Vec<ConversationId> =
            self.coordinators.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Routes a message another member posted.
    ///
    /// Returns `true` if a coordinator accepted it.
    pub async fn on_event_received(&self, event: ConversationEvent) -> bool {
        let Some(coordinator) = self.get(&event.conversation_id).await else {
            tracing::trace!(
                conversation = %event.conversation_id,
                "received event for unregistered conversation"
            );
            return false;
        };
        coordinator.on_event_received(event);
        true
    }

    /// Routes a message the bot's account posted, handling the
    /// activation and deactivation tokens.
    pub async fn on_event_sent(&self, event: ConversationEvent) -> SentOutcome {
        let from_bot = self.ctx.bot.is_self(&event.sender);
        let registered = self.is_registered(&event.conversation_id).await;

        if !registered {
            if from_bot && matches_token(&event.content, &self.ctx.config.activation_token) {
                return self.activate(event).await;
            }
            return SentOutcome::Ignored;
        }

        let deactivate =
            from_bot && matches_token(&event.content, &self.ctx.config.deactivation_token);
        let id = event.conversation_id.clone();
        if let Some(coordinator) = self.get(&id).await {
            coordinator.on_event_sent(event);
        }
        if deactivate && self.deregister(&id).await {
            return SentOutcome::Deregistered;
        }
        SentOutcome::Forwarded
    }

    async fn activate(&self, event: ConversationEvent) -> SentOutcome {
        let registration = self.start_or_get(event.conversation_id.clone()).await;
        let (coordinator, created) = match registration {
            Ok(registration) => registration,
            Err(e) => {
                tracing::warn!(
                    conversation = %event.conversation_id,
                    error = %e,
                    "could not register conversation"
                );
                self.ctx.reporter.report(&format!(
                    "could not start listening in {}: {e}",
                    event.conversation_id
                ));
                return SentOutcome::Ignored;
            }
        };
        if !created {
            coordinator.on_event_sent(event);
            return SentOutcome::Forwarded;
        }

        if let Err(e) = self.ctx.transport.set_content(&event.message_id, "").await {
            tracing::warn!(
                conversation = %event.conversation_id,
                message_id = %event.message_id,
                error = %e,
                "could not blank activation message"
            );
            self.ctx.reporter.report(&format!(
                "could not remove the activation message in {}: {e}",
                event.conversation_id
            ));
        }
        SentOutcome::Registered
    }

    /// Routes an edit notification to the owning coordinator's facade.
    ///
    /// Returns the applied change, or `None` when edits are disabled, the
    /// conversation is unregistered, or the message was never seen.
    pub async fn on_message_edited(&self, edit: &MessageEdit) -> Option<EditedMessage> {
        if !self.ctx.config.enable_edits {
            return None;
        }
        let coordinator = self.get(&edit.conversation_id).await?;
        coordinator.edit_facade().on_message_edited(edit)
    }

    /// Membership hook: `member` joined `conversation`.
    ///
    /// Returns `false` if the conversation is not registered.
    pub async fn on_member_joined(
        &self,
        conversation: &ConversationId,
        member: MemberInfo,
    ) -> bool {
        let Some(coordinator) = self.get(conversation).await else {
            return false;
        };
        coordinator.on_member_joined(member);
        true
    }

    /// Membership hook: `member` left `conversation`.
    ///
    /// Returns `false` if the conversation is not registered.
    pub async fn on_member_left(&self, conversation: &ConversationId, member: &MemberId) -> bool {
        let Some(coordinator) = self.get(conversation).await else {
            return false;
        };
        coordinator.on_member_left(member);
        true
    }

    /// Forces a sweep of one conversation's cache.
    pub async fn sweep(&self, conversation: &ConversationId) -> Option<SweepReport> {
        let coordinator = self.get(conversation).await?;
        Some(coordinator.sweep_now().await)
    }

    /// Stats of every registered conversation, sorted by id.
    pub async fn stats(&self) -> Vec<(ConversationId, CoordinatorStats)> {
        let mut stats: Vec<_> = self
            .coordinators
            .read()
            .await
            .iter()
            .map(|(id, c)| (id.clone(), c.stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Deregisters and shuts down every conversation.
    ///
    /// Returns how many were stopped.
    pub async fn shutdown_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.coordinators.write().await);
        let count = drained.len();
        for (id, coordinator) in drained {
            coordinator.shutdown().await;
            tracing::debug!(conversation = %id, "conversation deregistered");
        }
        if count > 0 {
            tracing::info!(count, "all conversations shut down");
        }
        count
    }
}
