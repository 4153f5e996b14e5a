//! Downstream handlers invoked by the consumer.
//!
//! The consumer classifies each dequeued message and calls exactly one of
//! the [`MessageHandler`] methods with a [`HandlerContext`]. What a handler
//! does with the message (reply, run a command, update statistics) is not
//! the engine's concern. An error returned by a handler is logged at the
//! item boundary and never stops the consumer.

use std::future::Future;

use tokio::time::Instant;

use chatpump_proto::message::{Direction, MemberId, MessageId};

use crate::identity::BotIdentity;
use crate::members::UserDirectory;
use crate::transport::{Conversation, TransportError};

/// Errors a handler may return for a single message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A transport call made by the handler failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The command is recognized but its arguments or state are wrong.
    #[error("command {command} rejected: {reason}")]
    Rejected {
        /// The normalized command token.
        command: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Any other failure.
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Everything a handler needs to know about one dequeued message.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    /// The conversation the message belongs to.
    pub conversation: &'a Conversation,
    /// Transport identity of the message.
    pub message_id: &'a MessageId,
    /// Who sent it.
    pub sender: &'a MemberId,
    /// Its content at delivery time.
    pub content: &'a str,
    /// Received from another member or sent by the bot.
    pub direction: Direction,
    /// Members of the conversation, read live.
    pub members: &'a UserDirectory,
    /// The bot's own account.
    pub bot: &'a BotIdentity,
    /// When the producer accepted the event.
    pub received_at: Instant,
}

impl HandlerContext<'_> {
    /// Returns `true` if the bot's own account sent the message.
    #[must_use]
    pub fn is_from_bot(&self) -> bool {
        self.bot.is_self(self.sender)
    }

    /// Display name of the sender, falling back to the raw id.
    #[must_use]
    pub fn sender_name(&self) -> String {
        self.members.display_name(self.sender)
    }
}

/// Business logic for commands and ordinary messages.
///
/// Implementations must be `Send + Sync`: with more than one consumer
/// worker configured, different messages may be handled concurrently.
pub trait MessageHandler: Send + Sync {
    /// Handle a message whose content is a reserved command token.
    ///
    /// `command` is the normalized (lowercased, trimmed) token.
    fn handle_command(
        &self,
        ctx: &HandlerContext<'_>,
        command: &str,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;

    /// Handle an ordinary chat message.
    fn handle_message(
        &self,
        ctx: &HandlerContext<'_>,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// Handler that only logs what it is given.
///
/// Used by the bootstrap binary when no business logic is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    async fn handle_command(
        &self,
        ctx: &HandlerContext<'_>,
        command: &str,
    ) -> Result<(), HandlerError> {
        tracing::info!(
            conversation = %ctx.conversation.title,
            sender = %ctx.sender_name(),
            command,
            queued = ?ctx.received_at.elapsed(),
            "command dispatched"
        );
        Ok(())
    }

    async fn handle_message(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        tracing::info!(
            conversation = %ctx.conversation.title,
            sender = %ctx.sender_name(),
            message_id = %ctx.message_id,
            content = ctx.content,
            queued = ?ctx.received_at.elapsed(),
            "message dispatched"
        );
        Ok(())
    }
}
