//! Chat transport abstraction for `ChatPump`.
//!
//! Defines the [`ChatTransport`] trait the engine uses to query the external
//! chat client. Events are pushed into the engine by whoever owns the
//! client; the engine only calls back into the transport for registration
//! metadata and for the editability check performed by the sweeper.
//!
//! Concrete implementations:
//! - [`memory::MemoryTransport`]: in-process transport for tests and replay

pub mod memory;

use std::future::Future;

use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::{ConversationId, MessageId};

/// A conversation handle as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Transport identity of the conversation.
    pub id: ConversationId,
    /// Display title (window title in the chat client).
    pub title: String,
}

impl Conversation {
    /// Creates a conversation handle.
    pub fn new(id: ConversationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// Errors that can occur while querying the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport does not know this conversation.
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),

    /// The transport does not know this message.
    #[error("unknown message {0}")]
    UnknownMessage(MessageId),

    /// The chat client is not reachable or refused the call.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The operation is not permitted for the bot's account.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// Queries the engine may issue against the external chat client.
///
/// Every method may fail with a [`TransportError`]; callers inside the
/// engine log and report failures and never let them escape a worker loop.
pub trait ChatTransport: Send + Sync {
    /// Look up a conversation's handle.
    fn conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<Conversation, TransportError>> + Send;

    /// List the current members of a conversation.
    fn members(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<Vec<MemberInfo>, TransportError>> + Send;

    /// Whether the message can still be edited by its sender.
    fn is_editable(
        &self,
        message: &MessageId,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Profile of the account the bot is logged in as.
    fn profile(&self) -> impl Future<Output = Result<MemberInfo, TransportError>> + Send;

    /// Rewrite the content of a message the bot's account sent.
    fn set_content(
        &self,
        message: &MessageId,
        content: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
