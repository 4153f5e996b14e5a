//! Chat event types delivered by an external transport.
//!
//! Identifiers are opaque strings owned by the transport. The engine only
//! compares and hashes them; it never parses their contents.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a single chat message, as assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps a transport-assigned message identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered identifier (UUID v7).
    ///
    /// Used by transports that do not assign their own ids.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a conversation (two-party or group, treated uniformly).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wraps a transport-assigned conversation identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a conversation member (user handle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Wraps a transport-assigned member identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the conversation produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Another member posted the message.
    Received,
    /// The bot's own account posted the message.
    Sent,
}

/// A new message observed in a conversation.
///
/// The content is a snapshot taken at delivery time. The transport may
/// still change the underlying message afterwards (edits), which is why
/// the engine keeps its own copy for edit tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEvent {
    /// Transport identity of the message.
    pub message_id: MessageId,
    /// Conversation the message was posted in.
    pub conversation_id: ConversationId,
    /// Member who posted the message.
    pub sender: MemberId,
    /// Textual content at delivery time.
    pub content: String,
    /// Received from another member or sent by the bot.
    pub direction: Direction,
}

impl ConversationEvent {
    /// Builds an event for a message posted by another member.
    pub fn received(
        message_id: MessageId,
        conversation_id: ConversationId,
        sender: MemberId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            conversation_id,
            sender,
            content: content.into(),
            direction: Direction::Received,
        }
    }

    /// Builds an event for a message posted by the bot's own account.
    pub fn sent(
        message_id: MessageId,
        conversation_id: ConversationId,
        sender: MemberId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            conversation_id,
            sender,
            content: content.into(),
            direction: Direction::Sent,
        }
    }
}

/// Notification that an existing message's content was edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEdit {
    /// Transport identity of the edited message.
    pub message_id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Member who performed the edit.
    pub editor: MemberId,
    /// Content after the edit.
    pub new_content: String,
}
