//! Edit notifications routed into a conversation's cache.

use std::sync::Arc;

use chatpump_proto::message::{ConversationId, MessageEdit, MessageId};

use crate::cache::EditableMessageCache;

/// The cache change caused by one applied edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedMessage {
    /// The edited message.
    pub message_id: MessageId,
    /// Content before the edit.
    pub previous: String,
    /// Content after the edit.
    pub current: String,
}

/// Applies edit notifications to one conversation's [`EditableMessageCache`].
///
/// Obtained from [`ConversationCoordinator::edit_facade`], which hands out
/// the same instance on every call.
///
/// [`ConversationCoordinator::edit_facade`]: crate::coordinator::ConversationCoordinator::edit_facade
#[derive(Debug)]
pub struct EditFacade {
    conversation: ConversationId,
    cache: Arc<EditableMessageCache>,
}

impl EditFacade {
    /// Creates a facade over `cache` for `conversation`.
    #[must_use]
    pub const fn new(conversation: ConversationId, cache: Arc<EditableMessageCache>) -> Self {
        Self {
            conversation,
            cache,
        }
    }

    /// The conversation this facade accepts edits for.
    #[must_use]
    pub const fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Replaces the cached content of an edited message.
    ///
    /// Edits of other conversations and of messages never seen by the
    /// consumer are ignored and return `None`.
    pub fn on_message_edited(&self, edit: &MessageEdit) -> Option<EditedMessage> {
        if edit.conversation_id != self.conversation {
            tracing::debug!(
                conversation = %self.conversation,
                other = %edit.conversation_id,
                "ignoring edit from another conversation"
            );
            return None;
        }

        let Some(previous) = self
            .cache
            .update(&edit.message_id, edit.new_content.clone())
        else {
            tracing::debug!(
                conversation = %self.conversation,
                message_id = %edit.message_id,
                "edit of unseen message ignored"
            );
            return None;
        };

        tracing::debug!(
            conversation = %self.conversation,
            message_id = %edit.message_id,
            editor = %edit.editor,
            "cached content updated"
        );
        Some(EditedMessage {
            message_id: edit.message_id.clone(),
            previous,
            current: edit.new_content.clone(),
        })
    }

    /// Drops a message the transport reports as no longer editable.
    ///
    /// Returns `true` if it was cached.
    pub fn forget(&self, message_id: &MessageId) -> bool {
        self.cache.remove(message_id).is_some()
    }
}
