//! In-memory transport for testing and script replay.
//!
//! [`MemoryTransport`] keeps conversations, members and posted messages in
//! process. A message stays editable until it is explicitly expired or, when
//! an edit window is configured, until the window has elapsed since it was
//! posted. Individual editability checks can be made to fail to exercise the
//! engine's error paths.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::{ConversationEvent, ConversationId, MemberId, MessageId};

use super::{ChatTransport, Conversation, TransportError};

/// A message the transport has seen.
#[derive(Debug, Clone)]
struct PostedMessage {
    conversation_id: ConversationId,
    content: String,
    posted_at: Instant,
    expired: bool,
}

#[derive(Debug, Default)]
struct State {
    conversations: HashMap<ConversationId, (Conversation, Vec<MemberInfo>)>,
    messages: HashMap<MessageId, PostedMessage>,
    failing_checks: HashSet<MessageId>,
    members_unavailable: bool,
}

/// In-process [`ChatTransport`] backed by a mutex-guarded state map.
pub struct MemoryTransport {
    profile: MemberInfo,
    edit_window: Option<Duration>,
    state: Mutex<State>,
}

impl MemoryTransport {
    /// Creates a transport logged in as `profile`.
    ///
    /// Messages stay editable until [`expire`](Self::expire) is called.
    #[must_use]
    pub fn new(profile: MemberInfo) -> Self {
        Self {
            profile,
            edit_window: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Makes messages non-editable once `window` has passed since posting.
    #[must_use]
    pub const fn with_edit_window(mut self, window: Duration) -> Self {
        self.edit_window = Some(window);
        self
    }

    /// Declares a conversation and its current members.
    pub fn add_conversation(&self, conversation: Conversation, members: Vec<MemberInfo>) {
        self.state
            .lock()
            .conversations
            .insert(conversation.id.clone(), (conversation, members));
    }

    /// Adds a member to a known conversation. Returns `false` if unknown.
    pub fn add_member(&self, conversation: &ConversationId, member: MemberInfo) -> bool {
        let mut state = self.state.lock();
        let Some((_, members)) = state.conversations.get_mut(conversation) else {
            return false;
        };
        members.retain(|m| m.member_id != member.member_id);
        members.push(member);
        true
    }

    /// Removes a member from a known conversation. Returns `false` if absent.
    pub fn remove_member(&self, conversation: &ConversationId, member: &MemberId) -> bool {
        let mut state = self.state.lock();
        let Some((_, members)) = state.conversations.get_mut(conversation) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| m.member_id != *member);
        members.len() != before
    }

    /// Records a message another member posted and returns its event.
    pub fn post_received(
        &self,
        conversation: ConversationId,
        message: MessageId,
        sender: MemberId,
        content: impl Into<String>,
    ) -> ConversationEvent {
        let event = ConversationEvent::received(message, conversation, sender, content);
        self.record(&event);
        event
    }

    /// Records a message the bot's own account posted and returns its event.
    pub fn post_sent(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: impl Into<String>,
    ) -> ConversationEvent {
        let event = ConversationEvent::sent(
            message,
            conversation,
            self.profile.member_id.clone(),
            content,
        );
        self.record(&event);
        event
    }

    fn record(&self, event: &ConversationEvent) {
        self.state.lock().messages.insert(
            event.message_id.clone(),
            PostedMessage {
                conversation_id: event.conversation_id.clone(),
                content: event.content.clone(),
                posted_at: Instant::now(),
                expired: false,
            },
        );
    }

    /// Changes a recorded message's content, as an edit in the client would.
    ///
    /// Returns `false` if the message is unknown.
    pub fn edit(&self, message: &MessageId, content: impl Into<String>) -> bool {
        self.state.lock().messages.get_mut(message).is_some_and(|m| {
            m.content = content.into();
            true
        })
    }

    /// Closes a message's edit window immediately.
    pub fn expire(&self, message: &MessageId) {
        if let Some(m) = self.state.lock().messages.get_mut(message) {
            m.expired = true;
        }
    }

    /// Makes editability checks for `message` fail with [`TransportError::Unavailable`].
    pub fn fail_editability_checks(&self, message: MessageId) {
        self.state.lock().failing_checks.insert(message);
    }

    /// Makes member listing fail with [`TransportError::Unavailable`].
    pub fn set_members_unavailable(&self, unavailable: bool) {
        self.state.lock().members_unavailable = unavailable;
    }

    /// Current content of a recorded message.
    #[must_use]
    pub fn content(&self, message: &MessageId) -> Option<String> {
        self.state
            .lock()
            .messages
            .get(message)
            .map(|m| m.content.clone())
    }

    /// Conversation a recorded message belongs to.
    #[must_use]
    pub fn conversation_of(&self, message: &MessageId) -> Option<ConversationId> {
        self.state
            .lock()
            .messages
            .get(message)
            .map(|m| m.conversation_id.clone())
    }

    fn editable(&self, message: &PostedMessage) -> bool {
        if message.expired {
            return false;
        }
        self.edit_window
            .is_none_or(|window| message.posted_at.elapsed() < window)
    }
}

impl ChatTransport for MemoryTransport {
    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, TransportError> {
        self.state
            .lock()
            .conversations
            .get(id)
            .map(|(c, _)| c.clone())
            .ok_or_else(|| TransportError::UnknownConversation(id.clone()))
    }

    async fn members(&self, id: &ConversationId) -> Result<Vec<MemberInfo>, TransportError> {
        let state = self.state.lock();
        if state.members_unavailable {
            return Err(TransportError::Unavailable("member list".to_string()));
        }
        state
            .conversations
            .get(id)
            .map(|(_, members)| members.clone())
            .ok_or_else(|| TransportError::UnknownConversation(id.clone()))
    }

    async fn is_editable(&self, message: &MessageId) -> Result<bool, TransportError> {
        let state = self.state.lock();
        if state.failing_checks.contains(message) {
            return Err(TransportError::Unavailable(format!(
                "editability of {message}"
            )));
        }
        // A message the client no longer knows about cannot be edited.
        Ok(state.messages.get(message).is_some_and(|m| self.editable(m)))
    }

    async fn profile(&self) -> Result<MemberInfo, TransportError> {
        Ok(self.profile.clone())
    }

    async fn set_content(&self, message: &MessageId, content: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let Some(posted) = state.messages.get_mut(message) else {
            return Err(TransportError::UnknownMessage(message.clone()));
        };
        posted.content = content.to_string();
        Ok(())
    }
}
