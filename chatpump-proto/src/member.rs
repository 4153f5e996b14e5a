//! Conversation member profile data.

use serde::{Deserialize, Serialize};

use crate::message::MemberId;

/// Role a member holds inside a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Created the conversation or administers it.
    Admin,
    /// Regular participant.
    #[default]
    Member,
    /// Can read but not post.
    Listener,
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Member => write!(f, "member"),
            Self::Listener => write!(f, "listener"),
        }
    }
}

/// Cached profile information for one conversation member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Transport identity of the member.
    pub member_id: MemberId,
    /// Human-readable name shown in the chat client.
    pub display_name: String,
    /// Role inside the conversation.
    #[serde(default)]
    pub role: MemberRole,
}

impl MemberInfo {
    /// Creates profile information with the default [`MemberRole::Member`] role.
    pub fn new(member_id: MemberId, display_name: impl Into<String>) -> Self {
        Self {
            member_id,
            display_name: display_name.into(),
            role: MemberRole::default(),
        }
    }

    /// Returns the same profile with a different role.
    #[must_use]
    pub const fn with_role(mut self, role: MemberRole) -> Self {
        self.role = role;
        self
    }
}
