//! The bot's own account identity.

use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::MemberId;

use crate::transport::{ChatTransport, TransportError};

/// Identity of the account the bot runs as.
///
/// Resolved once at startup and shared with every coordinator, so handlers
/// and the registry can tell the bot's own messages apart from others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    /// Transport identity of the bot's account.
    pub member_id: MemberId,
    /// Full name shown for the bot's account.
    pub display_name: String,
}

impl BotIdentity {
    /// Creates an identity from known values.
    pub fn new(member_id: MemberId, display_name: impl Into<String>) -> Self {
        Self {
            member_id,
            display_name: display_name.into(),
        }
    }

    /// Fetches the identity from the transport's profile.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] if the profile cannot be loaded. The
    /// caller should treat this as a startup failure.
    pub async fn resolve<T: ChatTransport>(transport: &T) -> Result<Self, TransportError> {
        let profile = transport.profile().await?;
        tracing::info!(
            bot_id = %profile.member_id,
            bot_name = %profile.display_name,
            "resolved bot identity"
        );
        Ok(Self::from(profile))
    }

    /// Returns `true` if `member` is the bot's own account.
    #[must_use]
    pub fn is_self(&self, member: &MemberId) -> bool {
        self.member_id == *member
    }
}

impl From<MemberInfo> for BotIdentity {
    fn from(info: MemberInfo) -> Self {
        Self {
            member_id: info.member_id,
            display_name: info.display_name,
        }
    }
}
