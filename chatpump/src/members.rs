//! Per-conversation member directory.

use std::collections::HashMap;

use parking_lot::RwLock;

use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::MemberId;

/// Cached profile information for the members of one conversation.
///
/// Seeded from the transport when the conversation is registered and kept
/// current by the membership hooks. Handlers read it while the membership
/// hooks may write from another thread, so every method takes the lock.
#[derive(Debug, Default)]
pub struct UserDirectory {
    members: RwLock<HashMap<MemberId, MemberInfo>>,
}

impl UserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the directory contents with `members`.
    pub fn seed(&self, members: impl IntoIterator<Item = MemberInfo>) {
        let seeded: HashMap<MemberId, MemberInfo> = members
            .into_iter()
            .map(|m| (m.member_id.clone(), m))
            .collect();
        *self.members.write() = seeded;
    }

    /// Inserts or replaces a member, returning the previous profile.
    pub fn upsert(&self, member: MemberInfo) -> Option<MemberInfo> {
        self.members.write().insert(member.member_id.clone(), member)
    }

    /// Removes a member, returning its profile if it was present.
    pub fn remove(&self, member: &MemberId) -> Option<MemberInfo> {
        self.members.write().remove(member)
    }

    /// Profile of a member.
    #[must_use]
    pub fn get(&self, member: &MemberId) -> Option<MemberInfo> {
        self.members.read().get(member).cloned()
    }

    /// Display name of a member, falling back to the raw id.
    #[must_use]
    pub fn display_name(&self, member: &MemberId) -> String {
        self.members
            .read()
            .get(member)
            .map_or_else(|| member.to_string(), |m| m.display_name.clone())
    }

    /// Returns `true` if the member is known.
    #[must_use]
    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.read().contains_key(member)
    }

    /// Number of known members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Returns `true` if no members are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Point-in-time copy of all profiles, sorted by member id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> = self.members.read().values().cloned().collect();
        members.sort_by(|a, b| a.member_id.cmp(&b.member_id));
        members
    }
}
