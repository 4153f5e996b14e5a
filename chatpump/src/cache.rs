//! Cache of recently seen messages that may still be edited.
//!
//! The [`EditableMessageCache`] maps a message id to the last content the
//! engine saw for it. The consumer inserts an entry when it first processes
//! a normal message, the edit facade updates entries in place, and the
//! sweeper removes entries once the transport reports the message can no
//! longer be edited.
//!
//! Every write bumps a per-entry revision. The sweeper takes a
//! [`snapshot`](EditableMessageCache::snapshot) of ids and revisions, checks
//! editability without holding the lock, and then deletes through
//! [`remove_if_unchanged`](EditableMessageCache::remove_if_unchanged), so an
//! entry re-inserted or edited while the check was in flight survives.

use std::collections::HashMap;

use parking_lot::Mutex;

use chatpump_proto::message::MessageId;

/// Initial map capacity; conversations rarely have more live messages.
const INITIAL_CAPACITY: usize = 32;

#[derive(Debug)]
struct Entry {
    content: String,
    revision: u64,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<MessageId, Entry>,
    next_revision: u64,
}

impl Inner {
    const fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

/// A cache key together with the revision it had when snapshotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// The cached message.
    pub message_id: MessageId,
    /// Revision of the entry at snapshot time.
    pub revision: u64,
}

/// Thread-safe `MessageId -> content` map with revision tracking.
#[derive(Debug)]
pub struct EditableMessageCache {
    inner: Mutex<Inner>,
}

impl Default for EditableMessageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EditableMessageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(INITIAL_CAPACITY),
                next_revision: 0,
            }),
        }
    }

    /// Inserts or replaces the content for `id`, returning the previous content.
    pub fn put(&self, id: MessageId, content: impl Into<String>) -> Option<String> {
        let mut inner = self.inner.lock();
        let revision = inner.bump();
        inner
            .entries
            .insert(
                id,
                Entry {
                    content: content.into(),
                    revision,
                },
            )
            .map(|previous| previous.content)
    }

    /// Replaces the content for `id` only if it is already cached.
    ///
    /// Returns the previous content, or `None` if the message was never
    /// seen (in which case nothing changes).
    pub fn update(&self, id: &MessageId, content: impl Into<String>) -> Option<String> {
        let mut inner = self.inner.lock();
        let revision = inner.bump();
        let entry = inner.entries.get_mut(id)?;
        entry.revision = revision;
        Some(std::mem::replace(&mut entry.content, content.into()))
    }

    /// Last known content for `id`.
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<String> {
        self.inner
            .lock()
            .entries
            .get(id)
            .map(|entry| entry.content.clone())
    }

    /// Removes `id`, returning its content if it was cached.
    pub fn remove(&self, id: &MessageId) -> Option<String> {
        self.inner
            .lock()
            .entries
            .remove(id)
            .map(|entry| entry.content)
    }

    /// Removes `id` only if its revision still equals `revision`.
    ///
    /// Returns `true` if the entry was removed.
    pub fn remove_if_unchanged(&self, id: &MessageId, revision: u64) -> bool {
        let mut inner = self.inner.lock();
        let unchanged = inner
            .entries
            .get(id)
            .is_some_and(|entry| entry.revision == revision);
        if unchanged {
            inner.entries.remove(id);
        }
        unchanged
    }

    /// Point-in-time list of cached ids and their revisions.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SnapshotEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(id, entry)| SnapshotEntry {
                message_id: id.clone(),
                revision: entry.revision,
            })
            .collect()
    }

    /// Point-in-time copy of every cached id and content.
    #[must_use]
    pub fn to_map(&self) -> HashMap<MessageId, String> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.content.clone()))
            .collect()
    }

    /// Returns `true` if `id` is cached.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    /// Number of cached messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
