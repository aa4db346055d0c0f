//! Immutable view member snapshots.

use crate::registry::SortKey;
use crate::types::ConversationId;
use im::{HashMap, Vector};

/// Ordered members of a view at one published version.
///
/// Cloning is O(1); the entries share structure with the view they were
/// taken from and cannot be mutated by consumers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Members {
    entries: Vector<SortKey>,
    keys: HashMap<ConversationId, SortKey>,
}

impl Members {
    pub(crate) fn new(entries: Vector<SortKey>, keys: HashMap<ConversationId, SortKey>) -> Self {
        Self { entries, keys }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ConversationId> {
        self.entries.get(index).map(|key| key.id)
    }

    pub fn first(&self) -> Option<ConversationId> {
        self.entries.front().map(|key| key.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ConversationId> + '_ {
        self.entries.iter().map(|key| key.id)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Index of a member. O(log n).
    pub fn index_of(&self, id: ConversationId) -> Option<usize> {
        let key = self.keys.get(&id)?;
        self.entries.binary_search(key).ok()
    }

    /// Sort key of a member.
    pub fn key_of(&self, id: ConversationId) -> Option<SortKey> {
        self.keys.get(&id).copied()
    }

    pub fn to_vec(&self) -> Vec<ConversationId> {
        self.iter().collect()
    }

    /// Sort keys in member order.
    pub fn keys(&self) -> impl Iterator<Item = &SortKey> + '_ {
        self.entries.iter()
    }
}
