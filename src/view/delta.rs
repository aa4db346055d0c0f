//! Per-batch view deltas.

use crate::types::ConversationId;
use serde::{Deserialize, Serialize};

/// A conversation at an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Positioned {
    pub id: ConversationId,
    pub index: usize,
}

/// A conversation that changed position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moved {
    pub id: ConversationId,
    /// Index in the sequence before the batch.
    pub from: usize,
    /// Index in the sequence after the batch.
    pub to: usize,
}

/// Everything one batch did to one view.
///
/// `removed` and `Moved::from` index the sequence before the batch;
/// `inserted` and `Moved::to` index the sequence after it. Both position
/// lists are ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDelta {
    pub inserted: Vec<Positioned>,
    pub removed: Vec<Positioned>,
    /// Members whose sort key changed. `from` may equal `to`.
    pub moved: Vec<Moved>,
    /// Members whose snapshot changed while keeping their sort key.
    pub updated: Vec<ConversationId>,
}

impl ViewDelta {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.removed.is_empty()
            && self.moved.is_empty()
            && self.updated.is_empty()
    }

    /// Whether the member sequence itself changed.
    pub fn changes_order(&self) -> bool {
        !self.inserted.is_empty() || !self.removed.is_empty() || !self.moved.is_empty()
    }

    pub fn inserted_ids(&self) -> Vec<ConversationId> {
        self.inserted.iter().map(|p| p.id).collect()
    }

    pub fn removed_ids(&self) -> Vec<ConversationId> {
        self.removed.iter().map(|p| p.id).collect()
    }

    pub fn moved_ids(&self) -> Vec<ConversationId> {
        self.moved.iter().map(|m| m.id).collect()
    }

    /// Replay this delta on the sequence it was computed against.
    ///
    /// Removals (including the source slots of moves) are applied from the
    /// highest index down, then insertions (including move targets) from the
    /// lowest index up. This is how a list UI consumes the delta.
    pub fn replay(&self, before: &[ConversationId]) -> Vec<ConversationId> {
        let mut from: Vec<usize> = self
            .removed
            .iter()
            .map(|p| p.index)
            .chain(self.moved.iter().map(|m| m.from))
            .collect();
        from.sort_unstable();

        let mut after = before.to_vec();
        for index in from.into_iter().rev() {
            if index < after.len() {
                after.remove(index);
            }
        }

        let mut to: Vec<(usize, ConversationId)> = self
            .inserted
            .iter()
            .map(|p| (p.index, p.id))
            .chain(self.moved.iter().map(|m| (m.to, m.id)))
            .collect();
        to.sort_unstable_by_key(|(index, _)| *index);

        for (index, id) in to {
            let index = index.min(after.len());
            after.insert(index, id);
        }

        after
    }
}
