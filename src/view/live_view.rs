//! Writer-side state of one view.

use super::delta::{Moved, Positioned, ViewDelta};
use super::members::Members;
use crate::changes::{ChangeBatch, ChangeRecord};
use crate::registry::{SortKey, ViewKind};
use crate::types::{Conversation, ConversationId};
use im::{HashMap, Vector};

/// One registry entry's sorted members.
///
/// Owned by the directory; consumers only ever see [`Members`] snapshots.
#[derive(Clone, Debug)]
pub struct LiveView {
    kind: ViewKind,
    /// Sorted by `SortKey`, which ends in the conversation id.
    entries: Vector<SortKey>,
    /// Current key of every member.
    keys: HashMap<ConversationId, SortKey>,
}

/// What a batch does to one conversation in this view.
struct Planned {
    id: ConversationId,
    old: Option<SortKey>,
    new: Option<SortKey>,
    snapshot_changed: bool,
}

impl LiveView {
    pub fn new(kind: ViewKind) -> Self {
        Self {
            kind,
            entries: Vector::new(),
            keys: HashMap::new(),
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Snapshot of the current members. O(1).
    pub fn current_members(&self) -> Members {
        Members::new(self.entries.clone(), self.keys.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Index of a member. O(log n).
    pub fn position(&self, id: ConversationId) -> Option<usize> {
        let key = self.keys.get(&id)?;
        self.entries.binary_search(key).ok()
    }

    /// Replace the members with the matching subset of `conversations`.
    pub fn rebuild<'a, I>(&mut self, conversations: I)
    where
        I: IntoIterator<Item = &'a Conversation>,
    {
        let kind = self.kind;
        self.keys = conversations
            .into_iter()
            .filter(|c| kind.matches(c))
            .map(|c| (c.id, kind.sort_key(c)))
            .collect();

        let mut sorted: Vec<SortKey> = self.keys.values().copied().collect();
        sorted.sort_unstable();
        self.entries = sorted.into_iter().collect();
    }

    /// Apply a batch and describe what changed.
    ///
    /// Repeated identifiers are merged and malformed records are skipped,
    /// the same way [`Directory::ingest`](crate::Directory::ingest) treats
    /// them. Whether a conversation was a member before is read from this
    /// view, not from the record's previous snapshot, so replaying a batch is
    /// a no-op.
    pub fn apply(&mut self, batch: ChangeBatch) -> ViewDelta {
        let (records, rejected) = batch.coalesce();
        for r in &rejected {
            tracing::warn!(
                view = self.name(),
                position = r.position,
                conversation = %r.id,
                error = %r.error,
                "skipping change record"
            );
        }
        self.apply_coalesced(&records)
    }

    /// Apply records that already went through [`ChangeBatch::coalesce`].
    pub(crate) fn apply_coalesced(&mut self, records: &[ChangeRecord]) -> ViewDelta {
        let plan: Vec<Planned> = records
            .iter()
            .filter_map(|record| self.plan(record))
            .collect();

        if plan.is_empty() {
            return ViewDelta::default();
        }

        let before = self.entries.clone();
        let from: Vec<Option<usize>> = plan
            .iter()
            .map(|p| p.old.and_then(|k| before.binary_search(&k).ok()))
            .collect();

        for p in plan.iter().filter(|p| p.old.is_some() && p.old != p.new) {
            if let Some(old) = p.old {
                if let Ok(index) = self.entries.binary_search(&old) {
                    self.entries.remove(index);
                }
                self.keys.remove(&p.id);
            }
        }

        for p in plan.iter().filter(|p| p.new.is_some() && p.old != p.new) {
            if let Some(new) = p.new {
                let index = match self.entries.binary_search(&new) {
                    Ok(index) | Err(index) => index,
                };
                self.entries.insert(index, new);
                self.keys.insert(p.id, new);
            }
        }

        let mut delta = ViewDelta::default();
        for (p, from) in plan.iter().zip(from) {
            let to = p.new.and_then(|k| self.entries.binary_search(&k).ok());
            match (from, to) {
                (Some(index), None) => delta.removed.push(Positioned { id: p.id, index }),
                (None, Some(index)) => delta.inserted.push(Positioned { id: p.id, index }),
                // A changed key is always reported as a move, even to the
                // same index, so that replaying the delta stays exact.
                (Some(from), Some(to)) if p.old != p.new => {
                    delta.moved.push(Moved { id: p.id, from, to })
                }
                (Some(_), Some(_)) if p.snapshot_changed => delta.updated.push(p.id),
                _ => {}
            }
        }

        delta.removed.sort_unstable_by_key(|p| p.index);
        delta.inserted.sort_unstable_by_key(|p| p.index);
        delta.moved.sort_unstable_by_key(|m| m.to);
        delta
    }

    fn plan(&self, record: &ChangeRecord) -> Option<Planned> {
        let old = self.keys.get(&record.id).copied();
        let new = record
            .current
            .as_ref()
            .filter(|c| self.kind.matches(c))
            .map(|c| self.kind.sort_key(c));

        if old.is_none() && new.is_none() {
            return None;
        }

        Some(Planned {
            id: record.id,
            old,
            new,
            snapshot_changed: record.previous.as_ref() != record.current.as_ref(),
        })
    }
}
