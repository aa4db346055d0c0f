//! Change batches delivered by the entity store.
//!
//! A batch holds one [`ChangeRecord`] per conversation touched by a store
//! save. Records are validated and coalesced before they reach the views:
//! malformed records are rejected individually and never abort the batch.

use crate::error::{DirectoryError, Result};
use crate::types::{Conversation, ConversationId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Observable conversation attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKey {
    RemoteId,
    DisplayName,
    IsArchived,
    IsPendingConnection,
    IsSilenced,
    CallState,
    SecurityLevel,
    ClearedAt,
    LastModified,
    EstimatedUnreadCount,
}

impl ConversationKey {
    pub const ALL: [ConversationKey; 10] = [
        ConversationKey::RemoteId,
        ConversationKey::DisplayName,
        ConversationKey::IsArchived,
        ConversationKey::IsPendingConnection,
        ConversationKey::IsSilenced,
        ConversationKey::CallState,
        ConversationKey::SecurityLevel,
        ConversationKey::ClearedAt,
        ConversationKey::LastModified,
        ConversationKey::EstimatedUnreadCount,
    ];

    /// Whether this attribute differs between two snapshots.
    fn differs(self, a: &Conversation, b: &Conversation) -> bool {
        match self {
            ConversationKey::RemoteId => a.remote_id != b.remote_id,
            ConversationKey::DisplayName => a.display_name != b.display_name,
            ConversationKey::IsArchived => a.is_archived != b.is_archived,
            ConversationKey::IsPendingConnection => {
                a.is_pending_connection != b.is_pending_connection
            }
            ConversationKey::IsSilenced => a.is_silenced != b.is_silenced,
            ConversationKey::CallState => a.call_state != b.call_state,
            ConversationKey::SecurityLevel => a.security_level() != b.security_level(),
            ConversationKey::ClearedAt => a.cleared_at != b.cleared_at,
            ConversationKey::LastModified => a.last_modified != b.last_modified,
            ConversationKey::EstimatedUnreadCount => {
                a.estimated_unread_count != b.estimated_unread_count
            }
        }
    }
}

/// One conversation's change inside a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: ConversationId,
    /// Snapshot before the save, absent for inserts.
    pub previous: Option<Conversation>,
    /// Snapshot after the save, absent for deletes.
    pub current: Option<Conversation>,
}

impl ChangeRecord {
    pub fn inserted(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            previous: None,
            current: Some(conversation),
        }
    }

    pub fn updated(previous: Conversation, current: Conversation) -> Self {
        Self {
            id: current.id,
            previous: Some(previous),
            current: Some(current),
        }
    }

    pub fn deleted(previous: Conversation) -> Self {
        Self {
            id: previous.id,
            previous: Some(previous),
            current: None,
        }
    }

    /// Check that the record carries a snapshot and that snapshots agree with
    /// the record's identifier.
    pub fn validate(&self) -> Result<()> {
        if self.previous.is_none() && self.current.is_none() {
            return Err(DirectoryError::MalformedChange(self.id));
        }

        for snapshot in [&self.previous, &self.current].into_iter().flatten() {
            if snapshot.id != self.id {
                return Err(DirectoryError::IdentifierMismatch {
                    expected: self.id,
                    got: snapshot.id,
                });
            }
        }

        Ok(())
    }

    /// Which observable attributes changed.
    ///
    /// Inserts and deletes report every attribute.
    pub fn change_info(&self) -> ConversationChangeInfo {
        let keys = match (&self.previous, &self.current) {
            (Some(prev), Some(cur)) => ConversationKey::ALL
                .into_iter()
                .filter(|key| key.differs(prev, cur))
                .collect(),
            _ => ConversationKey::ALL.into_iter().collect(),
        };

        ConversationChangeInfo {
            id: self.id,
            inserted: self.previous.is_none(),
            deleted: self.current.is_none(),
            changed_keys: keys,
        }
    }
}

/// Summary of what changed on one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationChangeInfo {
    pub id: ConversationId,
    pub inserted: bool,
    pub deleted: bool,
    pub changed_keys: BTreeSet<ConversationKey>,
}

impl ConversationChangeInfo {
    pub fn is_empty(&self) -> bool {
        !self.inserted && !self.deleted && self.changed_keys.is_empty()
    }

    pub fn touches(&self, keys: &[ConversationKey]) -> bool {
        self.inserted || self.deleted || keys.iter().any(|k| self.changed_keys.contains(k))
    }

    pub fn is_archived_changed(&self) -> bool {
        self.changed_keys.contains(&ConversationKey::IsArchived)
    }

    pub fn call_state_changed(&self) -> bool {
        self.changed_keys.contains(&ConversationKey::CallState)
    }

    pub fn security_level_changed(&self) -> bool {
        self.changed_keys.contains(&ConversationKey::SecurityLevel)
    }

    pub fn cleared_changed(&self) -> bool {
        self.changed_keys.contains(&ConversationKey::ClearedAt)
    }

    pub fn last_modified_changed(&self) -> bool {
        self.changed_keys.contains(&ConversationKey::LastModified)
    }

    pub fn connection_state_changed(&self) -> bool {
        self.changed_keys.contains(&ConversationKey::IsPendingConnection)
    }
}

/// A change record that was skipped, with the reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedChange {
    /// Position of the record in the submitted batch.
    pub position: usize,
    pub id: ConversationId,
    pub error: DirectoryError,
}

/// All conversation changes of one store save.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    records: Vec<ChangeRecord>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: ChangeRecord) {
        self.records.push(record);
    }

    pub fn with(mut self, record: ChangeRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Validate every record and merge repeated identifiers.
    ///
    /// For an identifier that appears several times, the earliest previous
    /// snapshot and the latest current snapshot are kept, at the position of
    /// its first appearance. A conversation inserted and deleted within the
    /// batch merges to nothing and is left out.
    pub fn coalesce(self) -> (Vec<ChangeRecord>, Vec<RejectedChange>) {
        let mut merged: Vec<ChangeRecord> = Vec::with_capacity(self.records.len());
        let mut positions: HashMap<ConversationId, usize> = HashMap::new();
        let mut rejected = Vec::new();

        for (position, record) in self.records.into_iter().enumerate() {
            if let Err(error) = record.validate() {
                rejected.push(RejectedChange {
                    position,
                    id: record.id,
                    error,
                });
                continue;
            }

            match positions.get(&record.id) {
                Some(&slot) => merged[slot].current = record.current,
                None => {
                    positions.insert(record.id, merged.len());
                    merged.push(record);
                }
            }
        }

        merged.retain(|r| r.previous.is_some() || r.current.is_some());
        (merged, rejected)
    }
}

impl FromIterator<ChangeRecord> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = ChangeRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
