//! Fixed catalog of conversation views.
//!
//! Each [`ViewKind`] pairs a membership predicate with a sort order. Both are
//! pure functions of a single conversation snapshot, so a change to one
//! conversation never affects the position of another.

use crate::types::{CallState, Conversation, ConversationId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

/// A named view of the directory, in registry order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewKind {
    /// Not pending, no call, archived or not.
    UnarchivedAndNotCalling,
    /// Not pending, unarchived, any call state.
    IncludingArchived,
    /// Archived, not pending, no call.
    Archived,
    /// Waiting for a connection request to be accepted.
    PendingConnection,
    /// Ringing, outgoing, connected elsewhere, or active.
    NonIdleCall,
    /// Actively talking on this device. At most one, barring bugs.
    ActiveCall,
    /// History was cleared.
    Cleared,
}

impl ViewKind {
    /// Every view, in registry order.
    pub const ALL: [ViewKind; 7] = [
        ViewKind::UnarchivedAndNotCalling,
        ViewKind::IncludingArchived,
        ViewKind::Archived,
        ViewKind::PendingConnection,
        ViewKind::NonIdleCall,
        ViewKind::ActiveCall,
        ViewKind::Cleared,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ViewKind::UnarchivedAndNotCalling => "unarchived-and-not-calling",
            ViewKind::IncludingArchived => "including-archived",
            ViewKind::Archived => "archived",
            ViewKind::PendingConnection => "pending-connection",
            ViewKind::NonIdleCall => "non-idle-call",
            ViewKind::ActiveCall => "active-call",
            ViewKind::Cleared => "cleared",
        }
    }

    pub fn from_name(name: &str) -> Option<ViewKind> {
        ViewKind::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Position in [`ViewKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Membership predicate.
    pub fn matches(self, c: &Conversation) -> bool {
        match self {
            ViewKind::UnarchivedAndNotCalling => {
                !c.is_pending_connection && c.call_state.is_idle()
            }
            ViewKind::IncludingArchived => !c.is_pending_connection && !c.is_archived,
            ViewKind::Archived => {
                c.is_archived && !c.is_pending_connection && c.call_state.is_idle()
            }
            ViewKind::PendingConnection => c.is_pending_connection,
            ViewKind::NonIdleCall => !c.call_state.is_idle(),
            ViewKind::ActiveCall => c.call_state == CallState::Active,
            ViewKind::Cleared => c.cleared_at.is_some(),
        }
    }

    /// Position of `c` inside this view.
    pub fn sort_key(self, c: &Conversation) -> SortKey {
        let (rank, time) = match self {
            ViewKind::NonIdleCall => (c.call_state.priority(), c.last_modified),
            ViewKind::Cleared => (0, c.cleared_at.unwrap_or_default()),
            _ => (0, c.last_modified),
        };

        SortKey {
            rank,
            time: Reverse(time),
            id: c.id,
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Total order inside a view: rank ascending, time descending, then id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub rank: u8,
    pub time: Reverse<Timestamp>,
    pub id: ConversationId,
}
