//! Core conversation types shared by the registry, views, and directory.

use crate::security::{SecurityLevel, SecurityState, SecurityTransition, TrustEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable local identifier for a conversation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub u64);

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationId({})", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend identifier, assigned once the conversation is synchronized.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId(pub Uuid);

impl RemoteId {
    pub fn random() -> Self {
        RemoteId(Uuid::new_v4())
    }
}

impl fmt::Debug for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteId({})", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }

    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// This instant shifted forward by `duration`.
    pub fn after(self, duration: Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Voice channel state of a conversation as seen by this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    /// Someone else is calling us.
    Ringing,
    /// We are calling and nobody has joined yet.
    Outgoing,
    /// A call is ongoing on another device of the self user, or among other
    /// participants of a group.
    ConnectedOtherDevice,
    /// This device is talking.
    Active,
}

impl CallState {
    pub fn is_idle(self) -> bool {
        self == CallState::Idle
    }

    /// Ordering rank inside the non-idle call view; lower sorts first.
    pub fn priority(self) -> u8 {
        match self {
            CallState::Active => 0,
            CallState::ConnectedOtherDevice => 1,
            CallState::Ringing => 2,
            CallState::Outgoing => 3,
            CallState::Idle => 4,
        }
    }
}

/// Snapshot of a conversation as delivered by the entity store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub remote_id: Option<RemoteId>,
    pub display_name: String,
    pub is_archived: bool,
    pub is_pending_connection: bool,
    pub is_silenced: bool,
    pub call_state: CallState,
    pub security: SecurityState,
    /// Set when the history was cleared; the conversation itself stays.
    pub cleared_at: Option<Timestamp>,
    pub last_modified: Timestamp,
    pub estimated_unread_count: u32,
}

impl Conversation {
    /// A fresh, unarchived, idle, not secure conversation.
    pub fn new(id: ConversationId, last_modified: Timestamp) -> Self {
        Self {
            id,
            remote_id: None,
            display_name: String::new(),
            is_archived: false,
            is_pending_connection: false,
            is_silenced: false,
            call_state: CallState::Idle,
            security: SecurityState::default(),
            cleared_at: None,
            last_modified,
            estimated_unread_count: 0,
        }
    }

    pub fn with_remote_id(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.is_archived = archived;
        self
    }

    pub fn with_pending_connection(mut self, pending: bool) -> Self {
        self.is_pending_connection = pending;
        self
    }

    pub fn with_call_state(mut self, state: CallState) -> Self {
        self.call_state = state;
        self
    }

    pub fn with_cleared_at(mut self, cleared_at: Option<Timestamp>) -> Self {
        self.cleared_at = cleared_at;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Timestamp) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security.level()
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared_at.is_some()
    }

    /// Feed a device-trust event through the security state machine.
    pub fn apply_trust_event(&mut self, event: TrustEvent) -> SecurityTransition {
        self.security.apply(event)
    }
}
