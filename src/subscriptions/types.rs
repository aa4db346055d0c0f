//! Subscription types for live directory updates.

use crate::changes::ConversationChangeInfo;
use crate::error::DirectoryError;
use crate::registry::ViewKind;
use crate::types::ConversationId;
use crate::view::ViewDelta;
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Send the current members of every subscribed view before going live.
    pub send_initial_snapshot: bool,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            send_initial_snapshot: true,
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Views to follow (None = all views).
    pub views: Option<Vec<ViewKind>>,

    /// Conversations to follow (None = all conversations).
    pub conversations: Option<Vec<ConversationId>>,

    /// Include view delta events.
    pub include_view_changes: bool,

    /// Include per-conversation change events.
    pub include_conversation_changes: bool,
}

impl SubscriptionFilter {
    /// Follow one view.
    pub fn view(kind: ViewKind) -> Self {
        Self::views(vec![kind])
    }

    /// Follow specific views.
    pub fn views(kinds: Vec<ViewKind>) -> Self {
        Self {
            views: Some(kinds),
            include_view_changes: true,
            ..Default::default()
        }
    }

    /// Follow changes to specific conversations.
    pub fn conversations(ids: Vec<ConversationId>) -> Self {
        Self {
            conversations: Some(ids),
            include_conversation_changes: true,
            ..Default::default()
        }
    }

    /// Follow everything.
    pub fn all() -> Self {
        Self {
            include_view_changes: true,
            include_conversation_changes: true,
            ..Default::default()
        }
    }

    pub fn wants_view(&self, kind: ViewKind) -> bool {
        if !self.include_view_changes {
            return false;
        }
        match &self.views {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }

    pub fn wants_conversation(&self, id: ConversationId) -> bool {
        if !self.include_conversation_changes {
            return false;
        }
        match &self.conversations {
            Some(ids) => ids.contains(&id),
            None => true,
        }
    }

    /// Views this filter follows, in registry order.
    pub fn followed_views(&self) -> Vec<ViewKind> {
        ViewKind::ALL
            .into_iter()
            .filter(|kind| self.wants_view(*kind))
            .collect()
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryEvent {
    // --- View Events ---
    /// Members of a view when the subscription started.
    ViewSnapshot {
        view: ViewKind,
        version: u64,
        members: Vec<ConversationId>,
    },

    /// One ingested batch changed a view.
    ViewChanged {
        view: ViewKind,
        version: u64,
        delta: ViewDelta,
    },

    /// Every view was rebuilt from a full enumeration; re-read the members.
    Reloaded {
        version: u64,
    },

    // --- Conversation Events ---
    /// Observable attributes of a conversation changed.
    ConversationChanged {
        version: u64,
        change: ConversationChangeInfo,
    },

    // --- Lifecycle Events ---
    /// Finished the initial snapshot, now streaming live.
    CaughtUp,

    /// Subscription was dropped.
    Dropped {
        reason: DropReason,
    },
}

impl DirectoryEvent {
    /// Encode as tagged JSON for a host bridge.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string(self).map_err(|e| DirectoryError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        serde_json::from_str(json).map_err(|e| DirectoryError::Deserialization(e.to_string()))
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// The subscription targeted a view that is not registered.
    UnknownView(String),
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<DirectoryEvent>,
}

impl SubscriptionHandle {
    /// A handle that was never registered. It yields a single `Dropped`
    /// event and then disconnects.
    pub(crate) fn dropped(reason: DropReason) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let _ = sender.send(DirectoryEvent::Dropped { reason });
        Self {
            id: SubscriptionId(0),
            receiver,
        }
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<DirectoryEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<DirectoryEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<DirectoryEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Every event currently buffered.
    pub fn drain(&self) -> Vec<DirectoryEvent> {
        self.receiver.try_iter().collect()
    }
}
