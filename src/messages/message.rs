//! Message delivery lifecycle.

use crate::error::{DirectoryError, Result};
use crate::security::ClientId;
use crate::types::{ConversationId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default time a locally sent message may wait for the server.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60);

/// Client-generated unique token identifying a message.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageNonce(pub Uuid);

impl MessageNonce {
    pub fn random() -> Self {
        MessageNonce(Uuid::new_v4())
    }
}

impl fmt::Debug for MessageNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageNonce({})", self.0)
    }
}

impl fmt::Display for MessageNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server event identifier, assigned when the backend accepts a message.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        EventId(id.into())
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Knock,
    System,
}

/// Where a message is in its delivery lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Created locally, not sent yet.
    Pending,
    SentAwaitingAck,
    Delivered,
    /// The expiration deadline passed without an acknowledgement.
    Expired,
    /// Tombstoned.
    Removed,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryState::Pending => "pending",
            DeliveryState::SentAwaitingAck => "awaiting acknowledgement",
            DeliveryState::Delivered => "delivered",
            DeliveryState::Expired => "expired",
            DeliveryState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// How a server confirmation was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The message had already expired; the confirmation started a new send
    /// attempt instead of marking it delivered.
    Resent,
    /// The message was already delivered; nothing changed.
    AlreadyDelivered,
}

/// Expiration settings for locally sent messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub default_expiration: Duration,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            default_expiration: DEFAULT_EXPIRATION,
        }
    }
}

impl ExpirationPolicy {
    pub fn deadline(&self, now: Timestamp) -> Timestamp {
        now.after(self.default_expiration)
    }
}

/// A message as far as delivery and ordering are concerned.
///
/// The owning conversation is referenced by id only; messages never hold
/// conversation snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub nonce: MessageNonce,
    pub conversation: ConversationId,
    pub kind: MessageKind,
    pub sender_client_id: Option<ClientId>,
    /// Sent by the self user from this device.
    pub is_outgoing: bool,
    pub created_at: Timestamp,
    pub server_timestamp: Option<Timestamp>,
    event_id: Option<EventId>,
    expiration_date: Option<Timestamp>,
    is_expired: bool,
    is_sent: bool,
    is_removed: bool,
    send_attempts: u32,
}

impl Message {
    /// A message composed on this device, not sent yet.
    pub fn outgoing(
        conversation: ConversationId,
        kind: MessageKind,
        sender_client_id: Option<ClientId>,
        now: Timestamp,
    ) -> Self {
        Self {
            nonce: MessageNonce::random(),
            conversation,
            kind,
            sender_client_id,
            is_outgoing: true,
            created_at: now,
            server_timestamp: None,
            event_id: None,
            expiration_date: None,
            is_expired: false,
            is_sent: false,
            is_removed: false,
            send_attempts: 0,
        }
    }

    /// A message received from the backend; already delivered.
    pub fn incoming(
        nonce: MessageNonce,
        event_id: EventId,
        conversation: ConversationId,
        kind: MessageKind,
        sender_client_id: Option<ClientId>,
        server_timestamp: Timestamp,
    ) -> Self {
        Self {
            nonce,
            conversation,
            kind,
            sender_client_id,
            is_outgoing: false,
            created_at: server_timestamp,
            server_timestamp: Some(server_timestamp),
            event_id: Some(event_id),
            expiration_date: None,
            is_expired: false,
            is_sent: true,
            is_removed: false,
            send_attempts: 0,
        }
    }

    pub fn event_id(&self) -> Option<&EventId> {
        self.event_id.as_ref()
    }

    pub fn expiration_date(&self) -> Option<Timestamp> {
        self.expiration_date
    }

    /// Whether expiry has been recorded (see [`Message::expire_if_due`]).
    pub fn is_expired(&self) -> bool {
        self.is_expired
    }

    pub fn is_removed(&self) -> bool {
        self.is_removed
    }

    pub fn send_attempts(&self) -> u32 {
        self.send_attempts
    }

    /// Timestamp used for ordering inside a conversation.
    pub fn sort_timestamp(&self) -> Timestamp {
        self.server_timestamp.unwrap_or(self.created_at)
    }

    /// Delivery state as of `now`.
    ///
    /// Expiry is evaluated lazily: a sent message whose deadline is behind
    /// `now` reports `Expired` even if nobody recorded it yet.
    pub fn delivery_state(&self, now: Timestamp) -> DeliveryState {
        if self.is_removed {
            DeliveryState::Removed
        } else if self.event_id.is_some() {
            DeliveryState::Delivered
        } else if self.is_expired || (self.is_sent && self.deadline_passed(now)) {
            DeliveryState::Expired
        } else if self.is_sent {
            DeliveryState::SentAwaitingAck
        } else {
            DeliveryState::Pending
        }
    }

    fn deadline_passed(&self, now: Timestamp) -> bool {
        self.expiration_date.is_some_and(|deadline| now > deadline)
    }

    /// Unacknowledged, with no expiry recorded yet, and due before `instant`.
    ///
    /// A deadline that has already passed still counts until
    /// [`Message::expire_if_due`] records it, so a timer that woke up late
    /// finds the messages it has to expire. [`Message::delivery_state`]
    /// already reports such a message as expired.
    pub fn will_expire_before(&self, instant: Timestamp) -> bool {
        !self.is_removed
            && self.is_sent
            && self.event_id.is_none()
            && !self.is_expired
            && self.expiration_date.is_some_and(|deadline| deadline < instant)
    }

    /// Counts towards the conversation's unread count.
    pub fn should_generate_unread_count(&self) -> bool {
        !self.is_outgoing && !self.is_removed && self.kind != MessageKind::System
    }

    /// Pending → SentAwaitingAck, opening the expiration window.
    pub fn mark_sent(&mut self, now: Timestamp, policy: &ExpirationPolicy) -> Result<()> {
        match self.delivery_state(now) {
            DeliveryState::Pending => {
                self.start_attempt(now, policy);
                Ok(())
            }
            from => Err(DirectoryError::InvalidTransition {
                from,
                action: "send",
            }),
        }
    }

    /// Handle the server's acknowledgement.
    pub fn confirm_delivery(
        &mut self,
        event_id: EventId,
        now: Timestamp,
        policy: &ExpirationPolicy,
    ) -> Result<DeliveryOutcome> {
        match self.delivery_state(now) {
            DeliveryState::SentAwaitingAck => {
                self.event_id = Some(event_id);
                self.expiration_date = None;
                self.server_timestamp.get_or_insert(now);
                Ok(DeliveryOutcome::Delivered)
            }
            DeliveryState::Expired => {
                self.start_attempt(now, policy);
                Ok(DeliveryOutcome::Resent)
            }
            DeliveryState::Delivered => Ok(DeliveryOutcome::AlreadyDelivered),
            from => Err(DirectoryError::InvalidTransition {
                from,
                action: "confirm",
            }),
        }
    }

    /// Record expiry if the deadline passed. Returns true if the message
    /// expired on this call.
    pub fn expire_if_due(&mut self, now: Timestamp) -> bool {
        if !self.is_expired && self.delivery_state(now) == DeliveryState::Expired {
            self.is_expired = true;
            true
        } else {
            false
        }
    }

    /// Force expiry of an unacknowledged message, e.g. after a permanent
    /// send failure.
    pub fn expire(&mut self, now: Timestamp) -> Result<()> {
        match self.delivery_state(now) {
            DeliveryState::SentAwaitingAck | DeliveryState::Expired => {
                self.is_expired = true;
                Ok(())
            }
            from => Err(DirectoryError::InvalidTransition {
                from,
                action: "expire",
            }),
        }
    }

    /// Expired → SentAwaitingAck with a new expiration window.
    pub fn resend(&mut self, now: Timestamp, policy: &ExpirationPolicy) -> Result<()> {
        match self.delivery_state(now) {
            DeliveryState::Expired => {
                self.start_attempt(now, policy);
                Ok(())
            }
            from => Err(DirectoryError::InvalidTransition {
                from,
                action: "resend",
            }),
        }
    }

    /// Tombstone the message. It keeps its place in the conversation.
    pub fn remove(&mut self) -> Result<()> {
        if self.is_removed {
            return Err(DirectoryError::InvalidTransition {
                from: DeliveryState::Removed,
                action: "remove",
            });
        }
        self.is_removed = true;
        self.expiration_date = None;
        Ok(())
    }

    fn start_attempt(&mut self, now: Timestamp, policy: &ExpirationPolicy) {
        self.is_sent = true;
        self.is_expired = false;
        self.expiration_date = Some(policy.deadline(now));
        self.send_attempts += 1;
    }
}

/// Messages that will expire before `instant`, soonest first.
///
/// Meant for a caller-owned timer deciding when to wake up next. Overdue
/// messages whose expiry is not recorded yet are included.
pub fn expiring_before<'a, I>(messages: I, instant: Timestamp) -> Vec<&'a Message>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut due: Vec<&Message> = messages
        .into_iter()
        .filter(|m| m.will_expire_before(instant))
        .collect();
    due.sort_by_key(|m| (m.expiration_date, m.nonce));
    due
}
