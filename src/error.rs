//! Error types for the conversation directory.

use crate::messages::{DeliveryState, MessageNonce};
use crate::types::ConversationId;
use thiserror::Error;

/// Main error type for directory and lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Unknown view: {0}")]
    UnknownView(String),

    #[error("Malformed change for conversation {0}: neither previous nor current snapshot")]
    MalformedChange(ConversationId),

    #[error("Change for conversation {expected} carries a snapshot of conversation {got}")]
    IdentifierMismatch {
        expected: ConversationId,
        got: ConversationId,
    },

    #[error("Message not found: {0}")]
    MessageNotFound(MessageNonce),

    #[error("Invalid message transition: cannot {action} a message that is {from}")]
    InvalidTransition {
        from: DeliveryState,
        action: &'static str,
    },

    #[error("Subscription was dropped")]
    SubscriptionDropped,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;
