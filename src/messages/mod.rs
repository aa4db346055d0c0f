//! Message lifecycle.
//!
//! ```text
//!   Pending ──send──▶ SentAwaitingAck ──confirm──▶ Delivered
//!                        │      ▲
//!            deadline    │      │ resend / late confirm
//!                        ▼      │
//!                        Expired
//!
//!   any state ──remove──▶ Removed
//! ```
//!
//! Expiry is lazy: the state of a sent message is computed against a caller
//! supplied `now`, and [`MessageIndex::expire_due`] records it in bulk.

mod index;
mod message;

pub use index::MessageIndex;
pub use message::{
    expiring_before, DeliveryOutcome, DeliveryState, EventId, ExpirationPolicy, Message,
    MessageKind, MessageNonce, DEFAULT_EXPIRATION,
};
