//! # Conversation Directory
//!
//! Named, live, sorted and filtered views over a client's conversations,
//! kept up to date incrementally from the change batches of the entity
//! store.
//!
//! ## Core Concepts
//!
//! - **Registry**: A fixed catalog of views, each a predicate plus a sort order
//! - **Live views**: Sorted members maintained per batch without rescans
//! - **Directory**: Fans each batch out to every view and publishes them together
//! - **Security levels**: Per-conversation trust state machine
//! - **Messages**: Delivery lifecycle with lazy expiration
//!
//! ## Example
//!
//! ```ignore
//! use conversation_directory::{ChangeBatch, ChangeRecord, Directory, ViewKind};
//!
//! let directory = Directory::default();
//! directory.load(conversations);
//!
//! // Observe a view
//! let archived = directory.view(ViewKind::Archived);
//! let updates = archived.subscribe();
//!
//! // Feed a store save
//! let report = directory.ingest(ChangeBatch::new().with(ChangeRecord::updated(before, after)));
//! println!("{:?}", report.delta(ViewKind::Archived));
//! ```

pub mod changes;
pub mod directory;
pub mod error;
pub mod messages;
pub mod registry;
pub mod security;
pub mod subscriptions;
pub mod types;
pub mod view;

// Re-exports
pub use changes::{ChangeBatch, ChangeRecord, ConversationChangeInfo, ConversationKey, RejectedChange};
pub use directory::{Directory, DirectoryConfig, DirectorySnapshot, IngestReport, ViewHandle};
pub use error::{DirectoryError, Result};
pub use messages::{
    expiring_before, DeliveryOutcome, DeliveryState, EventId, ExpirationPolicy, Message,
    MessageIndex, MessageKind, MessageNonce,
};
pub use registry::{SortKey, ViewKind};
pub use security::{
    ClientId, DeviceTrust, ParticipantDevices, SecurityLevel, SecurityState, SecurityTransition,
    TrustEvent,
};
pub use subscriptions::{
    DirectoryEvent, DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
pub use view::{LiveView, Members, Moved, Positioned, ViewDelta};
