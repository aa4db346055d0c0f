//! Subscription system for live directory updates.
//!
//! This module provides in-process subscriptions to directory events:
//! - View deltas (one per view per ingested batch)
//! - Conversation attribute changes
//! - Full reloads after a cold start or account switch
//!
//! Subscriptions support:
//! - Filtering by view and by conversation
//! - An initial members snapshot before live events
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let archived = directory.view(ViewKind::Archived);
//! let handle = archived.subscribe();
//!
//! loop {
//!     match handle.recv() {
//!         Ok(DirectoryEvent::ViewSnapshot { members, .. }) => render(members),
//!         Ok(DirectoryEvent::ViewChanged { delta, .. }) => apply(delta),
//!         Ok(DirectoryEvent::Dropped { .. }) => break,
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DirectoryEvent, DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
