//! Incrementally maintained conversation views.
//!
//! A [`LiveView`] holds the sorted members of one registry entry. Applying a
//! batch touches only the conversations named in the batch: each one is
//! removed, inserted, or repositioned with O(log n) positioned edits on a
//! persistent vector, so taking a snapshot of the members is O(1).

mod delta;
mod live_view;
mod members;

pub use delta::{Moved, Positioned, ViewDelta};
pub use live_view::LiveView;
pub use members::Members;
