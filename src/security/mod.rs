//! Conversation security level.
//!
//! The level follows the participant devices' trust:
//!
//! ```text
//! NotSecure -> Secure <-> SecureWithIgnored
//! ```
//!
//! A conversation starts not secure. Trusting every participant device makes
//! it secure; a new, untrusted device degrades it to secure-with-ignored until
//! that device is trusted too. Only an explicit reset brings it back to not
//! secure.

mod devices;
mod level;

pub use devices::{ClientId, DeviceTrust, ParticipantDevices};
pub use level::{SecurityLevel, SecurityState, SecurityTransition, TrustEvent};
