//! Participant device trust sets.

use super::level::TrustEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one participant device (client).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        ClientId(id.into())
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTrust {
    Trusted,
    /// Known but not trusted by the self user.
    Ignored,
}

/// Trust of every device taking part in a conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDevices {
    devices: BTreeMap<ClientId, DeviceTrust>,
}

impl ParticipantDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, client: ClientId, trust: DeviceTrust) -> Self {
        self.devices.insert(client, trust);
        self
    }

    pub fn set(&mut self, client: ClientId, trust: DeviceTrust) {
        self.devices.insert(client, trust);
    }

    pub fn remove(&mut self, client: &ClientId) -> Option<DeviceTrust> {
        self.devices.remove(client)
    }

    pub fn trust_of(&self, client: &ClientId) -> Option<DeviceTrust> {
        self.devices.get(client).copied()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn all_trusted(&self) -> bool {
        !self.devices.is_empty() && self.devices.values().all(|t| *t == DeviceTrust::Trusted)
    }

    pub fn any_ignored(&self) -> bool {
        self.devices.values().any(|t| *t == DeviceTrust::Ignored)
    }
}

impl TrustEvent {
    /// Derive the event describing the move from `previous` to `current`.
    ///
    /// Device removal never produces a reset; callers that want to downgrade
    /// must send [`TrustEvent::reset`] themselves.
    pub fn from_devices(previous: &ParticipantDevices, current: &ParticipantDevices) -> Self {
        let first_verification = current.devices.iter().any(|(client, trust)| {
            *trust == DeviceTrust::Trusted
                && previous.trust_of(client) != Some(DeviceTrust::Trusted)
        });

        TrustEvent {
            all_devices_trusted: current.all_trusted(),
            any_device_ignored: current.any_ignored(),
            any_device_verified_for_first_time: first_verification,
            explicit_reset: false,
        }
    }
}
