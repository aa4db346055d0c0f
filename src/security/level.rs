//! Security level state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust state of a conversation's participant devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Never secured in the current epoch.
    #[default]
    NotSecure,
    /// Every device is trusted or ignored; messages can be sent but the
    /// conversation is not shown as secure.
    SecureWithIgnored,
    /// Every device is trusted.
    Secure,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityLevel::NotSecure => "not secure",
            SecurityLevel::SecureWithIgnored => "secure with ignored",
            SecurityLevel::Secure => "secure",
        };
        f.write_str(name)
    }
}

/// Device-trust facts observed for one conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrustEvent {
    pub all_devices_trusted: bool,
    pub any_device_ignored: bool,
    pub any_device_verified_for_first_time: bool,
    pub explicit_reset: bool,
}

impl TrustEvent {
    /// Every participant device is trusted.
    pub fn all_trusted() -> Self {
        Self {
            all_devices_trusted: true,
            ..Default::default()
        }
    }

    /// A device appeared that is not (yet) trusted.
    pub fn device_ignored() -> Self {
        Self {
            any_device_ignored: true,
            ..Default::default()
        }
    }

    /// Forced downgrade, e.g. after a device was removed or compromised.
    pub fn reset() -> Self {
        Self {
            explicit_reset: true,
            ..Default::default()
        }
    }

    pub fn with_first_verification(mut self) -> Self {
        self.any_device_verified_for_first_time = true;
        self
    }
}

/// Result of feeding one [`TrustEvent`] to a [`SecurityState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecurityTransition {
    pub from: SecurityLevel,
    pub to: SecurityLevel,
    /// The event started a new security epoch.
    pub reset: bool,
    /// Some device was verified for the first time.
    pub first_verification: bool,
}

impl SecurityTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Secure became secure-with-ignored because of a new device.
    pub fn degraded(&self) -> bool {
        self.from == SecurityLevel::Secure && self.to == SecurityLevel::SecureWithIgnored
    }
}

/// Security level plus the history it depends on.
///
/// `ignored_in_epoch` records whether an untrusted device was ever seen since
/// the last explicit reset; once set, a not-secure conversation can only
/// reach `Secure` through `SecureWithIgnored`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SecurityState {
    level: SecurityLevel,
    ignored_in_epoch: bool,
    epoch: u32,
}

impl SecurityState {
    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn ignored_in_epoch(&self) -> bool {
        self.ignored_in_epoch
    }

    /// Compute the next state without mutating `self`.
    ///
    /// When both `all_devices_trusted` and `any_device_ignored` are set, the
    /// ignored device wins and the event counts as not trusted.
    pub fn next(&self, event: TrustEvent) -> SecurityState {
        if event.explicit_reset {
            return SecurityState {
                level: SecurityLevel::NotSecure,
                ignored_in_epoch: false,
                epoch: self.epoch.wrapping_add(1),
            };
        }

        let ignored = event.any_device_ignored;
        let trusted = event.all_devices_trusted && !ignored;
        let ignored_in_epoch = self.ignored_in_epoch || ignored;

        let level = match self.level {
            SecurityLevel::NotSecure if trusted && !ignored_in_epoch => SecurityLevel::Secure,
            SecurityLevel::NotSecure if trusted => SecurityLevel::SecureWithIgnored,
            SecurityLevel::NotSecure => SecurityLevel::NotSecure,
            SecurityLevel::Secure if ignored => SecurityLevel::SecureWithIgnored,
            SecurityLevel::SecureWithIgnored if trusted => SecurityLevel::Secure,
            level => level,
        };

        SecurityState {
            level,
            ignored_in_epoch,
            epoch: self.epoch,
        }
    }

    /// Apply an event in place.
    pub fn apply(&mut self, event: TrustEvent) -> SecurityTransition {
        let from = self.level;
        let next = self.next(event);
        *self = next;

        SecurityTransition {
            from,
            to: next.level,
            reset: event.explicit_reset,
            first_verification: event.any_device_verified_for_first_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure() -> SecurityState {
        let mut state = SecurityState::default();
        state.apply(TrustEvent::all_trusted());
        state
    }

    #[test]
    fn test_first_trust_secures() {
        let mut state = SecurityState::default();
        let t = state.apply(TrustEvent::all_trusted());
        assert_eq!(t.from, SecurityLevel::NotSecure);
        assert_eq!(t.to, SecurityLevel::Secure);
        assert!(t.changed());
    }

    #[test]
    fn test_secure_ignored_cycle() {
        let mut state = secure();

        let t = state.apply(TrustEvent::device_ignored());
        assert_eq!(t.to, SecurityLevel::SecureWithIgnored);
        assert!(t.degraded());

        let t = state.apply(TrustEvent::all_trusted());
        assert_eq!(t.to, SecurityLevel::Secure);
        assert!(!t.degraded());
    }

    #[test]
    fn test_ignored_wins_over_trusted() {
        let mut state = secure();
        let t = state.apply(TrustEvent {
            all_devices_trusted: true,
            any_device_ignored: true,
            ..Default::default()
        });
        assert_eq!(t.to, SecurityLevel::SecureWithIgnored);

        // Same tie from SecureWithIgnored must not promote to Secure.
        let t = state.apply(TrustEvent {
            all_devices_trusted: true,
            any_device_ignored: true,
            ..Default::default()
        });
        assert_eq!(t.to, SecurityLevel::SecureWithIgnored);
    }

    #[test]
    fn test_tie_from_not_secure_stays_not_secure() {
        let mut state = SecurityState::default();
        let t = state.apply(TrustEvent {
            all_devices_trusted: true,
            any_device_ignored: true,
            ..Default::default()
        });
        assert_eq!(t.to, SecurityLevel::NotSecure);
        assert!(state.ignored_in_epoch());
    }

    #[test]
    fn test_not_secure_with_ignored_history_goes_through_ignored() {
        let mut state = SecurityState::default();
        state.apply(TrustEvent::device_ignored());
        assert_eq!(state.level(), SecurityLevel::NotSecure);

        let t = state.apply(TrustEvent::all_trusted());
        assert_eq!(t.to, SecurityLevel::SecureWithIgnored);

        let t = state.apply(TrustEvent::all_trusted());
        assert_eq!(t.to, SecurityLevel::Secure);
    }

    #[test]
    fn test_only_reset_reaches_not_secure() {
        let mut state = secure();
        state.apply(TrustEvent::device_ignored());
        state.apply(TrustEvent::device_ignored());
        assert_eq!(state.level(), SecurityLevel::SecureWithIgnored);

        let t = state.apply(TrustEvent::reset());
        assert_eq!(t.to, SecurityLevel::NotSecure);
        assert!(t.reset);
        assert_eq!(state.epoch(), 1);
        assert!(!state.ignored_in_epoch());

        // A new epoch may secure directly again.
        let t = state.apply(TrustEvent::all_trusted());
        assert_eq!(t.to, SecurityLevel::Secure);
    }

    #[test]
    fn test_reset_takes_precedence() {
        let mut state = secure();
        let t = state.apply(TrustEvent {
            all_devices_trusted: true,
            explicit_reset: true,
            ..Default::default()
        });
        assert_eq!(t.to, SecurityLevel::NotSecure);
    }

    #[test]
    fn test_first_verification_is_reported_only() {
        let mut state = SecurityState::default();
        let t = state.apply(TrustEvent::default().with_first_verification());
        assert!(t.first_verification);
        assert!(!t.changed());
    }
}
