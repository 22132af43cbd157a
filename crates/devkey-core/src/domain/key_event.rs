//! Key events, key actions and registration filters.
//!
//! A handler registers with a [`KeyFilter`]: a set of scan codes and a set of
//! actions.  An event is interesting to that handler only when **both** sets
//! contain the event's value.
//!
//! ```text
//! filter { scan_codes: [1, 2], actions: [Down] }
//!
//!   (scan 2, Down)  -> match
//!   (scan 2, Up)    -> no match   (action not accepted)
//!   (scan 3, Down)  -> no match   (scan code not accepted)
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hardware key identifier reported by the input device.
pub type ScanCode = u16;

/// Identity of a remote key handler endpoint.
///
/// Two registrations belong to the same endpoint iff their ids are equal.
pub type HandlerId = Uuid;

/// Identifier of a user session, as reported by the platform's user-switch hook.
pub type UserId = u32;

/// The key transition being reported.
///
/// Serialized as its raw byte so unknown values are rejected at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum KeyAction {
    /// The key was pressed.
    Down = 0,
    /// The key was released.
    Up = 1,
}

impl TryFrom<u8> for KeyAction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeyAction::Down),
            1 => Ok(KeyAction::Up),
            other => Err(format!("unknown key action: {other}")),
        }
    }
}

impl From<KeyAction> for u8 {
    fn from(action: KeyAction) -> Self {
        action as u8
    }
}

/// A single key event as seen by the platform input path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub scan_code: ScanCode,
    pub action: KeyAction,
    /// Milliseconds since boot when the event was generated.  Informational only.
    pub event_time_ms: u64,
}

impl KeyEvent {
    /// Creates an event with a zero timestamp.
    pub fn new(scan_code: ScanCode, action: KeyAction) -> Self {
        Self {
            scan_code,
            action,
            event_time_ms: 0,
        }
    }
}

/// Scan-code and action sets a handler registered with.
///
/// No validation is performed: empty sets are accepted (they never match) and
/// duplicate entries are harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFilter {
    pub scan_codes: Vec<ScanCode>,
    pub actions: Vec<KeyAction>,
}

impl KeyFilter {
    pub fn new(scan_codes: Vec<ScanCode>, actions: Vec<KeyAction>) -> Self {
        Self {
            scan_codes,
            actions,
        }
    }

    /// Returns `true` when both the scan code and the action of `event` are accepted.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.scan_codes.contains(&event.scan_code) && self.actions.contains(&event.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_when_scan_code_and_action_accepted() {
        // Arrange
        let filter = KeyFilter::new(vec![1, 2], vec![KeyAction::Down]);

        // Act / Assert
        assert!(filter.matches(&KeyEvent::new(2, KeyAction::Down)));
    }

    #[test]
    fn test_filter_rejects_accepted_scan_code_with_other_action() {
        let filter = KeyFilter::new(vec![1, 2], vec![KeyAction::Down]);
        assert!(!filter.matches(&KeyEvent::new(1, KeyAction::Up)));
    }

    #[test]
    fn test_filter_rejects_accepted_action_with_other_scan_code() {
        let filter = KeyFilter::new(vec![1, 2], vec![KeyAction::Down, KeyAction::Up]);
        assert!(!filter.matches(&KeyEvent::new(3, KeyAction::Down)));
    }

    #[test]
    fn test_empty_filter_never_matches() {
        // Arrange
        let no_codes = KeyFilter::new(vec![], vec![KeyAction::Down, KeyAction::Up]);
        let no_actions = KeyFilter::new(vec![1], vec![]);

        // Assert
        assert!(!no_codes.matches(&KeyEvent::new(1, KeyAction::Down)));
        assert!(!no_actions.matches(&KeyEvent::new(1, KeyAction::Down)));
    }

    #[test]
    fn test_filter_with_duplicate_entries_still_matches() {
        let filter = KeyFilter::new(vec![7, 7], vec![KeyAction::Up, KeyAction::Up]);
        assert!(filter.matches(&KeyEvent::new(7, KeyAction::Up)));
    }

    #[test]
    fn test_event_time_does_not_affect_matching() {
        let filter = KeyFilter::new(vec![5], vec![KeyAction::Down]);
        let event = KeyEvent {
            scan_code: 5,
            action: KeyAction::Down,
            event_time_ms: 123_456,
        };
        assert!(filter.matches(&event));
    }

    #[test]
    fn test_key_action_try_from_rejects_unknown_byte() {
        assert_eq!(KeyAction::try_from(0u8), Ok(KeyAction::Down));
        assert_eq!(KeyAction::try_from(1u8), Ok(KeyAction::Up));
        assert!(KeyAction::try_from(2u8).is_err());
    }
}
