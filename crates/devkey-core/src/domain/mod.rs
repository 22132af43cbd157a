//! Domain entities for the device key manager.
//!
//! Pure types with no infrastructure dependencies: they compile and test on
//! any platform without external setup.  Outer layers (the dispatcher, the IPC
//! server) depend on these types, never the other way round.

/// Key events and the filters handlers register with.
///
/// See [`key_event::KeyFilter`] for the matching rule.
pub mod key_event;
