//! All IPC message types exchanged with the device key manager.
//!
//! Three kinds of peers talk to the service over the same framing:
//!
//! - **Key handlers** register filters and acknowledge delivered events.
//! - **The platform input path** asks whether an event is handled and reports
//!   user switches.
//! - **The service** pushes matching events to handlers and answers dispatch
//!   queries.
//!
//! Registration and unregistration are fire-and-forget: the service never
//! acknowledges them.

use serde::{Deserialize, Serialize};

use crate::domain::key_event::{KeyAction, KeyEvent, ScanCode, UserId};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the frame header: version (1) + payload length (4).
pub const HEADER_SIZE: usize = 5;

/// Largest payload accepted by the decoder.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

// ── Messages ──────────────────────────────────────────────────────────────────

/// A message on the IPC channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpcMessage {
    /// Handler → service: optional label used in log lines.
    Hello { name: String },
    /// Handler → service: register this connection's endpoint with a filter.
    RegisterKeyHandler {
        scan_codes: Vec<ScanCode>,
        actions: Vec<KeyAction>,
    },
    /// Handler → service: drop every registration of this connection's endpoint.
    UnregisterKeyHandler,
    /// Service → handler: deliver a matching event; answer with `seq`.
    KeyEvent { seq: u64, event: KeyEvent },
    /// Handler → service: the event with `seq` was handled.
    KeyEventAck { seq: u64 },
    /// Handler → service: the handler failed to process the event with `seq`.
    KeyEventFailed { seq: u64, reason: String },
    /// Platform → service: was this event handled by some registered handler?
    DispatchKeyEvent { seq: u64, event: KeyEvent },
    /// Service → platform: answer to [`IpcMessage::DispatchKeyEvent`].
    DispatchResult { seq: u64, handled: bool },
    /// Platform → service: the active user is changing.
    UserSwitching { from: UserId, to: UserId },
}

impl IpcMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            IpcMessage::Hello { .. } => "Hello",
            IpcMessage::RegisterKeyHandler { .. } => "RegisterKeyHandler",
            IpcMessage::UnregisterKeyHandler => "UnregisterKeyHandler",
            IpcMessage::KeyEvent { .. } => "KeyEvent",
            IpcMessage::KeyEventAck { .. } => "KeyEventAck",
            IpcMessage::KeyEventFailed { .. } => "KeyEventFailed",
            IpcMessage::DispatchKeyEvent { .. } => "DispatchKeyEvent",
            IpcMessage::DispatchResult { .. } => "DispatchResult",
            IpcMessage::UserSwitching { .. } => "UserSwitching",
        }
    }
}
