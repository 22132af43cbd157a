//! # devkey-core
//!
//! Shared library for the device key manager containing the key event domain
//! types and the IPC wire protocol spoken between the service, the platform
//! input path and remote key handler processes.
//!
//! This crate has zero dependencies on OS APIs or network sockets.
//!
//! # Architecture overview
//!
//! The device key manager is a system service.  Handler processes connect to
//! it and register interest in a set of hardware scan codes and key actions.
//! The platform input path asks the service, for every key event, whether some
//! handler wants it; matching handlers then receive the event asynchronously.
//!
//! This crate defines:
//!
//! - **`domain`** – Key events, key actions, the scan-code/action filter that
//!   decides whether a registration is interested in an event, and the
//!   identifier types for handlers and users.
//!
//! - **`protocol`** – How messages travel between processes.  Every message is
//!   framed with a 5-byte header (version + payload length) followed by a
//!   bincode payload.

pub mod domain;
pub mod protocol;

pub use domain::key_event::{HandlerId, KeyAction, KeyEvent, KeyFilter, ScanCode, UserId};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::IpcMessage;
