//! Application layer use cases for the device key manager.
//!
//! Use cases in this layer orchestrate domain types from `devkey_core` and
//! depend only on abstractions (the [`dispatch_keys::KeyHandler`] trait), so
//! the IPC transport can be swapped or faked in tests.  No sockets, no file
//! system access.
//!
//! # Sub-modules
//!
//! - **`dispatch_keys`** – The key event dispatcher: answers "was this event
//!   handled" for the platform input path and delivers matching events to
//!   handlers on a single worker task, pruning handlers whose endpoint died.
//!
//! - **`manage_handlers`** – The in-memory registry of listener registrations
//!   and the conjunctive scan-code/action match over it.

pub mod dispatch_keys;
pub mod manage_handlers;
