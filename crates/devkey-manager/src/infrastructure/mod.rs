//! Infrastructure layer for the device key manager.
//!
//! Contains OS-facing adapters: the IPC socket server with its remote handler
//! proxies, and file-system configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `devkey_core`, but MUST NOT be imported by the `application` layer.

pub mod ipc;
pub mod storage;
