//! Infrastructure layer: OS-facing adapters.
//!
//! Contains the socket-owning network workers, the log file sink, and TOML
//! configuration storage.
//!
//! **Dependency rule**: this layer may depend on `osc_core`, but MUST NOT
//! import the `application` layer.

pub mod network;
pub mod storage;
