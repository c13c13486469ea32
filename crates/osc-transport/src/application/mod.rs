//! Application layer.
//!
//! # Sub-modules
//!
//! - **`session`** – Owns the workers selected by the configured transport
//!   mode plus the log sink, and performs the owner's periodic poll: flush
//!   every worker, forward the log to the file, keep the recent-log view, and
//!   hand received packets and connection events to the caller.

pub mod session;

pub use session::{Session, SessionUpdate};
