//! Thread handoff primitives.
//!
//! - **`queue`** – [`ExchangeQueue`], a mutex-guarded `Vec<T>` drained by
//!   swap-with-empty.  Used for outgoing packets (UI thread → worker) and for
//!   the log sink's input.
//!
//! - **`mailbox`** – [`Mailbox`], the single per-worker mutex that guards the
//!   shared log together with inbound packets and connection events
//!   (worker → UI thread).

pub mod mailbox;
pub mod queue;

pub use mailbox::{Flushed, Inbound, Mailbox, NetworkEvent};
pub use queue::ExchangeQueue;
