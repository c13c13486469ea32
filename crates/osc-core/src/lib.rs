//! # osc-core
//!
//! Shared building blocks for the OSC transport workers: owned packet
//! buffers, swap-drain exchange queues, per-worker logs, and the OSC stream
//! framing and printing codecs.
//!
//! This crate has no dependency on sockets or threads.  The workers that own
//! sockets live in `osc-transport`.
//!
//! # Architecture overview (for beginners)
//!
//! An OSC control surface talks to a remote console over UDP or TCP.  Each
//! socket is owned by a background worker thread; the UI thread never touches
//! a socket directly.  Instead the two sides exchange data through queues:
//!
//! - **`packet`** – [`Packet`], an owned byte buffer.  Handing a packet to a
//!   queue moves it; whoever holds it last drops it.
//!
//! - **`exchange`** – [`ExchangeQueue`] and [`Mailbox`].  Both are drained by
//!   swapping the whole sequence out under the lock, so the lock is held for
//!   O(1) no matter how many items are waiting.
//!
//! - **`log`** – [`WorkerLog`] collects log lines privately on a worker
//!   thread and is merged into the shared mailbox once per loop iteration.
//!
//! - **`protocol`** – TCP stream framing (OSC 1.0 packet-length and OSC 1.1
//!   SLIP) and a printable rendering of OSC packets for the log.

pub mod exchange;
pub mod log;
pub mod packet;
pub mod protocol;

pub use exchange::mailbox::{Flushed, Inbound, Mailbox, NetworkEvent};
pub use exchange::queue::ExchangeQueue;
pub use log::{LogKind, LogMessage, WorkerLog};
pub use packet::Packet;
pub use protocol::framing::{deframe, frame, FrameDecoder, FrameMode, FramingError};
pub use protocol::osc::{describe_packet, encode_message, OscEncodeError};
