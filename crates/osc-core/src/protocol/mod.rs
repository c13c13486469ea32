//! Wire-level codecs consumed by the transport workers.
//!
//! - **`framing`** – OSC-over-TCP stream framing (OSC 1.0 packet length and
//!   OSC 1.1 SLIP), plus a [`FrameDecoder`] that buffers partial frames.
//! - **`osc`** – printable rendering of OSC packets for the log and a helper
//!   to build outgoing messages.

pub mod framing;
pub mod osc;

pub use framing::{deframe, frame, FrameDecoder, FrameMode, FramingError};
pub use osc::{describe_packet, encode_message, OscEncodeError};
