//! Rendering packets into log lines.
//!
//! Workers never decode OSC themselves; they hand raw bytes to a
//! [`PacketFormatter`] and log whatever lines come back.  Production code uses
//! [`OscFormatter`]; unit tests substitute a mock to check exactly what the
//! worker logged.

use osc_core::describe_packet;

/// Turns a raw packet into printable lines for the user-facing log.
#[cfg_attr(test, mockall::automock)]
pub trait PacketFormatter: Send + Sync {
    fn describe(&self, bytes: &[u8]) -> Vec<String>;
}

/// Renders packets as OSC (`/address, 1(i), "text"(s)`).
#[derive(Debug, Default, Clone, Copy)]
pub struct OscFormatter;

impl PacketFormatter for OscFormatter {
    fn describe(&self, bytes: &[u8]) -> Vec<String> {
        describe_packet(bytes)
    }
}
