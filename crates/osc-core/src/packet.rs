//! Owned wire-level packet buffers.
//!
//! A [`Packet`] is one complete OSC packet: a UDP datagram, or one de-framed
//! message from a TCP stream.  It does not implement `Clone`:
//! every handoff (UI thread → send queue → socket, or socket → receive queue →
//! UI thread) is a move, so exactly one owner ever frees the buffer.

use std::fmt;

/// An owned, immutable byte buffer holding one OSC packet.
///
/// # Examples
///
/// ```rust
/// use osc_core::Packet;
///
/// let packet = Packet::from_slice(b"/ping\0\0\0,\0\0\0");
/// assert_eq!(packet.len(), 12);
/// assert!(!packet.is_empty());
/// ```
#[derive(PartialEq, Eq)]
pub struct Packet {
    bytes: Box<[u8]>,
}

impl Packet {
    /// Takes ownership of `bytes` without copying.
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Copies `bytes` into a newly allocated packet.
    ///
    /// This is what a receive loop does with the contents of its reusable
    /// socket buffer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    /// Returns the packet contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the packet.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` when the packet carries no bytes.  Empty packets are never
    /// accepted for sending.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the packet and returns its buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for Packet {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet").field("len", &self.len()).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
