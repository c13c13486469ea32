//! Stream framing for OSC over TCP.
//!
//! UDP delivers each OSC packet as its own datagram, so it needs no framing.
//! TCP is a byte stream with no message boundaries: two packets written
//! back-to-back may arrive as one read, and one packet may be split across
//! several reads.  A frame encoding marks where each packet ends.
//!
//! Two encodings are in use:
//!
//! ```text
//! OSC 1.0 – packet length:   [size:4 (i32, big-endian)][packet:size]
//! OSC 1.1 – SLIP (RFC 1055): [END][packet, escaped][END]
//! ```
//!
//! # SLIP escaping (for beginners)
//!
//! SLIP reserves the byte `END` (0xC0) as the frame delimiter.  Any `END` inside
//! the packet is written as the two bytes `ESC ESC_END` (0xDB 0xDC), and any
//! literal `ESC` as `ESC ESC_ESC` (0xDB 0xDD).  OSC 1.1 sends an `END` both
//! before and after each packet ("double-ended SLIP"); empty frames between two
//! consecutive `END`s are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packet::Packet;

/// SLIP frame delimiter.
pub const SLIP_END: u8 = 0xC0;
/// SLIP escape introducer.
pub const SLIP_ESC: u8 = 0xDB;
/// Escaped `END`.
pub const SLIP_ESC_END: u8 = 0xDC;
/// Escaped `ESC`.
pub const SLIP_ESC_ESC: u8 = 0xDD;

/// Size of the OSC 1.0 length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest packet accepted in either direction.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Longest escaped SLIP frame body: a payload of [`MAX_FRAME_SIZE`] bytes that
/// are all `END` or `ESC`.
pub const MAX_SLIP_ENCODED_SIZE: usize = 2 * MAX_FRAME_SIZE;

/// Frame encoding used on a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// OSC 1.0: 4-byte big-endian length prefix.
    PacketLength,
    /// OSC 1.1: double-ended SLIP.
    Slip,
}

impl fmt::Display for FrameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameMode::PacketLength => f.write_str("OSC 1.0 packet length"),
            FrameMode::Slip => f.write_str("OSC 1.1 SLIP"),
        }
    }
}

/// Errors produced while framing or de-framing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Empty packets cannot be framed.
    #[error("cannot frame an empty packet")]
    EmptyPacket,

    /// A packet exceeds [`MAX_FRAME_SIZE`].
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// An OSC 1.0 length prefix was negative.
    #[error("negative frame length: {0}")]
    NegativeLength(i32),

    /// A SLIP escape byte was followed by something other than `ESC_END` or
    /// `ESC_ESC`.  `consumed` covers the whole bad frame including its `END`.
    #[error("invalid SLIP escape sequence 0xDB 0x{byte:02X}")]
    InvalidEscape { byte: u8, consumed: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `payload` as one frame.
///
/// # Errors
///
/// Returns [`FramingError::EmptyPacket`] for an empty payload and
/// [`FramingError::FrameTooLarge`] above [`MAX_FRAME_SIZE`].
///
/// # Examples
///
/// ```rust
/// use osc_core::protocol::framing::{frame, FrameMode};
///
/// let framed = frame(FrameMode::PacketLength, b"abcd").unwrap();
/// assert_eq!(framed, vec![0, 0, 0, 4, b'a', b'b', b'c', b'd']);
/// ```
pub fn frame(mode: FrameMode, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    if payload.is_empty() {
        return Err(FramingError::EmptyPacket);
    }
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FramingError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    match mode {
        FrameMode::PacketLength => {
            let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
            // MAX_FRAME_SIZE < i32::MAX, so the cast cannot overflow.
            buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
            buf.extend_from_slice(payload);
            Ok(buf)
        }
        FrameMode::Slip => {
            let escapes = payload
                .iter()
                .filter(|&&b| b == SLIP_END || b == SLIP_ESC)
                .count();
            let mut buf = Vec::with_capacity(payload.len() + escapes + 2);
            buf.push(SLIP_END);
            for &b in payload {
                match b {
                    SLIP_END => buf.extend_from_slice(&[SLIP_ESC, SLIP_ESC_END]),
                    SLIP_ESC => buf.extend_from_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
                    _ => buf.push(b),
                }
            }
            buf.push(SLIP_END);
            Ok(buf)
        }
    }
}

/// Extracts the first complete packet from the start of `buf`.
///
/// Returns the packet (if a complete one is present) and the number of bytes
/// the caller should discard from the front of `buf`.  `consumed` may be
/// non-zero with no packet, when only empty frames were skipped.
///
/// # Errors
///
/// Returns [`FramingError`] when the stream is malformed.  For
/// [`FramingError::InvalidEscape`] the bad frame's length is reported in the
/// error; for length errors, including an oversized SLIP frame or an
/// unterminated SLIP tail longer than [`MAX_SLIP_ENCODED_SIZE`], the caller
/// must discard everything buffered.
pub fn deframe(mode: FrameMode, buf: &[u8]) -> Result<(Option<Packet>, usize), FramingError> {
    match mode {
        FrameMode::PacketLength => deframe_packet_length(buf),
        FrameMode::Slip => deframe_slip(buf),
    }
}

// ── Stream decoder ────────────────────────────────────────────────────────────

/// Accumulates bytes from successive socket reads and yields complete packets.
///
/// # Examples
///
/// ```rust
/// use osc_core::protocol::framing::{frame, FrameDecoder, FrameMode};
///
/// let framed = frame(FrameMode::Slip, b"/ping").unwrap();
/// let mut decoder = FrameDecoder::new(FrameMode::Slip);
///
/// decoder.push(&framed[..3]);
/// assert!(decoder.next_frame().unwrap().is_none());
///
/// decoder.push(&framed[3..]);
/// let packet = decoder.next_frame().unwrap().unwrap();
/// assert_eq!(packet.as_bytes(), b"/ping");
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    mode: FrameMode,
    buffer: Vec<u8>,
    /// SLIP only: prefix of `buffer` already known to hold no `END`.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new(mode: FrameMode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
            scanned: 0,
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Appends bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete packet, or `None` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// On a malformed frame the decoder resynchronises (drops the bad frame,
    /// or its whole buffer when the frame boundary is unknown) and returns the
    /// error.  Calling again continues with whatever follows.
    pub fn next_frame(&mut self) -> Result<Option<Packet>, FramingError> {
        if self.mode == FrameMode::Slip && !self.buffer[self.scanned..].contains(&SLIP_END) {
            if self.buffer.len() > MAX_SLIP_ENCODED_SIZE {
                let size = self.buffer.len();
                self.clear();
                return Err(FramingError::FrameTooLarge {
                    size,
                    max: MAX_FRAME_SIZE,
                });
            }
            self.scanned = self.buffer.len();
            return Ok(None);
        }

        self.scanned = 0;
        match deframe(self.mode, &self.buffer) {
            Ok((packet, consumed)) => {
                self.buffer.drain(..consumed);
                Ok(packet)
            }
            Err(e) => {
                match e {
                    FramingError::InvalidEscape { consumed, .. } => {
                        self.buffer.drain(..consumed);
                    }
                    _ => self.buffer.clear(),
                }
                Err(e)
            }
        }
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any partial frame.  Used when a connection is re-established.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

// ── Mode-specific decoding ────────────────────────────────────────────────────

fn deframe_packet_length(buf: &[u8]) -> Result<(Option<Packet>, usize), FramingError> {
    let mut consumed = 0;
    loop {
        let rest = &buf[consumed..];
        if rest.len() < LENGTH_PREFIX_SIZE {
            return Ok((None, consumed));
        }

        let declared = i32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        if declared < 0 {
            return Err(FramingError::NegativeLength(declared));
        }
        let size = declared as usize;
        if size > MAX_FRAME_SIZE {
            return Err(FramingError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        // zero-length frame carries nothing; skip it
        if size == 0 {
            consumed += LENGTH_PREFIX_SIZE;
            continue;
        }

        let total = LENGTH_PREFIX_SIZE + size;
        if rest.len() < total {
            return Ok((None, consumed));
        }

        let packet = Packet::from_slice(&rest[LENGTH_PREFIX_SIZE..total]);
        return Ok((Some(packet), consumed + total));
    }
}

fn deframe_slip(buf: &[u8]) -> Result<(Option<Packet>, usize), FramingError> {
    let mut start = 0;
    loop {
        let Some(offset) = buf[start..].iter().position(|&b| b == SLIP_END) else {
            // an unterminated tail this long can never become a valid frame
            let pending = buf.len() - start;
            if pending > MAX_SLIP_ENCODED_SIZE {
                return Err(FramingError::FrameTooLarge {
                    size: pending,
                    max: MAX_FRAME_SIZE,
                });
            }
            return Ok((None, start));
        };
        let end = start + offset;

        if end == start {
            start += 1;
            continue;
        }

        let consumed = end + 1;
        let payload = unescape_slip(&buf[start..end])
            .map_err(|byte| FramingError::InvalidEscape { byte, consumed })?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FramingError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        return Ok((Some(Packet::new(payload)), consumed));
    }
}

/// Reverses SLIP escaping.  On failure returns the byte that followed `ESC`
/// (`END` if the escape was the last byte of the frame).
fn unescape_slip(escaped: &[u8]) -> Result<Vec<u8>, u8> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut iter = escaped.iter().copied();
    while let Some(b) = iter.next() {
        if b != SLIP_ESC {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(SLIP_ESC_END) => out.push(SLIP_END),
            Some(SLIP_ESC_ESC) => out.push(SLIP_ESC),
            Some(other) => return Err(other),
            None => return Err(SLIP_END),
        }
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
