//! OSC packet rendering for the log, and message construction for senders.
//!
//! Decoding is delegated to the `rosc` crate.  The rendering follows the
//! familiar console-log style: the address followed by each argument and its
//! type tag in parentheses.
//!
//! ```text
//! /eos/out/active/chan, "1 [100]"(s)
//! /eos/fader/1/1, 0.75(f)
//! #bundle 0.1
//!   /eos/ping, 1(i)
//! ```

use rosc::{OscBundle, OscMessage, OscPacket, OscType};
use thiserror::Error;

use crate::packet::Packet;

/// Errors produced while building an OSC packet.
#[derive(Debug, Error)]
pub enum OscEncodeError {
    /// OSC addresses must start with `/`.
    #[error("invalid OSC address {0:?}: must start with '/'")]
    InvalidAddress(String),

    /// The underlying encoder refused the message.
    #[error("failed to encode OSC message: {0:?}")]
    Encode(rosc::OscError),
}

/// Renders a raw packet as printable log lines.
///
/// A message renders to one line; a bundle renders to a header line followed
/// by its elements, indented by nesting depth.  Bytes that do not decode as
/// OSC render to a single line describing the failure.
///
/// # Examples
///
/// ```rust
/// use osc_core::protocol::osc::{describe_packet, encode_message};
/// use rosc::OscType;
///
/// let packet = encode_message("/eos/ping", vec![OscType::Int(1)]).unwrap();
/// assert_eq!(describe_packet(packet.as_bytes()), vec!["/eos/ping, 1(i)"]);
/// ```
pub fn describe_packet(bytes: &[u8]) -> Vec<String> {
    match rosc::decoder::decode_udp(bytes) {
        Ok((_, packet)) => {
            let mut lines = Vec::new();
            describe_into(&packet, 0, &mut lines);
            lines
        }
        Err(e) => vec![format!("invalid OSC packet ({} bytes): {e:?}", bytes.len())],
    }
}

/// Encodes a single OSC message into a [`Packet`] ready to hand to a worker.
///
/// # Errors
///
/// Returns [`OscEncodeError::InvalidAddress`] when `addr` does not start with
/// `/`, or [`OscEncodeError::Encode`] if `rosc` rejects the message.
pub fn encode_message(addr: &str, args: Vec<OscType>) -> Result<Packet, OscEncodeError> {
    if !addr.starts_with('/') {
        return Err(OscEncodeError::InvalidAddress(addr.to_string()));
    }
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    rosc::encoder::encode(&packet)
        .map(Packet::new)
        .map_err(OscEncodeError::Encode)
}

// ── Rendering helpers ─────────────────────────────────────────────────────────

fn describe_into(packet: &OscPacket, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match packet {
        OscPacket::Message(msg) => lines.push(format!("{indent}{}", describe_message(msg))),
        OscPacket::Bundle(bundle) => describe_bundle(bundle, depth, lines),
    }
}

fn describe_bundle(bundle: &OscBundle, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    lines.push(format!(
        "{indent}#bundle {}.{}",
        bundle.timetag.seconds, bundle.timetag.fractional
    ));
    for element in &bundle.content {
        describe_into(element, depth + 1, lines);
    }
}

fn describe_message(msg: &OscMessage) -> String {
    let mut line = msg.addr.clone();
    for arg in &msg.args {
        line.push_str(", ");
        line.push_str(&describe_arg(arg));
    }
    line
}

fn describe_arg(arg: &OscType) -> String {
    match arg {
        OscType::Int(v) => format!("{v}(i)"),
        OscType::Float(v) => format!("{v}(f)"),
        OscType::String(v) => format!("\"{v}\"(s)"),
        OscType::Blob(v) => format!("<{} bytes>(b)", v.len()),
        OscType::Long(v) => format!("{v}(h)"),
        OscType::Double(v) => format!("{v}(d)"),
        OscType::Char(v) => format!("'{v}'(c)"),
        OscType::Bool(true) => "TRUE(T)".to_string(),
        OscType::Bool(false) => "FALSE(F)".to_string(),
        OscType::Nil => "NIL(N)".to_string(),
        OscType::Inf => "INFINITY(I)".to_string(),
        OscType::Time(t) => format!("{}.{}(t)", t.seconds, t.fractional),
        other => format!("{other:?}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
