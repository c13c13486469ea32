//! Worker → UI thread handoff.
//!
//! A [`Mailbox`] is the one mutex a worker shares with its owner for inbound
//! traffic.  It guards two sequences together:
//!
//! - the shared log (merged from the worker's private [`WorkerLog`]), and
//! - the inbound sequence of received packets and connection events.
//!
//! Keeping packets and events in a single sequence means the UI thread sees
//! them in exactly the order the worker produced them: a `Disconnected` event
//! can never overtake a packet that arrived before the connection dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::log::{LogMessage, WorkerLog};
use crate::packet::Packet;

/// A connection boundary crossed by a worker's socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkEvent {
    Connected,
    Disconnected,
}

/// One inbound item, in arrival order.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Packet(Packet),
    Event(NetworkEvent),
}

/// Everything a worker produced since the previous drain.
#[derive(Debug, Default)]
pub struct Flushed {
    pub log: Vec<LogMessage>,
    /// Packets and events, interleaved in enqueue order.
    pub inbound: Vec<Inbound>,
}

impl Flushed {
    /// `true` when nothing at all was drained.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.inbound.is_empty()
    }

    /// Splits the inbound sequence into packets and events.
    ///
    /// Order is preserved within each output; relative order between a packet
    /// and an event is only available from [`Flushed::inbound`].
    pub fn into_parts(self) -> (Vec<LogMessage>, Vec<Packet>, Vec<NetworkEvent>) {
        let mut packets = Vec::new();
        let mut events = Vec::new();
        for item in self.inbound {
            match item {
                Inbound::Packet(p) => packets.push(p),
                Inbound::Event(e) => events.push(e),
            }
        }
        (self.log, packets, events)
    }
}

#[derive(Debug, Default)]
struct Shared {
    log: Vec<LogMessage>,
    inbound: Vec<Inbound>,
}

/// The shared, lock-guarded side of a worker.
#[derive(Debug, Default)]
pub struct Mailbox {
    shared: Mutex<Shared>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `log` into the shared log and clears it.
    ///
    /// Does not touch the lock when `log` is empty.
    pub fn post_log(&self, log: &mut WorkerLog) {
        if log.is_empty() {
            return;
        }
        log.merge_into(&mut self.lock().log);
    }

    /// Enqueues a received packet.
    pub fn post_packet(&self, packet: Packet) {
        self.lock().inbound.push(Inbound::Packet(packet));
    }

    /// Enqueues a batch of received packets under one lock.
    pub fn post_packets(&self, packets: impl IntoIterator<Item = Packet>) {
        self.lock()
            .inbound
            .extend(packets.into_iter().map(Inbound::Packet));
    }

    /// Enqueues a connection event.
    pub fn post_event(&self, event: NetworkEvent) {
        self.lock().inbound.push(Inbound::Event(event));
    }

    /// Swaps the log and the inbound sequence out together.
    pub fn drain(&self) -> Flushed {
        let mut shared = self.lock();
        Flushed {
            log: std::mem::take(&mut shared.log),
            inbound: std::mem::take(&mut shared.inbound),
        }
    }

    /// Discards any inbound items nobody drained.  Returns how many packets
    /// were dropped.
    pub fn discard_inbound(&self) -> usize {
        let abandoned = std::mem::take(&mut self.lock().inbound);
        abandoned
            .iter()
            .filter(|item| matches!(item, Inbound::Packet(_)))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
