//! UDP send worker.
//!
//! Owns one unconnected UDP socket and transmits every queued packet to a
//! single target.  IPv4 sockets have `SO_BROADCAST` set, so the target may
//! be `255.255.255.255` or a subnet broadcast address.
//!
//! The owner queues packets with [`UdpSendWorker::send`] and collects the log
//! and connection events with [`UdpSendWorker::flush`].  If the socket cannot
//! be opened the worker logs the failure and retries after the reconnect delay
//! until stopped.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;

use osc_core::{Flushed, LogKind, LogMessage, NetworkEvent, Packet, WorkerLog};
use tracing::debug;

use super::formatter::{OscFormatter, PacketFormatter};
use super::worker::{
    resolve_target, sleep_while_running, Channels, RunFlag, StatsSnapshot, WorkerError,
    WorkerThread, WorkerTiming,
};

/// Transmits queued packets to one UDP target from a dedicated thread.
pub struct UdpSendWorker {
    timing: WorkerTiming,
    formatter: Arc<dyn PacketFormatter>,
    channels: Arc<Channels>,
    thread: Option<WorkerThread>,
}

impl UdpSendWorker {
    pub fn new(timing: WorkerTiming) -> Self {
        Self::with_formatter(timing, Arc::new(OscFormatter))
    }

    pub fn with_formatter(timing: WorkerTiming, formatter: Arc<dyn PacketFormatter>) -> Self {
        Self {
            timing,
            formatter,
            channels: Arc::new(Channels::default()),
            thread: None,
        }
    }

    /// Starts sending to `host:port`.  A running worker is stopped first.
    ///
    /// # Errors
    ///
    /// Only fails if the OS refuses to spawn the thread; socket problems are
    /// reported through the log and retried.
    pub fn start(&mut self, host: &str, port: u16) -> Result<(), WorkerError> {
        self.stop();
        self.channels.mailbox.discard_inbound();

        let ctx = SendContext {
            host: host.to_string(),
            port,
            timing: self.timing,
            formatter: Arc::clone(&self.formatter),
            channels: Arc::clone(&self.channels),
        };
        let thread = WorkerThread::spawn(format!("udp-out-{host}:{port}"), move |running| {
            ctx.run(&running)
        })?;
        self.thread = Some(thread);
        Ok(())
    }

    /// Stops the thread and frees any packets it never sent.
    pub fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
        let abandoned = self.channels.outgoing.drain();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "discarding unsent udp packets");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Queues `packet` for transmission.  Returns `false` only for an empty
    /// packet.
    ///
    /// Packets queued while the worker is stopped are freed by the next
    /// [`start`](Self::start) or [`stop`](Self::stop).
    pub fn send(&self, packet: Packet) -> bool {
        if packet.is_empty() {
            return false;
        }
        self.channels.outgoing.push(packet);
        true
    }

    /// Number of packets waiting to be transmitted.
    pub fn pending(&self) -> usize {
        self.channels.outgoing.len()
    }

    /// Appends the pending log and connection events onto the caller's
    /// sequences.
    pub fn flush(&self, log: &mut Vec<LogMessage>, events: &mut Vec<NetworkEvent>) {
        let (mut drained_log, _, mut drained_events) = self.drain().into_parts();
        log.append(&mut drained_log);
        events.append(&mut drained_events);
    }

    pub fn drain(&self) -> Flushed {
        self.channels.mailbox.drain()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.channels.stats.snapshot()
    }
}

impl Drop for UdpSendWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker thread ─────────────────────────────────────────────────────────────

struct SendContext {
    host: String,
    port: u16,
    timing: WorkerTiming,
    formatter: Arc<dyn PacketFormatter>,
    channels: Arc<Channels>,
}

impl SendContext {
    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn run(&self, running: &RunFlag) {
        let target = self.target();
        let mut log = WorkerLog::new();
        log.info(format!("udp output {target} thread started"));
        self.channels.update_log(&mut log);

        while running.is_running() {
            self.channels.stats.record_connect_attempt();
            match self.open() {
                Ok((socket, addr)) => {
                    log.info(format!("udp output {target} socket opened"));
                    self.channels.mailbox.post_event(NetworkEvent::Connected);
                    self.channels.update_log(&mut log);

                    self.send_loop(running, &socket, addr, &mut log);

                    self.channels.mailbox.post_event(NetworkEvent::Disconnected);
                    log.info(format!("udp output {target} socket closed"));
                }
                Err(e) => log.error(format!("udp output {target} failed: {e}")),
            }

            if running.is_running() {
                log.info(format!(
                    "udp output {target} reconnecting in {}...",
                    self.timing.reconnect_secs()
                ));
            }
            self.channels.update_log(&mut log);
            sleep_while_running(running, self.timing.reconnect_delay, self.timing.poll_interval);
        }

        log.info(format!("udp output {target} thread ended"));
        self.channels.update_log(&mut log);
    }

    fn open(&self) -> Result<(UdpSocket, SocketAddr), WorkerError> {
        let addr = resolve_target(&self.host, self.port)?;
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(|source| WorkerError::Bind {
            addr: local,
            source,
        })?;
        // Covers subnet broadcast targets too; unicast sends are unaffected.
        if addr.is_ipv4() {
            socket.set_broadcast(true).map_err(WorkerError::Socket)?;
        }
        Ok((socket, addr))
    }

    fn send_loop(
        &self,
        running: &RunFlag,
        socket: &UdpSocket,
        addr: SocketAddr,
        log: &mut WorkerLog,
    ) {
        let prefix = format!("OUT [{}] ", self.target());
        while running.is_running() {
            for packet in self.channels.outgoing.drain() {
                match socket.send_to(packet.as_bytes(), addr) {
                    Ok(_) => {
                        self.channels.stats.record_sent();
                        for line in self.formatter.describe(packet.as_bytes()) {
                            log.add(LogKind::Send, format!("{prefix}{line}"));
                        }
                    }
                    Err(e) => {
                        self.channels.stats.record_send_failure();
                        log.error(format!("{prefix}send failed: {e}"));
                    }
                }
            }
            self.channels.update_log(log);
            thread::sleep(self.timing.idle_sleep);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
