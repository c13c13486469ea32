//! TCP client worker.
//!
//! Maintains one outbound TCP connection, framed with either OSC 1.0 packet
//! length prefixes or OSC 1.1 SLIP.  Received frames are reassembled across
//! reads by a [`FrameDecoder`]; queued packets are framed and written in
//! enqueue order.
//!
//! # Connection states
//!
//! ```text
//!                 start()
//!                    │
//!                    ▼
//!  ┌──────────────┐  connect   ┌────────────┐  established  ┌───────────┐
//!  │ Disconnected │ ─────────► │ Connecting │ ────────────► │ Connected │
//!  └──────────────┘            └────────────┘               └───────────┘
//!         ▲                          │ refused / timeout           │
//!         │                          ▼                             │
//!         └────────── wait reconnect delay ◄───── peer closed / I/O error
//! ```
//!
//! `Connected` is posted to the mailbox on the `Connecting → Connected` edge
//! and `Disconnected` when leaving `Connected`, so events always alternate.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use osc_core::{
    frame, Flushed, FrameDecoder, FrameMode, LogKind, LogMessage, NetworkEvent, Packet, WorkerLog,
};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use super::formatter::{OscFormatter, PacketFormatter};
use super::worker::{
    is_timeout_error, resolve_target, sleep_while_running, Channels, RunFlag, StatsSnapshot,
    WorkerError, WorkerThread, WorkerTiming,
};

/// Size of the buffer handed to each `read` call.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Where the client's connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Disconnected,
    Connecting,
    Connected,
}

impl TcpState {
    /// Whether moving from `self` to `next` is a legal edge.
    pub fn allows(self, next: TcpState) -> bool {
        matches!(
            (self, next),
            (TcpState::Disconnected, TcpState::Connecting)
                | (TcpState::Connecting, TcpState::Connected)
                | (TcpState::Connecting, TcpState::Disconnected)
                | (TcpState::Connected, TcpState::Disconnected)
        )
    }
}

/// One framed TCP connection driven by a dedicated thread.
pub struct TcpClientWorker {
    timing: WorkerTiming,
    formatter: Arc<dyn PacketFormatter>,
    channels: Arc<Channels>,
    thread: Option<WorkerThread>,
}

impl TcpClientWorker {
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

    /// Starts connecting to `host:port` using `mode` framing.  A running
    /// worker is stopped first.
    pub fn start(&mut self, host: &str, port: u16, mode: FrameMode) -> Result<(), WorkerError> {
        self.stop();
        self.channels.mailbox.discard_inbound();

        let ctx = ClientContext {
            host: host.to_string(),
            port,
            mode,
            timing: self.timing,
            formatter: Arc::clone(&self.formatter),
            channels: Arc::clone(&self.channels),
        };
        self.thread = Some(WorkerThread::spawn(
            format!("tcp-client-{host}:{port}"),
            move |running| ctx.run(&running),
        )?);
        Ok(())
    }

    /// Stops the thread and frees any packets it never sent.
    pub fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
        let abandoned = self.channels.outgoing.drain();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "discarding unsent tcp packets");
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

    pub fn pending(&self) -> usize {
        self.channels.outgoing.len()
    }

    /// Appends the pending log, received packets and connection events onto
    /// the caller's sequences.
    pub fn flush(
        &self,
        log: &mut Vec<LogMessage>,
        packets: &mut Vec<Packet>,
        events: &mut Vec<NetworkEvent>,
    ) {
        let (mut drained_log, mut drained_packets, mut drained_events) = self.drain().into_parts();
        log.append(&mut drained_log);
        packets.append(&mut drained_packets);
        events.append(&mut drained_events);
    }

    /// Drains everything with packets and events still interleaved.
    pub fn drain(&self) -> Flushed {
        self.channels.mailbox.drain()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.channels.stats.snapshot()
    }
}

impl Drop for TcpClientWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker thread ─────────────────────────────────────────────────────────────

struct ClientContext {
    host: String,
    port: u16,
    mode: FrameMode,
    timing: WorkerTiming,
    formatter: Arc<dyn PacketFormatter>,
    channels: Arc<Channels>,
}

impl ClientContext {
    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn enter(&self, state: &mut TcpState, next: TcpState) {
        debug_assert!(state.allows(next), "illegal transition {state:?} -> {next:?}");
        debug!(peer = %self.target(), from = ?*state, to = ?next, "tcp state");
        *state = next;
    }

    fn run(&self, running: &RunFlag) {
        let target = self.target();
        let mut log = WorkerLog::new();
        let mut state = TcpState::Disconnected;
        log.info(format!("tcp client {target} thread started"));
        self.channels.update_log(&mut log);

        while running.is_running() {
            self.channels.stats.record_connect_attempt();
            self.enter(&mut state, TcpState::Connecting);
            log.info(format!("tcp client {target} connecting ({})...", self.mode));
            self.channels.update_log(&mut log);

            match self.connect(running, &mut log) {
                Ok(Some(stream)) => {
                    self.enter(&mut state, TcpState::Connected);
                    log.info(format!("tcp client {target} connected"));
                    self.channels.mailbox.post_event(NetworkEvent::Connected);
                    self.channels.update_log(&mut log);

                    self.session(running, stream, &mut log);

                    self.enter(&mut state, TcpState::Disconnected);
                    self.channels.mailbox.post_event(NetworkEvent::Disconnected);
                    log.info(format!("tcp client {target} disconnected"));
                }
                Ok(None) => self.enter(&mut state, TcpState::Disconnected),
                Err(e) => {
                    self.enter(&mut state, TcpState::Disconnected);
                    log.error(format!("tcp client {target} failed: {e}"));
                }
            }

            if running.is_running() {
                log.info(format!(
                    "tcp client {target} reconnecting in {}...",
                    self.timing.reconnect_secs()
                ));
            }
            self.channels.update_log(&mut log);
            sleep_while_running(running, self.timing.reconnect_delay, self.timing.poll_interval);
        }

        log.info(format!("tcp client {target} thread ended"));
        self.channels.update_log(&mut log);
    }

    /// Non-blocking connect polled every `poll_interval`.  Returns `Ok(None)`
    /// when stopped before the connection completed.
    fn connect(
        &self,
        running: &RunFlag,
        log: &mut WorkerLog,
    ) -> Result<Option<TcpStream>, WorkerError> {
        let addr = resolve_target(&self.host, self.port)?;
        let connect_err = |source| WorkerError::Connect { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(WorkerError::Socket)?;
        socket.set_nonblocking(true).map_err(WorkerError::Socket)?;
        match socket.connect(&SockAddr::from(addr)) {
            Ok(()) => {}
            Err(e) if connect_in_progress(&e) => {}
            Err(e) => return Err(connect_err(e)),
        }

        let started = Instant::now();
        loop {
            if !running.is_running() {
                return Ok(None);
            }
            if let Some(e) = socket.take_error().map_err(WorkerError::Socket)? {
                return Err(connect_err(e));
            }
            match socket.peer_addr() {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(connect_err(e)),
            }
            if started.elapsed() >= self.timing.connect_timeout {
                return Err(WorkerError::ConnectTimeout {
                    addr,
                    after: self.timing.connect_timeout,
                });
            }
            self.channels.update_log(log);
            thread::sleep(self.timing.poll_interval);
        }

        socket.set_nonblocking(false).map_err(WorkerError::Socket)?;
        let stream: TcpStream = socket.into();
        stream
            .set_read_timeout(Some(self.timing.recv_timeout))
            .map_err(WorkerError::Socket)?;
        stream
            .set_write_timeout(Some(self.timing.write_timeout))
            .map_err(WorkerError::Socket)?;
        stream.set_nodelay(true).map_err(WorkerError::Socket)?;
        Ok(Some(stream))
    }

    /// Runs a connected stream until stopped, closed by the peer, or failed.
    fn session(&self, running: &RunFlag, mut stream: TcpStream, log: &mut WorkerLog) {
        let target = self.target();
        let in_prefix = format!("TCPIN [{target}] ");
        let out_prefix = format!("TCPOUT [{target}] ");
        let mut decoder = FrameDecoder::new(self.mode);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        while running.is_running() {
            match stream.read(&mut buf) {
                Ok(0) => {
                    log.info(format!("tcp client {target} connection closed by peer"));
                    break;
                }
                Ok(n) => {
                    decoder.push(&buf[..n]);
                    self.deliver_frames(&mut decoder, &in_prefix, log);
                }
                Err(e) if is_timeout_error(&e) || e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log.error(format!("tcp client {target} receive failed: {e}"));
                    break;
                }
            }
            self.channels.update_log(log);
            thread::sleep(self.timing.idle_sleep);

            let healthy = self.send_pending(&mut stream, &out_prefix, log);
            self.channels.update_log(log);
            if !healthy {
                break;
            }
            thread::sleep(self.timing.idle_sleep);
        }

        let _ = stream.shutdown(Shutdown::Both);
    }

    fn deliver_frames(&self, decoder: &mut FrameDecoder, prefix: &str, log: &mut WorkerLog) {
        loop {
            match decoder.next_frame() {
                Ok(Some(packet)) => {
                    for line in self.formatter.describe(packet.as_bytes()) {
                        log.add(LogKind::Recv, format!("{prefix}{line}"));
                    }
                    self.channels.stats.record_received();
                    self.channels.mailbox.post_packet(packet);
                }
                Ok(None) => break,
                Err(e) => log.warning(format!("{prefix}discarding malformed frame: {e}")),
            }
        }
    }

    /// Frames and writes every queued packet.  Returns `false` once a write
    /// fails; the rest of that batch is dropped.
    fn send_pending(&self, stream: &mut TcpStream, prefix: &str, log: &mut WorkerLog) -> bool {
        let batch = self.channels.outgoing.drain();
        let total = batch.len();
        for (index, packet) in batch.into_iter().enumerate() {
            let framed = match frame(self.mode, packet.as_bytes()) {
                Ok(framed) => framed,
                Err(e) => {
                    self.channels.stats.record_send_failure();
                    log.warning(format!("{prefix}cannot frame packet: {e}"));
                    continue;
                }
            };
            if let Err(e) = stream.write_all(&framed) {
                self.channels.stats.record_send_failure();
                log.error(format!("{prefix}send failed: {e}"));
                let dropped = total - index - 1;
                if dropped > 0 {
                    log.warning(format!("{prefix}dropped {dropped} queued packets"));
                }
                return false;
            }
            self.channels.stats.record_sent();
            for line in self.formatter.describe(packet.as_bytes()) {
                log.add(LogKind::Send, format!("{prefix}{line}"));
            }
        }
        true
    }
}

fn connect_in_progress(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if e.raw_os_error() == Some(libc::EINPROGRESS) {
            return true;
        }
    }
    e.kind() == io::ErrorKind::WouldBlock
}

// ── Tests ─────────────────────────────────────────────────────────────────────
