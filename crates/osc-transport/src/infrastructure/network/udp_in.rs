//! UDP receive worker.
//!
//! Binds `ip:port`, reads datagrams with a short timeout so the run flag is
//! checked regularly, and hands every datagram to the owner as a [`Packet`].
//! Each datagram is also rendered into the log with an
//! `IN  [sender_ip:listen_port]` prefix.

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;

use osc_core::{Flushed, LogKind, LogMessage, Packet, WorkerLog};

use super::formatter::{OscFormatter, PacketFormatter};
use super::worker::{
    is_timeout_error, resolve_target, sleep_while_running, Channels, RunFlag, StatsSnapshot,
    WorkerError, WorkerThread, WorkerTiming,
};

/// Largest payload a UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Listens for datagrams on a dedicated thread.
pub struct UdpReceiveWorker {
    timing: WorkerTiming,
    formatter: Arc<dyn PacketFormatter>,
    channels: Arc<Channels>,
    thread: Option<WorkerThread>,
}

impl UdpReceiveWorker {
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

    /// Starts listening on `ip:port`.  A running worker is stopped first and
    /// any packets left over from the previous run are discarded.
    pub fn start(&mut self, ip: &str, port: u16) -> Result<(), WorkerError> {
        self.stop();
        self.channels.mailbox.discard_inbound();

        let ctx = ReceiveContext {
            ip: ip.to_string(),
            port,
            timing: self.timing,
            formatter: Arc::clone(&self.formatter),
            channels: Arc::clone(&self.channels),
        };
        self.thread = Some(WorkerThread::spawn(
            format!("udp-in-{ip}:{port}"),
            move |running| ctx.run(&running),
        )?);
        Ok(())
    }

    /// Stops the thread.  Packets already received stay available to
    /// [`flush`](Self::flush) until the next start.
    pub fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Appends the pending log and received packets onto the caller's
    /// sequences.
    pub fn flush(&self, log: &mut Vec<LogMessage>, packets: &mut Vec<Packet>) {
        let (mut drained_log, mut drained_packets, _) = self.drain().into_parts();
        log.append(&mut drained_log);
        packets.append(&mut drained_packets);
    }

    pub fn drain(&self) -> Flushed {
        self.channels.mailbox.drain()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.channels.stats.snapshot()
    }
}

impl Drop for UdpReceiveWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker thread ─────────────────────────────────────────────────────────────

struct ReceiveContext {
    ip: String,
    port: u16,
    timing: WorkerTiming,
    formatter: Arc<dyn PacketFormatter>,
    channels: Arc<Channels>,
}

impl ReceiveContext {
    fn run(&self, running: &RunFlag) {
        let target = format!("{}:{}", self.ip, self.port);
        let mut log = WorkerLog::new();
        log.info(format!("udp input {target} thread started"));
        self.channels.update_log(&mut log);

        while running.is_running() {
            self.channels.stats.record_connect_attempt();
            match self.open() {
                Ok(socket) => {
                    log.info(format!("udp input {target} socket bound"));
                    self.channels.update_log(&mut log);
                    if let Err(e) = self.recv_loop(running, &socket, &mut log) {
                        log.error(format!("udp input {target} receive failed: {e}"));
                    }
                }
                Err(e) => log.error(format!("udp input {target} failed: {e}")),
            }

            if running.is_running() {
                log.info(format!(
                    "udp input {target} reconnecting in {}...",
                    self.timing.reconnect_secs()
                ));
            }
            self.channels.update_log(&mut log);
            sleep_while_running(running, self.timing.reconnect_delay, self.timing.poll_interval);
        }

        log.info(format!("udp input {target} thread ended"));
        self.channels.update_log(&mut log);
    }

    fn open(&self) -> Result<UdpSocket, WorkerError> {
        let addr = resolve_target(&self.ip, self.port)?;
        let socket = UdpSocket::bind(addr).map_err(|source| WorkerError::Bind { addr, source })?;
        socket
            .set_read_timeout(Some(self.timing.recv_timeout))
            .map_err(WorkerError::Socket)?;
        Ok(socket)
    }

    /// Receives until the run flag clears (`Ok`) or the socket fails.
    fn recv_loop(
        &self,
        running: &RunFlag,
        socket: &UdpSocket,
        log: &mut WorkerLog,
    ) -> io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        while running.is_running() {
            match socket.recv_from(&mut buf) {
                Ok((0, _)) => {}
                Ok((len, sender)) => {
                    let packet = Packet::from_slice(&buf[..len]);
                    let prefix = format!("IN  [{}:{}] ", sender.ip(), self.port);
                    for line in self.formatter.describe(packet.as_bytes()) {
                        log.add(LogKind::Recv, format!("{prefix}{line}"));
                    }
                    self.channels.stats.record_received();
                    self.channels.mailbox.post_packet(packet);
                }
                Err(e) if is_timeout_error(&e) => {}
                // ICMP port-unreachable from an earlier send surfaces here on
                // some platforms; the socket itself is fine.
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e),
            }
            self.channels.update_log(log);
            thread::sleep(self.timing.idle_sleep);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::formatter::MockPacketFormatter;
    use std::time::{Duration, Instant};

    fn fast_timing() -> WorkerTiming {
        WorkerTiming {
            reconnect_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            recv_timeout: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(500),
            idle_sleep: Duration::from_millis(1),
            write_timeout: Duration::from_millis(500),
        }
    }

    fn free_udp_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_received_datagram_is_queued_and_logged_with_sender_prefix() {
        // Arrange
        let port = free_udp_port();
        let mut formatter = MockPacketFormatter::new();
        formatter.expect_describe().returning(|_| vec!["line".to_string()]);
        let mut worker = UdpReceiveWorker::with_formatter(fast_timing(), Arc::new(formatter));
        worker.start("127.0.0.1", port).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        // Act – resend until the listener is bound
        let mut log = Vec::new();
        let mut packets = Vec::new();
        let arrived = wait_for(Duration::from_secs(3), || {
            sender.send_to(b"hello", ("127.0.0.1", port)).unwrap();
            worker.flush(&mut log, &mut packets);
            !packets.is_empty()
        });
        worker.stop();

        // Assert
        assert!(arrived);
        assert_eq!(packets[0].as_bytes(), b"hello");
        let expected = format!("IN  [127.0.0.1:{port}] line");
        assert!(log.iter().any(|m| m.kind == LogKind::Recv && m.text == expected));
    }

    #[test]
    fn test_port_in_use_is_retried_until_stopped() {
        // Arrange
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        let mut worker = UdpReceiveWorker::new(fast_timing());

        // Act
        worker.start("127.0.0.1", port).unwrap();
        let retried = wait_for(Duration::from_secs(3), || worker.stats().connect_attempts >= 3);
        worker.stop();

        // Assert
        assert!(retried);
        let mut log = Vec::new();
        let mut packets = Vec::new();
        worker.flush(&mut log, &mut packets);
        assert!(packets.is_empty());
        assert!(log.iter().any(|m| m.kind == LogKind::Error));
        assert_eq!(
            log.last().unwrap().text,
            format!("udp input 127.0.0.1:{port} thread ended")
        );
    }

    #[test]
    fn test_stop_returns_within_receive_timeout() {
        let mut worker = UdpReceiveWorker::new(fast_timing());
        worker.start("127.0.0.1", free_udp_port()).unwrap();
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        worker.stop();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!worker.is_running());
    }
}
