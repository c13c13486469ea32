//! The owner of a set of workers.
//!
//! A [`Session`] stands where a UI thread would: it starts the workers for the
//! configured [`TransportMode`], routes outgoing packets to the active sender,
//! and on every [`Session::poll`] collects what the workers produced.
//!
//! ```text
//!   udp mode                           tcp mode
//!  ┌──────────────┐                   ┌────────────────┐
//!  │ UdpSendWorker│◄── send()         │ TcpClientWorker│◄── send()
//!  └──────────────┘                   └────────────────┘
//!  ┌─────────────────┐                        │
//!  │ UdpReceiveWorker│                        │
//!  └─────────────────┘                        │
//!          │ poll(): log / packets / events   │
//!          ▼                                  ▼
//!      recent log ring ─────────────► LogSink (capped file)
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use osc_core::{LogKind, LogMessage, NetworkEvent, Packet};
use tracing::{info, warn};

use crate::infrastructure::network::{
    TcpClientWorker, UdpReceiveWorker, UdpSendWorker, WorkerError, WorkerTiming,
};
use crate::infrastructure::storage::config::{AppConfig, TransportMode};
use crate::infrastructure::storage::log_file::{LogSink, LogSinkConfig};

/// What one [`Session::poll`] collected.
#[derive(Debug, Default)]
pub struct SessionUpdate {
    pub log: Vec<LogMessage>,
    pub packets: Vec<Packet>,
    pub events: Vec<NetworkEvent>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.packets.is_empty() && self.events.is_empty()
    }
}

/// Runs the workers for one transport configuration.
pub struct Session {
    config: AppConfig,
    udp_out: UdpSendWorker,
    udp_in: UdpReceiveWorker,
    tcp: TcpClientWorker,
    log_sink: LogSink,
    recent_log: VecDeque<LogMessage>,
    active: Option<TransportMode>,
}

impl Session {
    pub fn new(config: AppConfig) -> Self {
        let timing = WorkerTiming::from(&config.timing);
        Self {
            udp_out: UdpSendWorker::new(timing),
            udp_in: UdpReceiveWorker::new(timing),
            tcp: TcpClientWorker::new(timing),
            log_sink: LogSink::new(),
            recent_log: VecDeque::with_capacity(config.app.log_depth),
            active: None,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The transport currently running, if any.
    pub fn mode(&self) -> Option<TransportMode> {
        self.active
    }

    /// Starts the log sink and the workers for the configured mode.  A
    /// running session is stopped first.
    ///
    /// # Errors
    ///
    /// Fails only if a worker thread cannot be spawned; workers already
    /// started are stopped again.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        self.stop();
        self.start_log_sink();

        let network = self.config.network.clone();
        let started = match network.mode {
            TransportMode::Udp => self
                .udp_out
                .start(&network.ip, network.udp_output_port)
                .and_then(|()| self.udp_in.start(&network.udp_input_ip, network.udp_input_port)),
            TransportMode::Tcp => self.tcp.start(&network.ip, network.tcp_port, network.frame_mode),
        };
        if let Err(e) = started {
            self.stop();
            return Err(e);
        }

        info!(mode = ?network.mode, ip = %network.ip, "session started");
        self.active = Some(network.mode);
        Ok(())
    }

    fn start_log_sink(&mut self) {
        let file = &self.config.log_file;
        if file.file_depth == 0 {
            return;
        }
        let path = match file.resolved_path() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "log file disabled");
                return;
            }
        };
        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "cannot create log directory");
            }
        }
        let poll = Duration::from_millis(self.config.timing.poll_interval_ms.max(1));
        if let Err(e) = self.log_sink.start(LogSinkConfig::from_config(file, path, poll)) {
            warn!(error = %e, "log file disabled");
        }
    }

    /// Stops every worker, collects their final log lines, then stops the
    /// log sink.  Packets received but never polled are dropped.
    pub fn stop(&mut self) {
        self.udp_out.stop();
        self.udp_in.stop();
        self.tcp.stop();
        let last = self.poll();
        if !last.packets.is_empty() {
            info!(count = last.packets.len(), "dropping unpolled packets");
        }
        self.log_sink.stop();
        if self.active.take().is_some() {
            info!("session stopped");
        }
    }

    /// Routes `packet` to the active sender.  Returns `false` when nothing
    /// is running or the packet is empty.
    pub fn send(&self, packet: Packet) -> bool {
        match self.active {
            Some(TransportMode::Udp) => self.udp_out.send(packet),
            Some(TransportMode::Tcp) => self.tcp.send(packet),
            None => false,
        }
    }

    /// Collects everything the workers produced since the previous poll.
    pub fn poll(&mut self) -> SessionUpdate {
        let mut update = SessionUpdate::default();
        self.udp_out.flush(&mut update.log, &mut update.events);
        self.udp_in.flush(&mut update.log, &mut update.packets);
        self.tcp.flush(&mut update.log, &mut update.packets, &mut update.events);

        if !update.log.is_empty() {
            self.log_sink.log(update.log.iter().cloned());
            self.remember(&update.log);
        }
        update
    }

    /// The most recent `log_depth` messages, oldest first.
    pub fn recent_log(&self) -> impl Iterator<Item = &LogMessage> {
        self.recent_log.iter()
    }

    /// Number of recent messages of `kind`.
    pub fn count_recent(&self, kind: LogKind) -> usize {
        self.recent_log.iter().filter(|m| m.kind == kind).count()
    }

    fn remember(&mut self, messages: &[LogMessage]) {
        let depth = self.config.app.log_depth;
        if depth == 0 {
            return;
        }
        for message in messages {
            if self.recent_log.len() == depth {
                self.recent_log.pop_front();
            }
            self.recent_log.push_back(message.clone());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
