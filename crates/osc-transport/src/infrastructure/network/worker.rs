//! Plumbing shared by every network worker.
//!
//! A worker is one OS thread that owns one socket.  The owning thread controls
//! it through a [`RunFlag`] and a join handle; everything else crosses the
//! thread boundary through [`Channels`].
//!
//! # Lifecycle
//!
//! ```text
//!  start()                                           stop()
//!     │                                                 │
//!     ▼                                                 ▼
//!  ┌──────────┐  open ok   ┌───────────┐  error    ┌──────────┐
//!  │ opening  │ ─────────► │  running  │ ────────► │ waiting  │
//!  └──────────┘            └───────────┘           └──────────┘
//!     ▲   │ open failed                                 │
//!     │   └────────────────────────────────────────────►│
//!     └──────────────── reconnect delay elapsed ────────┘
//! ```
//!
//! Clearing the run flag makes every state fall through to "thread ended"
//! within one poll interval or one receive timeout, whichever is longer.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use osc_core::{ExchangeQueue, Mailbox, Packet, WorkerLog};
use thiserror::Error;
use tracing::{debug, warn};

use crate::infrastructure::storage::config::TimingConfig;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while opening or running a worker socket.
///
/// None of these escape the worker thread except [`WorkerError::Spawn`]; the
/// rest are rendered into the user-facing log before the worker waits out its
/// reconnect delay.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("{target} did not resolve to any address")]
    NoAddress { target: String },

    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connection to {addr} timed out after {after:?}")]
    ConnectTimeout { addr: SocketAddr, after: Duration },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

// ── Timing ────────────────────────────────────────────────────────────────────

/// Delays and timeouts used by every worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTiming {
    /// Wait between a failed or dropped socket and the next attempt.
    pub reconnect_delay: Duration,
    /// Granularity at which sleeps re-check the run flag.
    pub poll_interval: Duration,
    /// Blocking receive timeout.
    pub recv_timeout: Duration,
    /// Give up on a TCP connect after this long.
    pub connect_timeout: Duration,
    /// Pause between loop iterations of a running socket.
    pub idle_sleep: Duration,
    /// Blocking write timeout on TCP streams.
    pub write_timeout: Duration,
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for WorkerTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            recv_timeout: Duration::from_millis(config.recv_timeout_ms.max(1)),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            idle_sleep: Duration::from_millis(config.idle_sleep_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms.max(1)),
        }
    }
}

impl WorkerTiming {
    /// Whole seconds of the reconnect delay, for log lines.
    pub(crate) fn reconnect_secs(&self) -> u64 {
        self.reconnect_delay.as_secs()
    }
}

// ── Run flag ──────────────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Creates a flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Asks the worker to wind down.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps for `total` in `step` increments, returning early once `flag` is
/// cleared.  Returns whether the flag is still set.
pub fn sleep_while_running(flag: &RunFlag, total: Duration, step: Duration) -> bool {
    let deadline = Instant::now() + total;
    while flag.is_running() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(step.min(deadline - now));
    }
    flag.is_running()
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Counters updated by a worker thread and read by anyone.
#[derive(Debug, Default)]
pub struct WorkerStats {
    connect_attempts: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    send_failures: AtomicU64,
}

/// A point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connect_attempts: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub send_failures: u64,
}

impl WorkerStats {
    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

// ── Channels ──────────────────────────────────────────────────────────────────

/// Everything a worker thread shares with its owner.
#[derive(Debug, Default)]
pub(crate) struct Channels {
    /// Packets waiting to be transmitted.  Unused by receive-only workers.
    pub outgoing: ExchangeQueue<Packet>,
    pub mailbox: Mailbox,
    pub stats: WorkerStats,
}

impl Channels {
    /// Hands the worker's private log to the owner.
    pub fn update_log(&self, log: &mut WorkerLog) {
        self.mailbox.post_log(log);
    }
}

// ── Thread handle ─────────────────────────────────────────────────────────────

/// A running worker thread.  Stopping clears the flag and joins.
#[derive(Debug)]
pub(crate) struct WorkerThread {
    running: RunFlag,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawns a named thread running `body` with a fresh run flag.
    pub fn spawn<F>(name: String, body: F) -> Result<Self, WorkerError>
    where
        F: FnOnce(RunFlag) + Send + 'static,
    {
        let running = RunFlag::new();
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || body(flag))
            .map_err(WorkerError::Spawn)?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Clears the run flag and waits for the thread to exit.
    pub fn stop(&mut self) {
        self.running.clear();
        if let Some(handle) = self.handle.take() {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "worker thread panicked");
            } else {
                debug!(thread = %name, "worker thread joined");
            }
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Resolves `host:port`, preferring an IPv4 address when both families are
/// returned.
pub fn resolve_target(host: &str, port: u16) -> Result<SocketAddr, WorkerError> {
    let target = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| WorkerError::Resolve {
            target: target.clone(),
            source,
        })?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or(WorkerError::NoAddress { target })
}

/// Returns `true` for the error kinds a read timeout produces.
///
/// Unix reports an expired `SO_RCVTIMEO` as `WouldBlock`, Windows as
/// `TimedOut`.
pub fn is_timeout_error(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
