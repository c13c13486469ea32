//! User-facing log messages and the per-worker private log.
//!
//! Worker threads produce a lot of log lines: one per packet sent or
//! received, plus lifecycle messages.  Taking the shared lock for every single
//! line would make the UI thread and the worker contend constantly, so each
//! worker writes into its own unsynchronised [`WorkerLog`] and hands the whole
//! batch to its [`crate::Mailbox`] once per loop iteration.
//!
//! Every entry is also mirrored to `tracing` so operators running the headless
//! binary see the same lines on stderr.

use chrono::{DateTime, Local};
use tracing::{error, info, trace, warn};

/// What a log line is about.  The UI colours lines by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Info,
    Warning,
    Error,
    /// A packet was transmitted.
    Send,
    /// A packet was received.
    Recv,
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub timestamp: DateTime<Local>,
    pub kind: LogKind,
    pub text: String,
}

impl LogMessage {
    /// Creates an entry stamped with the current local time.
    pub fn new(kind: LogKind, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            text: text.into(),
        }
    }

    /// Renders the entry as a log-file line: `[HH:MM:SS] text`.
    pub fn to_line(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// A private, append-only log owned by one worker thread.
#[derive(Debug, Default)]
pub struct WorkerLog {
    entries: Vec<LogMessage>,
}

impl WorkerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and mirrors it to `tracing`.
    pub fn add(&mut self, kind: LogKind, text: impl Into<String>) {
        let message = LogMessage::new(kind, text);
        match kind {
            LogKind::Info => info!("{}", message.text),
            LogKind::Warning => warn!("{}", message.text),
            LogKind::Error => error!("{}", message.text),
            LogKind::Send | LogKind::Recv => trace!(kind = ?kind, "{}", message.text),
        }
        self.entries.push(message);
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.add(LogKind::Info, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.add(LogKind::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.add(LogKind::Error, text);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogMessage] {
        &self.entries
    }

    /// Moves every entry onto the end of `shared`, leaving this log empty.
    ///
    /// The private buffer keeps its capacity, so a steady-state worker does not
    /// reallocate on every loop iteration.
    pub fn merge_into(&mut self, shared: &mut Vec<LogMessage>) {
        shared.append(&mut self.entries);
    }

    /// Discards every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
