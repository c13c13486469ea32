//! Capped log file.
//!
//! The [`LogSink`] thread collects user-facing log messages through a
//! swap-drain queue and, on a fixed period, rewrites the whole file with the
//! most recent `max_lines` lines.  The file is truncated and rewritten every
//! cycle rather than appended to, so it never grows past the cap.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use osc_core::{ExchangeQueue, LogMessage};
use tracing::{debug, warn};

use crate::infrastructure::network::worker::{
    sleep_while_running, RunFlag, WorkerError, WorkerThread,
};
use crate::infrastructure::storage::config::LogFileConfig;

/// Where and how often the sink writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSinkConfig {
    pub path: PathBuf,
    /// Lines kept in the file.  `0` disables the sink.
    pub max_lines: usize,
    pub flush_interval: Duration,
    /// Granularity at which the flush sleep re-checks the run flag.
    pub poll_interval: Duration,
}

impl LogSinkConfig {
    pub fn from_config(config: &LogFileConfig, path: PathBuf, poll_interval: Duration) -> Self {
        Self {
            path,
            max_lines: config.file_depth,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            poll_interval,
        }
    }
}

/// Background writer for the capped log file.
#[derive(Debug, Default)]
pub struct LogSink {
    queue: Arc<ExchangeQueue<LogMessage>>,
    thread: Option<WorkerThread>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the writer thread.  A running sink is stopped first.  When
    /// `config.max_lines` is zero nothing is started.
    pub fn start(&mut self, config: LogSinkConfig) -> Result<(), WorkerError> {
        self.stop();
        self.queue.drain();
        if config.max_lines == 0 {
            debug!("log file disabled");
            return Ok(());
        }

        let queue = Arc::clone(&self.queue);
        self.thread = Some(WorkerThread::spawn("log-sink".to_string(), move |running| {
            run(&running, &queue, &config)
        })?);
        Ok(())
    }

    /// Stops the thread.  Messages queued before this call are written by a
    /// final cycle; nothing queued afterwards is.
    pub fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Queues messages for the next write.  Ignored while stopped.
    pub fn log(&self, messages: impl IntoIterator<Item = LogMessage>) {
        if self.is_running() {
            self.queue.extend(messages);
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(running: &RunFlag, queue: &ExchangeQueue<LogMessage>, config: &LogSinkConfig) {
    let mut lines: VecDeque<String> = VecDeque::with_capacity(config.max_lines);
    let mut dirty = true;
    let mut failing = false;

    loop {
        let batch = queue.drain();
        if !batch.is_empty() {
            for message in batch {
                if lines.len() == config.max_lines {
                    lines.pop_front();
                }
                lines.push_back(message.to_line());
            }
            dirty = true;
        }

        if dirty {
            match rewrite(&config.path, &lines) {
                Ok(()) => {
                    dirty = false;
                    failing = false;
                }
                Err(e) => {
                    if !failing {
                        warn!(path = %config.path.display(), error = %e, "cannot write log file");
                    }
                    failing = true;
                }
            }
        }

        if !running.is_running() {
            break;
        }
        sleep_while_running(running, config.flush_interval, config.poll_interval);
    }
}

/// Truncates `path` and writes `lines`, one per line.
fn rewrite(path: &Path, lines: &VecDeque<String>) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}
