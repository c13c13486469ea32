//! Storage infrastructure: configuration file persistence and the log file.
//!
//! - `config` reads and writes the TOML configuration from the
//!   platform-appropriate directory, with defaults for a first run.
//! - `log_file` runs the [`log_file::LogSink`] thread that keeps a capped
//!   text file of the most recent user-facing log lines.

pub mod config;
pub mod log_file;
