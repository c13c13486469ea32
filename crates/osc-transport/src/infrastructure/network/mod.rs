//! Network workers.
//!
//! Each worker owns exactly one socket on its own OS thread and talks to the
//! owning (UI) thread only through swap-drain queues.
//!
//! # Sub-modules
//!
//! - **`worker`** – Plumbing shared by every worker: the run flag, timing
//!   configuration, statistics counters, the thread handle with join-on-stop,
//!   and target resolution.
//!
//! - **`formatter`** – The [`PacketFormatter`] seam used to render packets
//!   into log lines.
//!
//! - **`udp_out`** – [`UdpSendWorker`]: transmits queued packets as datagrams.
//!
//! - **`udp_in`** – [`UdpReceiveWorker`]: listens for datagrams and queues them
//!   for the UI thread.
//!
//! - **`tcp_client`** – [`TcpClientWorker`]: one framed TCP connection with a
//!   connect/connected/disconnected state machine.

pub mod formatter;
pub mod tcp_client;
pub mod udp_in;
pub mod udp_out;
pub mod worker;

pub use formatter::{OscFormatter, PacketFormatter};
pub use tcp_client::TcpClientWorker;
pub use udp_in::UdpReceiveWorker;
pub use udp_out::UdpSendWorker;
pub use worker::{RunFlag, StatsSnapshot, WorkerError, WorkerStats, WorkerTiming};
