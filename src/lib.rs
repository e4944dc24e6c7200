//! plfsbench - A Parallel Write Benchmark for plfsdir-Style Storage
//!
//! plfsbench drives a log-structured, multi-writer directory ("plfsdir")
//! from many cooperating ranks. Each rank writes a fixed number of
//! deterministically named key/value records per epoch, all ranks
//! rendezvous at a barrier, and the epoch is flushed and sealed before
//! the next one begins. This bounds cross-rank skew to one epoch and
//! gives the storage layer a consistent global cut per epoch.
//!
//! # Architecture
//!
//! - **Configuration** ([`config`]): defaults, TOML file loading and
//!   CLI override merging into an immutable [`config::RunConfig`]
//! - **Coordination** ([`comm`]): rank/size detection from the job
//!   launcher environment and a shared-filesystem epoch barrier
//! - **Storage seam** ([`plfsdir`]): the directory handle trait, the
//!   handle configuration record, a local log-structured backend, an
//!   optional background worker pool and the remote-storage ("bbos")
//!   environment record
//! - **Workload** ([`record`], [`driver`]): deterministic record
//!   generation and the epoch write loop
//! - **Reporting** ([`stats`], [`logging`]): per-epoch timing report
//!   and rank-prefixed log output
//! - **Watchdog** ([`watchdog`]): wall-clock guard that kills the
//!   process if any blocking call hangs past the configured timeout

pub mod comm;
pub mod config;
pub mod driver;
pub mod logging;
pub mod plfsdir;
pub mod record;
pub mod stats;
pub mod watchdog;
