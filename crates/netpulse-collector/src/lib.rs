//! Stat sources for the netpulse agent.
//!
//! Each [`Collector`] samples one stat domain (CPU, memory, disk, network I/O,
//! network speed) and returns it as a typed [`Measurement`] ready for the sink.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;
pub mod procfs;
pub mod speedtest;

use anyhow::Result;
use async_trait::async_trait;
use netpulse_common::types::Measurement;

/// A host or network stat source driven by the agent's scheduler.
///
/// Collectors are awaited one at a time; a collector may use concurrency
/// internally but must hand back a single result.
#[async_trait]
pub trait Collector: Send {
    /// Returns the collector name (e.g., `"cpu"`, `"disk"`), used for logging.
    fn name(&self) -> &str;

    /// Samples the stat domain once.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API or remote test fails. The
    /// scheduler logs it and skips the write for this round.
    async fn collect(&mut self) -> Result<Measurement>;
}
