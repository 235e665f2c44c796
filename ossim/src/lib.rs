//! Operating system scheduler simulation.
//!
//! Synthetic processes arrive, wait for memory, time-share a single CPU under either
//! round-robin or two-phase priority round-robin scheduling, and perform I/O on a single
//! device. The simulation is driven by discrete events (see [`EventKind`]) and collects
//! aggregate [`Statistics`] along the way.

#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::cast_precision_loss
)]

use std::convert::TryFrom;
use std::time::Duration;

use rand::RngCore;
use rand_distr::Distribution;

mod config;
pub use config::{SchedulingMode, SimulationConfig, MAX_AVERAGE_TIME, MIN_MEMORY_SIZE};

mod cpu;
pub use cpu::{next_burst, Activation, Burst, Cpu, Phase};

mod io;
pub use io::Io;

mod memory;
pub use memory::Memory;

mod observer;
pub use observer::{NoopObserver, Observer};

mod process;
pub use process::{Demand, IoProfile, Process, ProcessId, ProcessState, ProcessTimes};

mod simulation;
pub use simulation::{EventKind, HistoryEntry, Simulation};

mod statistics;
pub use statistics::{
    ProcessAverages, ProcessRecord, ProcessTotals, QueueStatistics, Report, Statistics,
};

mod workload;
pub use workload::{Arrival, IoSpec, RandomWorkload, TraceWorkload, Workload};

/// Errors raised by the simulation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The scheduler reached a state that must never happen.
    #[error("scheduler invariant violated: {0}")]
    Invariant(String),
    /// An event could not be scheduled.
    #[error(transparent)]
    Schedule(#[from] sim20::ScheduleError),
    /// The workload trace is malformed.
    #[error("invalid workload trace: {0}")]
    Trace(String),
    /// A configuration or trace file could not be parsed.
    #[error("unable to parse input: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type returned by the simulation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Object-safe source of random time spans.
///
/// It is implemented for every [`Distribution`] of `u64` values, which are interpreted as
/// milliseconds. This lets resources hold a boxed distribution and lets tests swap in
/// deterministic ones.
pub trait TimeDistribution {
    /// Draws a time span.
    fn sample_time(&self, rng: &mut dyn RngCore) -> Duration;
}

impl<D: Distribution<u64>> TimeDistribution for D {
    fn sample_time(&self, rng: &mut dyn RngCore) -> Duration {
        Duration::from_millis(self.sample(rng))
    }
}

/// Converts a duration to whole milliseconds, saturating at [`u64::MAX`].
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
