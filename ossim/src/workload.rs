use std::io::Read;
use std::time::Duration;

use itertools::Itertools;
use rand::{Rng, RngCore};
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

use crate::{Demand, Error, IoProfile, Result, TimeDistribution};

/// Source of arriving processes.
pub trait Workload {
    /// Time of the first arrival, or `None` if no process ever arrives.
    fn first_arrival(&self) -> Option<Duration>;

    /// Time of the arrival following the one at `now`, or `None` if there are no more.
    fn next_arrival(&mut self, now: Duration, rng: &mut dyn RngCore) -> Option<Duration>;

    /// Resource demand of the process arriving now.
    fn demand(&mut self, rng: &mut dyn RngCore) -> Option<Demand>;
}

/// Random processes arriving at random intervals.
///
/// * memory: `100 KB` plus a uniform share of up to a quarter of the memory size,
/// * CPU time: uniform in `[100ms, 10s)`,
/// * I/O: at uniformly random intervals averaging between 1% and 25% of the CPU time.
pub struct RandomWorkload {
    memory_size: u64,
    interval: Box<dyn TimeDistribution>,
}

impl std::fmt::Debug for RandomWorkload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomWorkload")
            .field("memory_size", &self.memory_size)
            .finish()
    }
}

impl RandomWorkload {
    const BASE_MEMORY: u64 = 100;
    const MIN_CPU_TIME: u64 = 100;
    const MAX_CPU_TIME: u64 = 10_000;

    /// Processes fitting in `memory_size` KB, arriving every `avg_arrival_interval` on average.
    /// Intervals are uniform in `[1ms, 2 * avg_arrival_interval]`.
    #[must_use]
    pub fn new(memory_size: u64, avg_arrival_interval: Duration) -> Self {
        let high = std::cmp::max(crate::millis(avg_arrival_interval).saturating_mul(2), 1);
        Self::with_interval(memory_size, Uniform::new_inclusive(1, high))
    }

    /// Processes with intervals between arrivals (in milliseconds) drawn from `interval`.
    #[must_use]
    pub fn with_interval<D: TimeDistribution + 'static>(memory_size: u64, interval: D) -> Self {
        Self {
            memory_size,
            interval: Box::new(interval),
        }
    }
}

impl Workload for RandomWorkload {
    fn first_arrival(&self) -> Option<Duration> {
        Some(Duration::default())
    }

    fn next_arrival(&mut self, now: Duration, rng: &mut dyn RngCore) -> Option<Duration> {
        Some(now + self.interval.sample_time(rng))
    }

    fn demand(&mut self, rng: &mut dyn RngCore) -> Option<Demand> {
        let span = (self.memory_size / 4).saturating_sub(Self::BASE_MEMORY);
        let memory = Self::BASE_MEMORY + if span > 0 { rng.gen_range(0..span) } else { 0 };
        let cpu_time = rng.gen_range(Self::MIN_CPU_TIME..Self::MAX_CPU_TIME);
        let io_share = rng.gen_range(1..=25_u64);
        Some(Demand {
            memory,
            cpu_time: Duration::from_millis(cpu_time),
            io: IoProfile::Uniform {
                average: Duration::from_millis(io_share * cpu_time / 100),
            },
        })
    }
}

/// I/O behavior of a traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoSpec {
    /// No I/O.
    None,
    /// I/O after every given number of milliseconds of CPU time.
    Fixed(u64),
    /// I/O at uniformly random intervals averaging the given number of milliseconds.
    Uniform(u64),
}

impl Default for IoSpec {
    fn default() -> Self {
        Self::None
    }
}

impl From<IoSpec> for IoProfile {
    fn from(io: IoSpec) -> Self {
        match io {
            IoSpec::None => Self::None,
            IoSpec::Fixed(interval) => Self::Fixed(Duration::from_millis(interval)),
            IoSpec::Uniform(average) => Self::Uniform {
                average: Duration::from_millis(average),
            },
        }
    }
}

/// A single traced process arrival. Times are in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    /// Arrival time.
    pub at: u64,
    /// Memory needed, in kilobytes.
    pub memory: u64,
    /// Total CPU time needed.
    pub cpu_time: u64,
    /// I/O behavior.
    #[serde(default)]
    pub io: IoSpec,
}

impl Arrival {
    fn demand(&self) -> Demand {
        Demand {
            memory: self.memory,
            cpu_time: Duration::from_millis(self.cpu_time),
            io: self.io.into(),
        }
    }
}

/// A predetermined list of arrivals, replayed in order.
#[derive(Debug, Clone)]
pub struct TraceWorkload {
    arrivals: Vec<Arrival>,
    next: usize,
}

impl TraceWorkload {
    /// Creates a workload replaying `arrivals`.
    ///
    /// # Errors
    ///
    /// Fails if arrivals are not sorted by time, or if any process needs no CPU time or has
    /// a zero I/O interval.
    pub fn new(arrivals: Vec<Arrival>) -> Result<Self> {
        if let Some((a, b)) = arrivals.iter().tuple_windows().find(|(a, b)| a.at > b.at) {
            return Err(Error::Trace(format!(
                "arrival at {} ms listed before arrival at {} ms",
                a.at, b.at
            )));
        }
        for (n, arrival) in arrivals.iter().enumerate() {
            if arrival.cpu_time == 0 {
                return Err(Error::Trace(format!("process #{} needs no CPU time", n)));
            }
            if let IoSpec::Fixed(0) | IoSpec::Uniform(0) = arrival.io {
                return Err(Error::Trace(format!("process #{} has a zero I/O interval", n)));
            }
        }
        Ok(Self { arrivals, next: 0 })
    }

    /// Reads a JSON array of arrivals.
    ///
    /// # Errors
    ///
    /// Fails if the input cannot be parsed or the trace is invalid.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        Self::new(serde_json::from_reader(reader)?)
    }
}

impl Workload for TraceWorkload {
    fn first_arrival(&self) -> Option<Duration> {
        self.arrivals
            .first()
            .map(|a| Duration::from_millis(a.at))
    }

    fn next_arrival(&mut self, _now: Duration, _rng: &mut dyn RngCore) -> Option<Duration> {
        self.arrivals
            .get(self.next)
            .map(|a| Duration::from_millis(a.at))
    }

    fn demand(&mut self, _rng: &mut dyn RngCore) -> Option<Demand> {
        let arrival = self.arrivals.get(self.next)?;
        self.next += 1;
        Some(arrival.demand())
    }
}
