use std::time::Duration;

use derive_more::{Display, From, Into};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Process ID, unique throughout the entire simulation.
#[derive(
    From,
    Into,
    Debug,
    PartialEq,
    PartialOrd,
    Eq,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
    Display,
)]
pub struct ProcessId(usize);

/// Describes when a process needs to perform I/O operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoProfile {
    /// The process never performs I/O.
    None,
    /// The process requests I/O after every `interval` of CPU time.
    Fixed(Duration),
    /// The CPU time until each I/O request is drawn uniformly from `[1ms, 2 * average]`.
    Uniform {
        /// Average CPU time between I/O requests.
        average: Duration,
    },
}

impl IoProfile {
    /// Draws the CPU time until the next I/O request, or `None` if no I/O is ever needed.
    pub fn next_interval(&self, rng: &mut dyn RngCore) -> Option<Duration> {
        match *self {
            Self::None => None,
            Self::Fixed(interval) => Some(interval),
            Self::Uniform { average } => {
                let high = std::cmp::max(crate::millis(average).saturating_mul(2), 1);
                Some(Duration::from_millis(rng.gen_range(1..=high)))
            }
        }
    }
}

/// The immutable resource demand of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    /// Memory needed, in kilobytes.
    pub memory: u64,
    /// Total CPU time needed to finish.
    pub cpu_time: Duration,
    /// When the process needs I/O.
    pub io: IoProfile,
}

/// Lifecycle state of a process. Each state corresponds to exactly one location in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Waiting in the memory queue for admission.
    AwaitingMemory,
    /// Waiting in the CPU ready queue.
    Ready,
    /// Currently executing on the CPU.
    Running,
    /// Waiting in the I/O queue.
    AwaitingIo,
    /// Currently served by the I/O device.
    InIo,
    /// Finished; memory has been released.
    Terminated,
}

/// Time a process spent in each location, and how many times it entered the queues.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTimes {
    /// Time spent in the memory queue.
    pub waiting_for_memory: Duration,
    /// Time spent in the ready queue.
    pub waiting_for_cpu: Duration,
    /// Time spent running on the CPU.
    pub in_cpu: Duration,
    /// Time spent in the I/O queue.
    pub waiting_for_io: Duration,
    /// Time spent being served by the I/O device.
    pub in_io: Duration,
    /// Number of times the process was placed in the ready queue.
    pub times_in_ready_queue: u64,
    /// Number of times the process was placed in the I/O queue.
    pub times_in_io_queue: u64,
}

/// A simulated process.
///
/// The process records the moment it entered its current location. Every state transition
/// adds the elapsed time to the matching counter in [`ProcessTimes`]; leaving the CPU also
/// consumes the remaining CPU need and the CPU time left until the next I/O request.
#[derive(Debug, Clone)]
pub struct Process {
    id: ProcessId,
    demand: Demand,
    arrival: Duration,
    state: ProcessState,
    remaining_cpu: Duration,
    time_to_next_io: Option<Duration>,
    entered: Duration,
    times: ProcessTimes,
}

impl Process {
    /// Creates a process arriving at `arrival`, waiting for memory.
    pub fn new(id: ProcessId, demand: Demand, arrival: Duration, rng: &mut dyn RngCore) -> Self {
        Self {
            id,
            demand,
            arrival,
            state: ProcessState::AwaitingMemory,
            remaining_cpu: demand.cpu_time,
            time_to_next_io: demand.io.next_interval(rng),
            entered: arrival,
            times: ProcessTimes::default(),
        }
    }

    /// Process ID.
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Resource demand.
    #[must_use]
    pub fn demand(&self) -> &Demand {
        &self.demand
    }

    /// Memory needed, in kilobytes.
    #[must_use]
    pub fn memory(&self) -> u64 {
        self.demand.memory
    }

    /// The time at which the process was created.
    #[must_use]
    pub fn arrival(&self) -> Duration {
        self.arrival
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// CPU time still needed to finish.
    #[must_use]
    pub fn remaining_cpu(&self) -> Duration {
        self.remaining_cpu
    }

    /// CPU time left until the next I/O request, or `None` if the process does no more I/O.
    #[must_use]
    pub fn time_to_next_io(&self) -> Option<Duration> {
        self.time_to_next_io
    }

    /// Accumulated time counters.
    #[must_use]
    pub fn times(&self) -> &ProcessTimes {
        &self.times
    }

    /// Places the process in the ready queue.
    ///
    /// # Errors
    ///
    /// Fails if the process is not waiting for memory, running, or finishing I/O.
    pub fn enter_ready(&mut self, now: Duration) -> Result<()> {
        self.transition(ProcessState::Ready, now)
    }

    /// Starts executing on the CPU.
    ///
    /// # Errors
    ///
    /// Fails if the process is not ready.
    pub fn run(&mut self, now: Duration) -> Result<()> {
        self.transition(ProcessState::Running, now)
    }

    /// Places a running process in the I/O queue.
    ///
    /// # Errors
    ///
    /// Fails if the process is not running.
    pub fn enter_io_queue(&mut self, now: Duration) -> Result<()> {
        self.transition(ProcessState::AwaitingIo, now)
    }

    /// Starts being served by the I/O device.
    ///
    /// # Errors
    ///
    /// Fails if the process is not waiting for I/O.
    pub fn start_io(&mut self, now: Duration) -> Result<()> {
        self.transition(ProcessState::InIo, now)
    }

    /// Finishes the process.
    ///
    /// # Errors
    ///
    /// Fails if the process is not running.
    pub fn terminate(&mut self, now: Duration) -> Result<()> {
        self.transition(ProcessState::Terminated, now)
    }

    /// Draws the CPU time until the next I/O request after an I/O operation has completed.
    pub fn complete_io(&mut self, rng: &mut dyn RngCore) {
        self.time_to_next_io = self.demand.io.next_interval(rng);
    }

    fn transition(&mut self, to: ProcessState, now: Duration) -> Result<()> {
        use ProcessState::{AwaitingIo, AwaitingMemory, InIo, Ready, Running, Terminated};
        let allowed = matches!(
            (self.state, to),
            (AwaitingMemory, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Running, AwaitingIo)
                | (Running, Terminated)
                | (AwaitingIo, InIo)
                | (InIo, Ready)
        );
        if !allowed {
            return Err(Error::Invariant(format!(
                "process {} cannot go from {:?} to {:?}",
                self.id, self.state, to
            )));
        }
        let elapsed = now.checked_sub(self.entered).ok_or_else(|| {
            Error::Invariant(format!(
                "process {} left {:?} at {:?}, before entering it at {:?}",
                self.id, self.state, now, self.entered
            ))
        })?;
        match self.state {
            AwaitingMemory => self.times.waiting_for_memory += elapsed,
            Ready => self.times.waiting_for_cpu += elapsed,
            Running => {
                self.times.in_cpu += elapsed;
                self.remaining_cpu = self.remaining_cpu.saturating_sub(elapsed);
                self.time_to_next_io = self.time_to_next_io.map(|t| t.saturating_sub(elapsed));
            }
            AwaitingIo => self.times.waiting_for_io += elapsed,
            InIo => self.times.in_io += elapsed,
            Terminated => {}
        }
        match to {
            Ready => self.times.times_in_ready_queue += 1,
            AwaitingIo => self.times.times_in_io_queue += 1,
            _ => {}
        }
        self.state = to;
        self.entered = now;
        Ok(())
    }
}
