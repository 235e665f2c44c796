use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use sim20::Queue;

use crate::{Error, Process, ProcessId, Result, SchedulingMode, Statistics};

/// What happens next to a process that has just been activated on the CPU, and after how much
/// CPU time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Burst {
    /// The process finishes.
    Complete(Duration),
    /// The process requests I/O.
    Io(Duration),
    /// The time quantum expires and the process is preempted.
    Preempt(Duration),
}

/// Decides which of CPU completion, I/O request, or quantum expiry happens first.
///
/// Ties are resolved in favor of completion, then I/O.
#[must_use]
pub fn next_burst(remaining: Duration, to_io: Option<Duration>, quantum: Duration) -> Burst {
    match to_io {
        _ if remaining <= quantum && to_io.map_or(true, |io| remaining <= io) => {
            Burst::Complete(remaining)
        }
        Some(io) if io <= quantum && io < remaining => Burst::Io(io),
        _ => Burst::Preempt(quantum),
    }
}

/// Phase of the priority round-robin policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Processes are taken from the head of the ready queue and run for one quantum.
    Fifo,
    /// Processes are taken in order of the least remaining CPU time and run until they finish
    /// or request I/O.
    Priority,
}

impl Phase {
    fn flip(self) -> Self {
        match self {
            Self::Fifo => Self::Priority,
            Self::Priority => Self::Fifo,
        }
    }
}

/// Index entry: remaining CPU time, position in the ready queue when indexed, process ID.
type IndexEntry = Reverse<(Duration, usize, ProcessId)>;

/// Cohort bookkeeping of the priority round-robin policy.
///
/// The ready queue stays the only owner of waiting processes. A cohort is the set of processes
/// waiting when a phase starts; the phase flips once each of them has been activated. The
/// index holds the IDs of the current cohort ordered by remaining CPU time.
///
/// A phase that starts while no process is waiting takes its cohort from the ready queue at
/// its first selection instead.
#[derive(Debug)]
struct Phases {
    phase: Phase,
    cohort_remaining: usize,
    index: BinaryHeap<IndexEntry>,
}

impl Default for Phases {
    fn default() -> Self {
        Self {
            phase: Phase::Fifo,
            cohort_remaining: 0,
            index: BinaryHeap::new(),
        }
    }
}

impl Phases {
    /// Makes every process currently waiting a member of the cohort.
    fn form_cohort(&mut self, ready: &Queue<Process>) {
        self.index = ready
            .iter()
            .enumerate()
            .map(|(position, p)| Reverse((p.remaining_cpu(), position, p.id())))
            .collect();
        self.cohort_remaining = self.index.len();
        log::debug!(
            "Priority RR {:?} phase with a cohort of {}",
            self.phase,
            self.cohort_remaining
        );
    }

    /// Counts one activation. When the cohort runs out, the phase flips and the processes
    /// currently waiting form the next cohort.
    fn activated(&mut self, ready: &Queue<Process>) {
        self.cohort_remaining = self.cohort_remaining.saturating_sub(1);
        if self.cohort_remaining == 0 {
            self.phase = self.phase.flip();
            self.form_cohort(ready);
        }
    }
}

/// Result of activating a process on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    /// The activated process.
    pub process: ProcessId,
    /// The priority round-robin phase the process was selected in; `None` in round-robin mode.
    pub phase: Option<Phase>,
    /// What happens to the process next.
    pub burst: Burst,
}

/// The processor: the ready queue and the currently running process.
#[derive(Debug)]
pub struct Cpu {
    ready: Queue<Process>,
    active: Option<Process>,
    quantum: Duration,
    mode: SchedulingMode,
    phases: Phases,
}

impl Cpu {
    /// Creates an idle CPU with the given time quantum and scheduling policy.
    #[must_use]
    pub fn new(quantum: Duration, mode: SchedulingMode) -> Self {
        Self {
            ready: Queue::default(),
            active: None,
            quantum,
            mode,
            phases: Phases::default(),
        }
    }

    /// Places `process` at the back of the ready queue.
    ///
    /// # Errors
    ///
    /// Fails if the process cannot become ready from its current state.
    pub fn insert(&mut self, mut process: Process, now: Duration) -> Result<()> {
        process.enter_ready(now)?;
        self.ready
            .push_back(process)
            .map_err(|_| Error::Invariant(String::from("ready queue is bounded")))
    }

    /// Selects the next process according to the scheduling policy and starts running it.
    /// Returns `None` if no process is ready.
    ///
    /// # Errors
    ///
    /// Fails if another process is still running.
    pub fn activate(&mut self, now: Duration) -> Result<Option<Activation>> {
        if let Some(active) = &self.active {
            return Err(Error::Invariant(format!(
                "tried to activate a process while {} is running",
                active.id()
            )));
        }
        let (mut process, phase) = match self.select() {
            Some(selected) => selected,
            None => return Ok(None),
        };
        process.run(now)?;
        let quantum = match phase {
            Some(Phase::Priority) => process.remaining_cpu(),
            Some(Phase::Fifo) | None => self.quantum,
        };
        let activation = Activation {
            process: process.id(),
            phase,
            burst: next_burst(process.remaining_cpu(), process.time_to_next_io(), quantum),
        };
        self.active = Some(process);
        Ok(Some(activation))
    }

    fn select(&mut self) -> Option<(Process, Option<Phase>)> {
        match self.mode {
            SchedulingMode::RoundRobin => self.ready.pop_front().map(|p| (p, None)),
            SchedulingMode::PriorityRoundRobin => {
                if self.phases.cohort_remaining == 0 && !self.ready.is_empty() {
                    self.phases.form_cohort(&self.ready);
                }
                let phase = self.phases.phase;
                let process = match phase {
                    Phase::Fifo => self.ready.pop_front(),
                    Phase::Priority => self.pop_prioritized(),
                }?;
                self.phases.activated(&self.ready);
                Some((process, Some(phase)))
            }
        }
    }

    /// Takes the cohort member with the least remaining CPU time.
    fn pop_prioritized(&mut self) -> Option<Process> {
        while let Some(Reverse((_, _, id))) = self.phases.index.pop() {
            if let Some(process) = self.ready.remove_where(|p| p.id() == id) {
                return Some(process);
            }
        }
        self.ready.pop_front()
    }

    /// Moves the running process to the back of the ready queue.
    ///
    /// # Errors
    ///
    /// Fails if no process is running.
    pub fn preempt(&mut self, now: Duration) -> Result<ProcessId> {
        let process = self.take_active()?;
        let id = process.id();
        self.insert(process, now)?;
        Ok(id)
    }

    /// Removes and returns the running process, leaving the CPU idle.
    ///
    /// # Errors
    ///
    /// Fails if no process is running.
    pub fn take_active(&mut self) -> Result<Process> {
        self.active
            .take()
            .ok_or_else(|| Error::Invariant(String::from("no process is running on the CPU")))
    }

    /// The running process, if any.
    #[must_use]
    pub fn active(&self) -> Option<&Process> {
        self.active.as_ref()
    }

    /// Checks if the process with the given ID is the one running.
    #[must_use]
    pub fn is_running(&self, id: ProcessId) -> bool {
        self.active.as_ref().map_or(false, |p| p.id() == id)
    }

    /// Checks if no process is running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Number of processes in the ready queue.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Iterates over the ready queue from front to back.
    pub fn ready(&self) -> impl Iterator<Item = &Process> {
        self.ready.iter()
    }

    /// The current priority round-robin phase; `None` in round-robin mode.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self.mode {
            SchedulingMode::RoundRobin => None,
            SchedulingMode::PriorityRoundRobin => Some(self.phases.phase),
        }
    }

    /// Updates the ready queue and CPU utilization statistics.
    pub fn time_passed(&self, elapsed: Duration, statistics: &mut Statistics) {
        statistics.ready_queue.observe(self.ready.len(), elapsed);
        if self.active.is_some() {
            statistics.cpu_active_time += elapsed;
        } else {
            statistics.cpu_idle_time += elapsed;
        }
        statistics.total_time += elapsed;
    }
}
