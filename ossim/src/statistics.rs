use std::convert::TryFrom;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::{millis, Process, ProcessId};

/// Time-weighted length of a queue and the largest length observed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatistics {
    /// Sum of `length * elapsed` over the simulation.
    pub length_time: Duration,
    /// The largest length that occurred.
    pub largest_length: usize,
}

impl QueueStatistics {
    /// Records that the queue had `length` elements for `elapsed` time.
    pub fn observe(&mut self, length: usize, elapsed: Duration) {
        let length_factor = u32::try_from(length).unwrap_or(u32::MAX);
        self.length_time = self
            .length_time
            .saturating_add(elapsed.saturating_mul(length_factor));
        self.largest_length = std::cmp::max(self.largest_length, length);
    }

    /// Average length over a simulation of the given length.
    #[must_use]
    pub fn average_length(&self, simulation_length: Duration) -> f64 {
        ratio(self.length_time.as_secs_f64(), simulation_length.as_secs_f64())
    }
}

/// Per-process data stored for every completed process, e.g., to be written as a CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    /// Process ID.
    pub id: ProcessId,
    /// Memory used, in kilobytes.
    pub memory: u64,
    /// Total CPU time needed, in milliseconds.
    pub cpu_time: u64,
    /// Arrival time, in milliseconds.
    pub arrival: u64,
    /// Time of termination, in milliseconds.
    pub end: u64,
    /// Time spent waiting for memory, in milliseconds.
    pub waiting_for_memory: u64,
    /// Time spent waiting for the CPU, in milliseconds.
    pub waiting_for_cpu: u64,
    /// Time spent running, in milliseconds.
    pub in_cpu: u64,
    /// Time spent waiting for I/O, in milliseconds.
    pub waiting_for_io: u64,
    /// Time spent in I/O, in milliseconds.
    pub in_io: u64,
    /// Number of times placed in the ready queue.
    pub times_in_ready_queue: u64,
    /// Number of times placed in the I/O queue.
    pub times_in_io_queue: u64,
}

/// Sums of per-process counters over all completed processes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTotals {
    /// Total time in the system.
    pub time_in_system: Duration,
    /// Total time waiting for memory.
    pub waiting_for_memory: Duration,
    /// Total time waiting for the CPU.
    pub waiting_for_cpu: Duration,
    /// Total time running.
    pub in_cpu: Duration,
    /// Total time waiting for I/O.
    pub waiting_for_io: Duration,
    /// Total time in I/O.
    pub in_io: Duration,
    /// Total number of placements in the ready queue.
    pub times_in_ready_queue: u64,
    /// Total number of placements in the I/O queue.
    pub times_in_io_queue: u64,
}

/// Accumulates simulation counters. Written by the simulation on every relevant transition,
/// read only to produce a [`Report`].
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    /// Number of processes that entered the system.
    pub created_processes: u64,
    /// Number of processes that exited the system.
    pub completed_processes: u64,
    /// Number of forced process switches (quantum expirations).
    pub process_switches: u64,
    /// Number of completed I/O operations.
    pub processed_io_operations: u64,
    /// Time the CPU was running a process.
    pub cpu_active_time: Duration,
    /// Time the CPU was idle.
    pub cpu_idle_time: Duration,
    /// Total simulated time.
    pub total_time: Duration,
    /// Memory queue statistics.
    pub memory_queue: QueueStatistics,
    /// Ready queue statistics.
    pub ready_queue: QueueStatistics,
    /// I/O queue statistics.
    pub io_queue: QueueStatistics,
    /// Sums over completed processes.
    pub completed: ProcessTotals,
    records: Option<Vec<ProcessRecord>>,
}

impl Statistics {
    /// Keep a [`ProcessRecord`] for every completed process.
    #[must_use]
    pub fn with_records(mut self) -> Self {
        self.records = Some(Vec::new());
        self
    }

    /// Records of completed processes; empty unless enabled with [`Statistics::with_records`].
    #[must_use]
    pub fn records(&self) -> &[ProcessRecord] {
        self.records.as_deref().unwrap_or(&[])
    }

    /// Folds the counters of a process terminated at `now` into the totals.
    pub fn finish(&mut self, process: &Process, now: Duration) {
        let times = process.times();
        let time_in_system = now.saturating_sub(process.arrival());
        self.completed_processes += 1;
        let totals = &mut self.completed;
        totals.time_in_system += time_in_system;
        totals.waiting_for_memory += times.waiting_for_memory;
        totals.waiting_for_cpu += times.waiting_for_cpu;
        totals.in_cpu += times.in_cpu;
        totals.waiting_for_io += times.waiting_for_io;
        totals.in_io += times.in_io;
        totals.times_in_ready_queue += times.times_in_ready_queue;
        totals.times_in_io_queue += times.times_in_io_queue;
        if let Some(records) = &mut self.records {
            records.push(ProcessRecord {
                id: process.id(),
                memory: process.memory(),
                cpu_time: millis(process.demand().cpu_time),
                arrival: millis(process.arrival()),
                end: millis(now),
                waiting_for_memory: millis(times.waiting_for_memory),
                waiting_for_cpu: millis(times.waiting_for_cpu),
                in_cpu: millis(times.in_cpu),
                waiting_for_io: millis(times.waiting_for_io),
                in_io: millis(times.in_io),
                times_in_ready_queue: times.times_in_ready_queue,
                times_in_io_queue: times.times_in_io_queue,
            });
        }
    }

    /// Computes the final report for a simulation of the given length.
    #[must_use]
    pub fn report(&self, simulation_length: Duration) -> Report {
        let total = self.total_time.as_secs_f64();
        let completed = self.completed_processes as f64;
        let per_process = |d: Duration| ratio(d.as_secs_f64() * 1000.0, completed);
        let averages = if self.completed_processes > 0 {
            Some(ProcessAverages {
                times_in_memory_queue: 1.0,
                times_in_ready_queue: ratio(self.completed.times_in_ready_queue as f64, completed),
                times_in_io_queue: ratio(self.completed.times_in_io_queue as f64, completed),
                time_in_system: per_process(self.completed.time_in_system),
                waiting_for_memory: per_process(self.completed.waiting_for_memory),
                waiting_for_cpu: per_process(self.completed.waiting_for_cpu),
                in_cpu: per_process(self.completed.in_cpu),
                waiting_for_io: per_process(self.completed.waiting_for_io),
                in_io: per_process(self.completed.in_io),
            })
        } else {
            None
        };
        Report {
            completed_processes: self.completed_processes,
            created_processes: self.created_processes,
            process_switches: self.process_switches,
            processed_io_operations: self.processed_io_operations,
            throughput: ratio(completed, total),
            cpu_active_time: millis(self.cpu_active_time),
            cpu_active_fraction: ratio(self.cpu_active_time.as_secs_f64(), total),
            cpu_idle_time: millis(self.cpu_idle_time),
            cpu_idle_fraction: ratio(self.cpu_idle_time.as_secs_f64(), total),
            largest_memory_queue: self.memory_queue.largest_length,
            average_memory_queue: self.memory_queue.average_length(simulation_length),
            largest_ready_queue: self.ready_queue.largest_length,
            average_ready_queue: self.ready_queue.average_length(simulation_length),
            largest_io_queue: self.io_queue.largest_length,
            average_io_queue: self.io_queue.average_length(simulation_length),
            averages,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Per-process averages over completed processes. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessAverages {
    /// Average number of placements in the memory queue; always one.
    pub times_in_memory_queue: f64,
    /// Average number of placements in the ready queue.
    pub times_in_ready_queue: f64,
    /// Average number of placements in the I/O queue.
    pub times_in_io_queue: f64,
    /// Average time in the system.
    pub time_in_system: f64,
    /// Average time waiting for memory.
    pub waiting_for_memory: f64,
    /// Average time waiting for the CPU.
    pub waiting_for_cpu: f64,
    /// Average time running.
    pub in_cpu: f64,
    /// Average time waiting for I/O.
    pub waiting_for_io: f64,
    /// Average time in I/O.
    pub in_io: f64,
}

/// Summary of a finished simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Number of processes that exited the system.
    pub completed_processes: u64,
    /// Number of processes that entered the system.
    pub created_processes: u64,
    /// Number of forced process switches.
    pub process_switches: u64,
    /// Number of completed I/O operations.
    pub processed_io_operations: u64,
    /// Completed processes per second.
    pub throughput: f64,
    /// Time the CPU was busy, in milliseconds.
    pub cpu_active_time: u64,
    /// Fraction of time the CPU was busy.
    pub cpu_active_fraction: f64,
    /// Time the CPU was idle, in milliseconds.
    pub cpu_idle_time: u64,
    /// Fraction of time the CPU was idle.
    pub cpu_idle_fraction: f64,
    /// Largest memory queue length.
    pub largest_memory_queue: usize,
    /// Average memory queue length.
    pub average_memory_queue: f64,
    /// Largest ready queue length.
    pub largest_ready_queue: usize,
    /// Average ready queue length.
    pub average_ready_queue: f64,
    /// Largest I/O queue length.
    pub largest_io_queue: usize,
    /// Average I/O queue length.
    pub average_io_queue: f64,
    /// Per-process averages; `None` if no process has completed.
    pub averages: Option<ProcessAverages>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation statistics:")?;
        writeln!(f)?;
        row(
            f,
            "Number of completed processes:",
            self.completed_processes,
        )?;
        row(f, "Number of created processes:", self.created_processes)?;
        row(
            f,
            "Number of (forced) process switches:",
            self.process_switches,
        )?;
        row(
            f,
            "Number of processed I/O operations:",
            self.processed_io_operations,
        )?;
        row(
            f,
            "Average throughput (processes per second):",
            format!("{:.3}", self.throughput),
        )?;
        writeln!(f)?;
        row(
            f,
            "Total CPU time spent processing:",
            format!("{} ms", self.cpu_active_time),
        )?;
        row(
            f,
            "Fraction of CPU time spent processing:",
            percent(self.cpu_active_fraction),
        )?;
        row(
            f,
            "Total CPU time spent waiting:",
            format!("{} ms", self.cpu_idle_time),
        )?;
        row(
            f,
            "Fraction of CPU time spent waiting:",
            percent(self.cpu_idle_fraction),
        )?;
        writeln!(f)?;
        row(
            f,
            "Largest occurring memory queue length:",
            self.largest_memory_queue,
        )?;
        row(
            f,
            "Average memory queue length:",
            format!("{:.3}", self.average_memory_queue),
        )?;
        row(
            f,
            "Largest occurring CPU queue length:",
            self.largest_ready_queue,
        )?;
        row(
            f,
            "Average CPU queue length:",
            format!("{:.3}", self.average_ready_queue),
        )?;
        row(
            f,
            "Largest occurring I/O queue length:",
            self.largest_io_queue,
        )?;
        row(
            f,
            "Average I/O queue length:",
            format!("{:.3}", self.average_io_queue),
        )?;
        if let Some(avg) = &self.averages {
            row(
                f,
                "Average # of times a process has been placed in memory queue:",
                format!("{:.3}", avg.times_in_memory_queue),
            )?;
            row(
                f,
                "Average # of times a process has been placed in CPU queue:",
                format!("{:.3}", avg.times_in_ready_queue),
            )?;
            row(
                f,
                "Average # of times a process has been placed in I/O queue:",
                format!("{:.3}", avg.times_in_io_queue),
            )?;
            writeln!(f)?;
            row(
                f,
                "Average time spent in system per process:",
                format!("{:.1} ms", avg.time_in_system),
            )?;
            row(
                f,
                "Average time spent waiting for memory per process:",
                format!("{:.1} ms", avg.waiting_for_memory),
            )?;
            row(
                f,
                "Average time spent waiting for CPU per process:",
                format!("{:.1} ms", avg.waiting_for_cpu),
            )?;
            row(
                f,
                "Average time spent processing per process:",
                format!("{:.1} ms", avg.in_cpu),
            )?;
            row(
                f,
                "Average time spent waiting for I/O per process:",
                format!("{:.1} ms", avg.waiting_for_io),
            )?;
            row(
                f,
                "Average time spent in I/O per process:",
                format!("{:.1} ms", avg.in_io),
            )?;
        }
        Ok(())
    }
}

fn row(f: &mut fmt::Formatter<'_>, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(f, "{:<64}{}", label, value)
}

fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}
