use std::collections::HashSet;
use std::convert::TryFrom;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use sim20::{ClockRef, Scheduler};

use crate::{
    Burst, Cpu, Error, Io, Memory, NoopObserver, Observer, Phase, Process, ProcessId,
    ProcessState, RandomWorkload, Report, Result, SimulationConfig, Statistics, TimeDistribution,
    Workload,
};

/// Kind of a simulation event. Events concerning a process carry its ID, so that an event
/// referring to a process that has since moved elsewhere can be recognized and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new process arrives.
    NewProcess,
    /// The time quantum of the running process expired.
    SwitchProcess(ProcessId),
    /// The running process needs no more CPU time.
    EndProcess(ProcessId),
    /// The running process requests I/O.
    IoRequest(ProcessId),
    /// The I/O operation of the process finished.
    EndIo(ProcessId),
}

/// A single entry of the recorded history of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEntry {
    /// An event was dispatched.
    Event {
        /// When the event happened.
        time: Duration,
        /// When the event was scheduled.
        created: Duration,
        /// What happened.
        kind: EventKind,
    },
    /// A process started running on the CPU.
    CpuActivated {
        /// Activation time.
        time: Duration,
        /// The activated process.
        process: ProcessId,
        /// Priority round-robin phase the process was selected in.
        phase: Option<Phase>,
        /// What happens to the process next.
        burst: Burst,
    },
    /// A process started its I/O operation.
    IoActivated {
        /// Start of the operation.
        time: Duration,
        /// The served process.
        process: ProcessId,
        /// End of the operation.
        until: Duration,
    },
}

/// The simulation context: the event scheduler, the three resources, and the statistics.
///
/// Events are processed in time order. Before an event is handled, every resource is told how
/// much time has passed since the previous one, so that time-weighted statistics reflect the
/// state the system was in during that time. The run ends when the next event would happen at
/// or after the simulation horizon, or when no events are left; the remaining time up to the
/// horizon is accounted for at that point.
pub struct Simulation {
    config: SimulationConfig,
    seed: u64,
    scheduler: Scheduler<EventKind>,
    memory: Memory,
    cpu: Cpu,
    io: Io,
    statistics: Statistics,
    workload: Box<dyn Workload>,
    observer: Box<dyn Observer>,
    rng: ChaChaRng,
    next_process_id: usize,
    history: Option<Vec<HistoryEntry>>,
    last_time: Duration,
    horizon: Duration,
    started: bool,
    finished: bool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("seed", &self.seed)
            .field("time", &self.last_time)
            .field("memory", &self.memory)
            .field("cpu", &self.cpu)
            .field("io", &self.io)
            .finish()
    }
}

impl Simulation {
    /// Creates a simulation of random processes as described by `config`.
    ///
    /// Invalid configuration values are clamped. If no seed is given, one is drawn at random
    /// and logged.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        let config = config.clamp();
        let seed = config.seed.unwrap_or_else(rand::random);
        log::info!("Random seed: {}", seed);
        Self {
            seed,
            scheduler: Scheduler::default(),
            memory: Memory::new(config.memory_size),
            cpu: Cpu::new(config.quantum(), config.mode),
            io: Io::new(Duration::from_millis(config.avg_io_time)),
            statistics: Statistics::default(),
            workload: Box::new(RandomWorkload::new(
                config.memory_size,
                Duration::from_millis(config.avg_arrival_interval),
            )),
            observer: Box::new(NoopObserver),
            rng: ChaChaRng::seed_from_u64(seed),
            next_process_id: 0,
            history: None,
            last_time: Duration::default(),
            horizon: config.horizon(),
            started: false,
            finished: false,
            config,
        }
    }

    /// Replaces the default random workload.
    #[must_use]
    pub fn with_workload<W: Workload + 'static>(mut self, workload: W) -> Self {
        self.workload = Box::new(workload);
        self
    }

    /// Registers an observer notified about changes of the active processes and the passage of
    /// time.
    #[must_use]
    pub fn with_observer<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Replaces the distribution of I/O service times (in milliseconds).
    #[must_use]
    pub fn with_io_service<D: TimeDistribution + 'static>(mut self, service: D) -> Self {
        self.io = Io::with_service(service);
        self
    }

    /// Records every dispatched event and every activation; see [`Simulation::history`].
    #[must_use]
    pub fn record_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    /// Keeps a record of every completed process; see [`Statistics::records`].
    #[must_use]
    pub fn record_processes(mut self) -> Self {
        self.statistics = std::mem::take(&mut self.statistics).with_records();
        self
    }

    /// Runs the simulation until the horizon is reached or no events are left.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler reaches an inconsistent state.
    pub fn run(&mut self) -> Result<&Statistics> {
        while self.step()? {}
        Ok(&self.statistics)
    }

    /// Processes a single event. Returns `false` once the simulation has finished.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler reaches an inconsistent state.
    pub fn step(&mut self) -> Result<bool> {
        if !self.started {
            self.start()?;
        }
        if self.finished {
            return Ok(false);
        }
        let entry = match self.scheduler.peek_time() {
            Some(time) if time < self.horizon => self.scheduler.pop(),
            _ => None,
        };
        let entry = match entry {
            Some(entry) => entry,
            None => {
                self.finish();
                return Ok(false);
            }
        };
        let now = entry.time();
        self.advance(now);
        log::trace!("[{:?}] {:?}", now, entry.event());
        if let Some(history) = &mut self.history {
            history.push(HistoryEntry::Event {
                time: now,
                created: entry.created(),
                kind: *entry.event(),
            });
        }
        self.dispatch(entry.into_event(), now)?;
        if cfg!(debug_assertions) {
            self.check_invariants()?;
        }
        Ok(true)
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        log::info!(
            "Starting {} simulation of {:?}",
            self.config.mode.to_string(),
            self.horizon
        );
        if let Some(first) = self.workload.first_arrival() {
            self.scheduler.schedule_at(first, EventKind::NewProcess)?;
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.last_time < self.horizon {
            self.advance(self.horizon);
        }
        self.finished = true;
        log::info!(
            "Simulation finished: {} of {} processes completed",
            self.statistics.completed_processes,
            self.statistics.created_processes
        );
    }

    fn advance(&mut self, to: Duration) {
        let elapsed = std::cmp::min(to, self.horizon).saturating_sub(self.last_time);
        self.memory.time_passed(elapsed, &mut self.statistics);
        self.cpu.time_passed(elapsed, &mut self.statistics);
        self.io.time_passed(elapsed, &mut self.statistics);
        self.observer.time_passed(elapsed);
        self.last_time += elapsed;
    }

    fn dispatch(&mut self, event: EventKind, now: Duration) -> Result<()> {
        match event {
            EventKind::NewProcess => self.create_process(now),
            EventKind::SwitchProcess(id) => self.switch_process(id, now),
            EventKind::EndProcess(id) => self.end_process(id, now),
            EventKind::IoRequest(id) => self.io_request(id, now),
            EventKind::EndIo(id) => self.end_io(id, now),
        }
    }

    fn create_process(&mut self, now: Duration) -> Result<()> {
        let demand = match self.workload.demand(&mut self.rng) {
            Some(demand) => demand,
            None => {
                log::warn!("[{:?}] Arrival without a process; ignoring", now);
                return Ok(());
            }
        };
        let id = ProcessId::from(self.next_process_id);
        self.next_process_id += 1;
        let process = Process::new(id, demand, now, &mut self.rng);
        log::debug!(
            "[{:?}] Process {} arrives, needs {} KB and {:?} CPU time",
            now,
            id,
            demand.memory,
            demand.cpu_time
        );
        self.memory.insert(process)?;
        self.statistics.created_processes += 1;
        self.admit(now)?;
        if self.cpu.is_idle() {
            self.activate_cpu(now)?;
        }
        if let Some(next) = self.workload.next_arrival(now, &mut self.rng) {
            self.scheduler.schedule_at(next, EventKind::NewProcess)?;
        }
        Ok(())
    }

    fn switch_process(&mut self, id: ProcessId, now: Duration) -> Result<()> {
        if !self.cpu.is_running(id) {
            log::warn!("[{:?}] Ignoring stale switch of process {}", now, id);
            return Ok(());
        }
        self.cpu.preempt(now)?;
        self.statistics.process_switches += 1;
        self.activate_cpu(now)
    }

    fn end_process(&mut self, id: ProcessId, now: Duration) -> Result<()> {
        if !self.cpu.is_running(id) {
            log::warn!("[{:?}] Ignoring stale end of process {}", now, id);
            return Ok(());
        }
        let mut process = self.cpu.take_active()?;
        process.terminate(now)?;
        self.memory.release(&process)?;
        self.statistics.finish(&process, now);
        log::debug!("[{:?}] Process {} finished", now, id);
        self.admit(now)?;
        self.activate_cpu(now)
    }

    fn io_request(&mut self, id: ProcessId, now: Duration) -> Result<()> {
        if !self.cpu.is_running(id) {
            log::warn!("[{:?}] Ignoring stale I/O request of process {}", now, id);
            return Ok(());
        }
        let process = self.cpu.take_active()?;
        self.io.insert(process, now)?;
        self.activate_cpu(now)?;
        if self.io.is_idle() {
            self.activate_io(now)?;
        }
        Ok(())
    }

    fn end_io(&mut self, id: ProcessId, now: Duration) -> Result<()> {
        if !self.io.is_serving(id) {
            log::warn!("[{:?}] Ignoring stale I/O completion of process {}", now, id);
            return Ok(());
        }
        let process = self.io.take_active(&mut self.rng)?;
        self.statistics.processed_io_operations += 1;
        self.cpu.insert(process, now)?;
        if self.cpu.is_idle() {
            self.activate_cpu(now)?;
        }
        self.activate_io(now)
    }

    /// Moves every process that fits in memory to the ready queue.
    fn admit(&mut self, now: Duration) -> Result<()> {
        while let Some(process) = self.memory.check_admission(now) {
            self.cpu.insert(process, now)?;
        }
        Ok(())
    }

    /// Activates the next ready process and schedules exactly one event for it: its end, its
    /// I/O request, or the expiry of its quantum.
    fn activate_cpu(&mut self, now: Duration) -> Result<()> {
        if let Some(activation) = self.cpu.activate(now)? {
            let (delay, event) = match activation.burst {
                Burst::Complete(delay) => (delay, EventKind::EndProcess(activation.process)),
                Burst::Io(delay) => (delay, EventKind::IoRequest(activation.process)),
                Burst::Preempt(delay) => (delay, EventKind::SwitchProcess(activation.process)),
            };
            log::debug!(
                "[{:?}] Process {} runs ({:?} phase), next: {:?}",
                now,
                activation.process,
                activation.phase,
                activation.burst
            );
            self.scheduler.schedule(delay, event);
            if let Some(history) = &mut self.history {
                history.push(HistoryEntry::CpuActivated {
                    time: now,
                    process: activation.process,
                    phase: activation.phase,
                    burst: activation.burst,
                });
            }
        }
        self.observer.cpu_active_changed(self.cpu.active());
        Ok(())
    }

    fn activate_io(&mut self, now: Duration) -> Result<()> {
        if let Some(until) = self.io.activate(now, &mut self.rng)? {
            let process = self
                .io
                .active()
                .map(Process::id)
                .ok_or_else(|| Error::Invariant(String::from("activated I/O device is idle")))?;
            self.scheduler.schedule_at(until, EventKind::EndIo(process))?;
            if let Some(history) = &mut self.history {
                history.push(HistoryEntry::IoActivated {
                    time: now,
                    process,
                    until,
                });
            }
        }
        self.observer.io_active_changed(self.io.active());
        Ok(())
    }

    /// Verifies that every live process is in exactly one place, in the state matching that
    /// place, and that memory is conserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] describing the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        use ProcessState::{AwaitingIo, AwaitingMemory, InIo, Ready, Running};
        let located = self
            .memory
            .queue()
            .map(|p| (p, AwaitingMemory))
            .chain(self.cpu.ready().map(|p| (p, Ready)))
            .chain(self.cpu.active().map(|p| (p, Running)))
            .chain(self.io.queue().map(|p| (p, AwaitingIo)))
            .chain(self.io.active().map(|p| (p, InIo)));
        let mut seen = HashSet::new();
        let mut admitted_memory = 0;
        for (process, expected) in located {
            if !seen.insert(process.id()) {
                return Err(Error::Invariant(format!(
                    "process {} is in more than one place",
                    process.id()
                )));
            }
            if process.state() != expected {
                return Err(Error::Invariant(format!(
                    "process {} is in state {:?} where {:?} is expected",
                    process.id(),
                    process.state(),
                    expected
                )));
            }
            if expected != AwaitingMemory {
                admitted_memory += process.memory();
            }
        }
        let alive = self.statistics.created_processes - self.statistics.completed_processes;
        if usize::try_from(alive).ok() != Some(seen.len()) {
            return Err(Error::Invariant(format!(
                "{} live processes, but {} found in the system",
                alive,
                seen.len()
            )));
        }
        if self.memory.free() + admitted_memory != self.memory.capacity() {
            return Err(Error::Invariant(format!(
                "{} KB free and {} KB admitted do not add up to {} KB",
                self.memory.free(),
                admitted_memory,
                self.memory.capacity()
            )));
        }
        if self.cpu.is_idle() && self.cpu.ready_len() > 0 {
            return Err(Error::Invariant(String::from(
                "the CPU is idle while processes are ready",
            )));
        }
        if self.io.is_idle() && self.io.queue_len() > 0 {
            return Err(Error::Invariant(String::from(
                "the I/O device is idle while processes are waiting",
            )));
        }
        Ok(())
    }

    /// The (clamped) configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The seed of the random number generator.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Simulated time accounted for so far.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.last_time
    }

    /// Read-only handle on the scheduler clock, i.e., the time of the last popped event.
    #[must_use]
    pub fn clock(&self) -> ClockRef {
        self.scheduler.clock()
    }

    /// Memory admission controller.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The CPU.
    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// The I/O device.
    #[must_use]
    pub fn io(&self) -> &Io {
        &self.io
    }

    /// Statistics collected so far.
    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Recorded history; empty unless enabled with [`Simulation::record_history`].
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        self.history.as_deref().unwrap_or(&[])
    }

    /// Final report over the whole simulation length.
    #[must_use]
    pub fn report(&self) -> Report {
        self.statistics.report(self.horizon)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Arrival, IoSpec, SchedulingMode, TraceWorkload, MAX_AVERAGE_TIME};
    use testing::ConstantDistribution;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn config(mode: SchedulingMode) -> SimulationConfig {
        SimulationConfig {
            memory_size: 1000,
            max_cpu_time: 50,
            avg_io_time: 10,
            simulation_length: 1000,
            avg_arrival_interval: 100,
            mode,
            seed: Some(1),
        }
    }

    fn arrival(at: u64, cpu_time: u64, io: IoSpec) -> Arrival {
        Arrival {
            at,
            memory: 100,
            cpu_time,
            io,
        }
    }

    fn events(sim: &Simulation) -> Vec<(u64, EventKind)> {
        sim.history()
            .iter()
            .filter_map(|entry| match entry {
                HistoryEntry::Event { time, kind, .. } => Some((crate::millis(*time), *kind)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_process() -> Result<()> {
        let trace = TraceWorkload::new(vec![arrival(0, 30, IoSpec::None)])?;
        let mut sim = Simulation::new(config(SchedulingMode::RoundRobin))
            .with_workload(trace)
            .record_history();
        let statistics = sim.run()?;
        assert_eq!(statistics.completed_processes, 1);
        assert_eq!(statistics.cpu_active_time, ms(30));
        assert_eq!(statistics.cpu_idle_time, ms(970));
        assert_eq!(statistics.total_time, ms(1000));
        let id = ProcessId::from(0);
        assert_eq!(
            events(&sim),
            vec![(0, EventKind::NewProcess), (30, EventKind::EndProcess(id))]
        );
        assert_eq!(sim.time(), ms(1000));
        assert!(!sim.step()?);
        Ok(())
    }

    #[test]
    fn test_io_cycle() -> Result<()> {
        let trace = TraceWorkload::new(vec![arrival(0, 100, IoSpec::Fixed(40))])?;
        let mut sim = Simulation::new(SimulationConfig {
            max_cpu_time: 500,
            ..config(SchedulingMode::RoundRobin)
        })
        .with_workload(trace)
        .with_io_service(ConstantDistribution::new(10_u64))
        .record_history()
        .record_processes();
        sim.run()?;
        let id = ProcessId::from(0);
        assert_eq!(
            events(&sim),
            vec![
                (0, EventKind::NewProcess),
                (40, EventKind::IoRequest(id)),
                (50, EventKind::EndIo(id)),
                (90, EventKind::IoRequest(id)),
                (100, EventKind::EndIo(id)),
                (120, EventKind::EndProcess(id)),
            ]
        );
        let statistics = sim.statistics();
        assert_eq!(statistics.processed_io_operations, 2);
        assert_eq!(statistics.process_switches, 0);
        let record = &statistics.records()[0];
        assert_eq!(record.in_io, 20);
        assert_eq!(record.in_cpu, 100);
        assert_eq!(record.times_in_io_queue, 2);
        assert_eq!(record.times_in_ready_queue, 3);
        Ok(())
    }

    #[test]
    fn test_stale_events_are_ignored() -> Result<()> {
        let mut sim = Simulation::new(config(SchedulingMode::RoundRobin));
        let ghost = ProcessId::from(42);
        for event in &[
            EventKind::SwitchProcess(ghost),
            EventKind::EndProcess(ghost),
            EventKind::IoRequest(ghost),
            EventKind::EndIo(ghost),
        ] {
            sim.dispatch(*event, ms(0))?;
        }
        sim.check_invariants()?;
        assert_eq!(sim.statistics().process_switches, 0);
        assert_eq!(sim.statistics().processed_io_operations, 0);
        Ok(())
    }

    #[test]
    fn test_horizon_bounds_time() -> Result<()> {
        let mut sim = Simulation::new(SimulationConfig {
            simulation_length: 20_000,
            ..config(SchedulingMode::PriorityRoundRobin)
        });
        let statistics = sim.run()?;
        assert_eq!(statistics.total_time, ms(20_000));
        assert_eq!(
            statistics.cpu_active_time + statistics.cpu_idle_time,
            ms(20_000)
        );
        assert!(statistics.created_processes > 0);
        assert!(sim.clock().time() < ms(20_000));
        Ok(())
    }

    #[test]
    fn test_extreme_averages_are_clamped() -> Result<()> {
        let mut sim = Simulation::new(SimulationConfig {
            avg_io_time: u64::MAX,
            avg_arrival_interval: u64::MAX,
            ..config(SchedulingMode::RoundRobin)
        });
        assert_eq!(sim.config().avg_io_time, MAX_AVERAGE_TIME);
        assert_eq!(sim.config().avg_arrival_interval, MAX_AVERAGE_TIME);
        let horizon = sim.config().horizon();
        let statistics = sim.run()?;
        assert_eq!(statistics.created_processes, 1);
        assert_eq!(statistics.total_time, horizon);
        Ok(())
    }

    #[test]
    fn test_seed_is_kept() {
        assert_eq!(Simulation::new(config(SchedulingMode::RoundRobin)).seed(), 1);
        let sim = Simulation::new(SimulationConfig {
            seed: None,
            ..config(SchedulingMode::RoundRobin)
        });
        assert_eq!(sim.config().seed, None);
    }
}
