use std::fmt;
use std::time::Duration;

use rand::RngCore;
use rand_distr::Uniform;
use sim20::Queue;

use crate::{Error, Process, ProcessId, Result, Statistics, TimeDistribution};

/// The single I/O device, serving one process at a time in FIFO order.
///
/// Every service time is drawn afresh from the service distribution, by default uniform in
/// `[1ms, 2 * average]`.
pub struct Io {
    queue: Queue<Process>,
    active: Option<Process>,
    service: Box<dyn TimeDistribution>,
    next_completion: Option<Duration>,
}

impl fmt::Debug for Io {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Io")
            .field("queue", &self.queue)
            .field("active", &self.active)
            .field("next_completion", &self.next_completion)
            .finish()
    }
}

impl Io {
    /// Creates an idle device with service times averaging `average`.
    #[must_use]
    pub fn new(average: Duration) -> Self {
        let high = std::cmp::max(crate::millis(average).saturating_mul(2), 1);
        Self::with_service(Uniform::new_inclusive(1, high))
    }

    /// Creates an idle device drawing service times (in milliseconds) from `service`.
    #[must_use]
    pub fn with_service<D: TimeDistribution + 'static>(service: D) -> Self {
        Self {
            queue: Queue::default(),
            active: None,
            service: Box::new(service),
            next_completion: None,
        }
    }

    /// Places a process that requested I/O at the back of the I/O queue.
    ///
    /// # Errors
    ///
    /// Fails if the process is not running.
    pub fn insert(&mut self, mut process: Process, now: Duration) -> Result<()> {
        process.enter_io_queue(now)?;
        self.queue
            .push_back(process)
            .map_err(|_| Error::Invariant(String::from("I/O queue is bounded")))
    }

    /// Starts serving the process at the head of the queue and returns the time when the
    /// operation completes, or `None` if the queue is empty.
    ///
    /// # Errors
    ///
    /// Fails if the device is already serving a process.
    pub fn activate(&mut self, now: Duration, rng: &mut dyn RngCore) -> Result<Option<Duration>> {
        if let Some(active) = &self.active {
            return Err(Error::Invariant(format!(
                "tried to start I/O while serving process {}",
                active.id()
            )));
        }
        let mut process = match self.queue.pop_front() {
            Some(process) => process,
            None => return Ok(None),
        };
        process.start_io(now)?;
        let completion = now + self.service.sample_time(rng);
        log::debug!(
            "[{:?}] Process {} starts I/O until {:?}",
            now,
            process.id(),
            completion
        );
        self.active = Some(process);
        self.next_completion = Some(completion);
        Ok(Some(completion))
    }

    /// Removes the served process from the device and draws the CPU time until its next I/O
    /// request.
    ///
    /// # Errors
    ///
    /// Fails if the device is idle.
    pub fn take_active(&mut self, rng: &mut dyn RngCore) -> Result<Process> {
        let mut process = self
            .active
            .take()
            .ok_or_else(|| Error::Invariant(String::from("the I/O device is idle")))?;
        self.next_completion = None;
        process.complete_io(rng);
        Ok(process)
    }

    /// The process being served, if any.
    #[must_use]
    pub fn active(&self) -> Option<&Process> {
        self.active.as_ref()
    }

    /// Checks if the process with the given ID is the one being served.
    #[must_use]
    pub fn is_serving(&self, id: ProcessId) -> bool {
        self.active.as_ref().map_or(false, |p| p.id() == id)
    }

    /// Checks if no process is being served.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Completion time of the current operation.
    #[must_use]
    pub fn next_completion(&self) -> Option<Duration> {
        self.next_completion
    }

    /// Number of processes waiting for the device.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Iterates over the waiting processes from front to back.
    pub fn queue(&self) -> impl Iterator<Item = &Process> {
        self.queue.iter()
    }

    /// Updates the I/O queue statistics.
    pub fn time_passed(&self, elapsed: Duration, statistics: &mut Statistics) {
        statistics.io_queue.observe(self.queue.len(), elapsed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Demand, IoProfile, ProcessState};
    use rand::rngs::mock::StepRng;
    use testing::SequenceDistribution;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn running(id: usize) -> Process {
        let demand = Demand {
            memory: 100,
            cpu_time: ms(100),
            io: IoProfile::Fixed(ms(20)),
        };
        let mut process = Process::new(ProcessId::from(id), demand, ms(0), &mut StepRng::new(0, 1));
        process.enter_ready(ms(0)).unwrap();
        process.run(ms(0)).unwrap();
        process
    }

    #[test]
    fn test_fifo_service() -> Result<()> {
        let mut rng = StepRng::new(0, 1);
        let mut io = Io::with_service(SequenceDistribution::new(vec![5_u64, 7]));
        assert!(io.activate(ms(0), &mut rng)?.is_none());

        io.insert(running(0), ms(20))?;
        io.insert(running(1), ms(20))?;
        assert_eq!(io.queue_len(), 2);
        assert_eq!(io.activate(ms(20), &mut rng)?, Some(ms(25)));
        assert!(io.is_serving(ProcessId::from(0)));
        assert_eq!(io.active().map(Process::state), Some(ProcessState::InIo));
        assert!(io.activate(ms(20), &mut rng).is_err());

        let done = io.take_active(&mut rng)?;
        assert_eq!(done.id(), ProcessId::from(0));
        assert_eq!(done.time_to_next_io(), Some(ms(20)));
        assert!(io.is_idle());
        assert_eq!(io.next_completion(), None);
        assert_eq!(io.activate(ms(25), &mut rng)?, Some(ms(32)));
        assert_eq!(io.next_completion(), Some(ms(32)));
        Ok(())
    }

    #[test]
    fn test_default_service_bounds() -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut io = Io::new(ms(10));
        for now in 0..200 {
            io.insert(running(now), ms(20))?;
            let completion = io.activate(ms(20), &mut rng)?.unwrap();
            assert!(completion >= ms(21) && completion <= ms(40));
            io.take_active(&mut rng)?;
        }
        let mut io = Io::new(Duration::from_millis(u64::MAX));
        io.insert(running(0), ms(20))?;
        assert!(io.activate(ms(20), &mut rng)?.unwrap() >= ms(21));
        Ok(())
    }

    #[test]
    fn test_time_passed() -> Result<()> {
        let mut statistics = Statistics::default();
        let mut io = Io::new(ms(10));
        io.insert(running(0), ms(20))?;
        io.time_passed(ms(4), &mut statistics);
        assert_eq!(statistics.io_queue.length_time, ms(4));
        assert_eq!(statistics.io_queue.largest_length, 1);
        Ok(())
    }
}
