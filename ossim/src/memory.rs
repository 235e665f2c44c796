use std::time::Duration;

use sim20::Queue;

use crate::{Error, Process, Result, Statistics};

/// Memory admission controller.
///
/// Memory is modeled as a single free-space counter. Processes are admitted strictly in
/// arrival order: a process at the head of the queue that does not fit blocks everyone behind
/// it, even those that would fit.
#[derive(Debug)]
pub struct Memory {
    capacity: u64,
    free: u64,
    queue: Queue<Process>,
}

impl Memory {
    /// Creates empty memory of the given capacity in kilobytes.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            free: capacity,
            queue: Queue::default(),
        }
    }

    /// Places a newly arrived process at the back of the memory queue.
    ///
    /// # Errors
    ///
    /// Fails if the process is not waiting for memory.
    pub fn insert(&mut self, process: Process) -> Result<()> {
        if process.state() != crate::ProcessState::AwaitingMemory {
            return Err(Error::Invariant(format!(
                "process {} entered the memory queue in state {:?}",
                process.id(),
                process.state()
            )));
        }
        self.queue
            .push_back(process)
            .map_err(|_| Error::Invariant(String::from("memory queue is bounded")))
    }

    /// Admits the process at the head of the queue if there is enough free memory for it.
    ///
    /// Call repeatedly until it returns `None` to admit as many processes as fit.
    pub fn check_admission(&mut self, now: Duration) -> Option<Process> {
        let needed = self.queue.front()?.memory();
        if needed > self.free {
            return None;
        }
        self.free -= needed;
        let process = self.queue.pop_front()?;
        log::debug!(
            "[{:?}] Process {} admitted with {} KB; {} KB left",
            now,
            process.id(),
            needed,
            self.free
        );
        Some(process)
    }

    /// Returns the memory of a terminated process.
    ///
    /// # Errors
    ///
    /// Fails if more memory would be free than the capacity.
    pub fn release(&mut self, process: &Process) -> Result<()> {
        let free = self.free + process.memory();
        if free > self.capacity {
            return Err(Error::Invariant(format!(
                "releasing {} KB of process {} overflows memory capacity",
                process.memory(),
                process.id()
            )));
        }
        self.free = free;
        Ok(())
    }

    /// Total memory in kilobytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Free memory in kilobytes.
    #[must_use]
    pub fn free(&self) -> u64 {
        self.free
    }

    /// Number of processes waiting for memory.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Iterates over the waiting processes in arrival order.
    pub fn queue(&self) -> impl Iterator<Item = &Process> {
        self.queue.iter()
    }

    /// Updates the memory queue statistics.
    pub fn time_passed(&self, elapsed: Duration, statistics: &mut Statistics) {
        statistics.memory_queue.observe(self.queue.len(), elapsed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Demand, IoProfile, ProcessId};
    use rand::rngs::mock::StepRng;

    fn process(id: usize, memory: u64) -> Process {
        let demand = Demand {
            memory,
            cpu_time: Duration::from_millis(100),
            io: IoProfile::None,
        };
        Process::new(
            ProcessId::from(id),
            demand,
            Duration::default(),
            &mut StepRng::new(0, 1),
        )
    }

    fn admit_all(memory: &mut Memory) -> Vec<Process> {
        std::iter::from_fn(|| memory.check_admission(Duration::default())).collect()
    }

    #[test]
    fn test_head_of_line_blocking() -> Result<()> {
        let mut memory = Memory::new(1000);
        memory.insert(process(0, 600))?;
        memory.insert(process(1, 500))?;
        memory.insert(process(2, 100))?;

        let admitted = admit_all(&mut memory);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].id(), ProcessId::from(0));
        assert_eq!(memory.free(), 400);
        assert_eq!(memory.queue_len(), 2);

        memory.release(&admitted[0])?;
        let admitted: Vec<_> = admit_all(&mut memory).iter().map(Process::id).collect();
        assert_eq!(admitted, vec![ProcessId::from(1), ProcessId::from(2)]);
        assert_eq!(memory.free(), 400);
        assert_eq!(memory.queue_len(), 0);
        Ok(())
    }

    #[test]
    fn test_never_fits() -> Result<()> {
        let mut memory = Memory::new(400);
        memory.insert(process(0, 500))?;
        assert!(memory.check_admission(Duration::default()).is_none());
        let mut statistics = Statistics::default();
        memory.time_passed(Duration::from_millis(100), &mut statistics);
        assert_eq!(statistics.memory_queue.largest_length, 1);
        assert_eq!(
            statistics.memory_queue.length_time,
            Duration::from_millis(100)
        );
        Ok(())
    }

    #[test]
    fn test_release_overflow() {
        let mut memory = Memory::new(400);
        assert!(memory.release(&process(0, 100)).is_err());
        assert_eq!(memory.free(), 400);
    }
}
