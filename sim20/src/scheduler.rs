use std::cell::Cell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;

use crate::Clock;

/// Error returned when an event cannot be scheduled.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// The requested time precedes the current simulation time.
    #[error("cannot schedule an event at {requested:?}, the clock is already at {now:?}")]
    InThePast {
        /// Requested absolute time of the event.
        requested: Duration,
        /// Simulation time at the moment of the request.
        now: Duration,
    },
}

/// Entry type stored in the scheduler, including the event value, the time when it is supposed
/// to occur, and the time when it was scheduled.
///
/// Entries are ordered such that the greatest entry is the one that should be processed first:
/// the earliest time, and among equal times, the one that was scheduled first.
#[derive(Debug, Clone)]
pub struct EventEntry<E> {
    time: Reverse<Duration>,
    sequence: Reverse<u64>,
    created: Duration,
    inner: E,
}

impl<E> EventEntry<E> {
    /// The time at which the event occurs.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time.0
    }

    /// The simulation time at which the event was scheduled.
    #[must_use]
    pub fn created(&self) -> Duration {
        self.created
    }

    /// The event value.
    #[must_use]
    pub fn event(&self) -> &E {
        &self.inner
    }

    /// Consumes the entry, returning the event value.
    #[must_use]
    pub fn into_event(self) -> E {
        self.inner
    }
}

impl<E> PartialEq for EventEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl<E> Eq for EventEntry<E> {}

impl<E> PartialOrd for EventEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for EventEntry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.sequence).cmp(&(other.time, other.sequence))
    }
}

/// Trait implemented by objects maintaining the current simulation time.
pub trait Time {
    /// Return the current simulation time.
    fn time(&self) -> Duration;
}

/// This struct has only immutable access to the simulation clock exposed.
#[derive(Debug, Clone)]
pub struct ClockRef {
    clock: Clock,
}

impl From<Clock> for ClockRef {
    fn from(clock: Clock) -> Self {
        Self { clock }
    }
}

impl ClockRef {
    /// Return the current simulation time.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.clock.get()
    }
}

impl Time for ClockRef {
    fn time(&self) -> Duration {
        self.clock.get()
    }
}

/// Scheduler is used to keep the current time and information about the upcoming events.
///
/// Events are delivered in nondecreasing order of their time. Events scheduled for the same
/// time are delivered in the order they were scheduled. Once scheduled, an event cannot be
/// cancelled.
#[derive(Debug)]
pub struct Scheduler<E> {
    events: BinaryHeap<EventEntry<E>>,
    clock: Clock,
    next_sequence: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            events: BinaryHeap::new(),
            clock: Rc::new(Cell::new(Duration::default())),
            next_sequence: 0,
        }
    }
}

impl<E> Scheduler<E> {
    /// Schedules `event` to be executed at `self.time() + delay`.
    pub fn schedule(&mut self, delay: Duration, event: E) {
        let time = self.time() + delay;
        self.push(time, event);
    }

    /// Schedules `event` to be executed at `self.time()`, after all events already scheduled
    /// for this time.
    pub fn schedule_immediately(&mut self, event: E) {
        self.schedule(Duration::default(), event);
    }

    /// Schedules `event` to be executed at the absolute simulation time `time`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InThePast`] if `time` is earlier than the current time.
    pub fn schedule_at(&mut self, time: Duration, event: E) -> Result<(), ScheduleError> {
        let now = self.time();
        if time < now {
            return Err(ScheduleError::InThePast {
                requested: time,
                now,
            });
        }
        self.push(time, event);
        Ok(())
    }

    fn push(&mut self, time: Duration, event: E) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(EventEntry {
            time: Reverse(time),
            sequence: Reverse(sequence),
            created: self.time(),
            inner: event,
        });
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.clock.get()
    }

    /// Returns a structure with immutable access to the simulation time.
    #[must_use]
    pub fn clock(&self) -> ClockRef {
        ClockRef {
            clock: Rc::clone(&self.clock),
        }
    }

    /// Returns the time of the next scheduled event, or `None` if none are left.
    #[must_use]
    pub fn peek_time(&self) -> Option<Duration> {
        self.events.peek().map(EventEntry::time)
    }

    /// Checks if there are no more events scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Removes and returns the next scheduled event or `None` if none are left.
    /// The clock is moved forward to the time of the returned event.
    pub fn pop(&mut self) -> Option<EventEntry<E>> {
        self.events.pop().map(|e| {
            self.clock.replace(e.time.0);
            e
        })
    }
}

impl<E> Time for Scheduler<E> {
    fn time(&self) -> Duration {
        self.clock.get()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    enum Event {
        A,
        B,
        C,
    }

    fn entry(time: u64, sequence: u64) -> EventEntry<Event> {
        EventEntry {
            time: Reverse(Duration::from_millis(time)),
            sequence: Reverse(sequence),
            created: Duration::default(),
            inner: Event::A,
        }
    }

    #[test]
    fn test_event_entry_cmp() {
        assert_eq!(entry(1, 0), entry(1, 0));
        assert_eq!(entry(0, 0).cmp(&entry(1, 0)), Ordering::Greater);
        assert_eq!(entry(2, 0).cmp(&entry(1, 0)), Ordering::Less);
        assert_eq!(entry(1, 0).cmp(&entry(1, 1)), Ordering::Greater);
    }

    #[test]
    fn test_scheduler() {
        let mut scheduler = Scheduler::<Event>::default();
        assert_eq!(scheduler.time(), Duration::new(0, 0));
        assert!(scheduler.is_empty());

        scheduler.schedule(Duration::from_secs(1), Event::A);
        scheduler.schedule(Duration::from_secs(0), Event::B);
        scheduler.schedule(Duration::from_secs(2), Event::C);
        assert_eq!(scheduler.len(), 3);
        assert_eq!(scheduler.peek_time(), Some(Duration::from_secs(0)));

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.event(), &Event::B);
        assert_eq!(entry.time(), Duration::from_secs(0));
        assert_eq!(scheduler.time(), Duration::from_secs(0));

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.event(), &Event::A);
        assert_eq!(scheduler.time(), Duration::from_secs(1));

        scheduler.schedule(Duration::from_secs(3), Event::B);

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.into_event(), Event::C);
        assert_eq!(scheduler.time(), Duration::from_secs(2));

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.event(), &Event::B);
        assert_eq!(entry.time(), Duration::from_secs(4));
        assert_eq!(entry.created(), Duration::from_secs(1));

        assert!(scheduler.pop().is_none());
        assert_eq!(scheduler.time(), Duration::from_secs(4));
    }

    #[test]
    fn test_equal_times_are_fifo() {
        let mut scheduler = Scheduler::<usize>::default();
        for event in 0..100 {
            scheduler.schedule(Duration::from_millis(5), event);
        }
        scheduler.schedule_immediately(100);
        assert_eq!(scheduler.pop().map(EventEntry::into_event), Some(100));
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop())
            .map(EventEntry::into_event)
            .collect();
        assert_eq!(order, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_schedule_at() {
        let mut scheduler = Scheduler::<Event>::default();
        scheduler
            .schedule_at(Duration::from_millis(10), Event::A)
            .unwrap();
        assert_eq!(scheduler.pop().unwrap().time(), Duration::from_millis(10));
        assert_eq!(
            scheduler.schedule_at(Duration::from_millis(9), Event::B),
            Err(ScheduleError::InThePast {
                requested: Duration::from_millis(9),
                now: Duration::from_millis(10),
            })
        );
        assert!(scheduler
            .schedule_at(Duration::from_millis(10), Event::B)
            .is_ok());
        assert!(!scheduler.is_empty());
    }

    #[test]
    fn test_clock_ref() {
        let mut scheduler = Scheduler::<Event>::default();
        let clock = scheduler.clock();
        scheduler.schedule(Duration::from_millis(7), Event::C);
        assert_eq!(clock.time(), Duration::default());
        let _ = scheduler.pop();
        assert_eq!(clock.time(), Duration::from_millis(7));
        assert_eq!(Time::time(&clock), Duration::from_millis(7));
    }
}
