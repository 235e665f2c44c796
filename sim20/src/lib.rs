#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

//! This is a general purpose simulation that provides the mechanisms such as: scheduler, clock,
//! queues, etc.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Simulation clock.
pub type Clock = Rc<Cell<Duration>>;

pub use queue::{Queue, QueueFull};
pub use scheduler::{ClockRef, EventEntry, ScheduleError, Scheduler, Time};

mod queue;
mod scheduler;
