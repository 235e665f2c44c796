use std::time::Duration;

use crate::Process;

/// Receives notifications about the simulation as it runs, e.g., to display progress or to
/// drive a GUI.
///
/// All methods do nothing by default.
pub trait Observer {
    /// The process running on the CPU has changed; `None` means the CPU went idle.
    fn cpu_active_changed(&mut self, _process: Option<&Process>) {}
    /// The process served by the I/O device has changed; `None` means the device went idle.
    fn io_active_changed(&mut self, _process: Option<&Process>) {}
    /// Simulated time has advanced by `elapsed`.
    fn time_passed(&mut self, _elapsed: Duration) {}
}

/// Ignores all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
