use std::io::Read;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// The smallest accepted memory size in kilobytes.
pub const MIN_MEMORY_SIZE: u64 = 400;

/// The largest accepted average I/O time and average arrival interval in milliseconds.
pub const MAX_AVERAGE_TIME: u64 = u64::MAX / 4;

/// CPU scheduling policy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::ToString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchedulingMode {
    /// Plain round robin with a fixed time quantum.
    RoundRobin,
    /// Alternates between a round-robin phase and a shortest-remaining-time-first phase.
    PriorityRoundRobin,
}

impl Default for SchedulingMode {
    fn default() -> Self {
        Self::RoundRobin
    }
}

/// Simulation parameters. All times are in milliseconds, memory is in kilobytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total memory available for processes.
    pub memory_size: u64,
    /// Time quantum of the CPU.
    pub max_cpu_time: u64,
    /// Average duration of an I/O operation.
    pub avg_io_time: u64,
    /// Simulated time horizon.
    pub simulation_length: u64,
    /// Average time between two process arrivals.
    pub avg_arrival_interval: u64,
    /// CPU scheduling policy.
    pub mode: SchedulingMode,
    /// Random seed; drawn at random if missing.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            memory_size: 2048,
            max_cpu_time: 500,
            avg_io_time: 225,
            simulation_length: 250_000,
            avg_arrival_interval: 5000,
            mode: SchedulingMode::default(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Reads a configuration from JSON. Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Fails if the input is not a valid configuration.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Adjusts values the simulation cannot work with, logging a warning for each.
    #[must_use]
    pub fn clamp(mut self) -> Self {
        if self.memory_size < MIN_MEMORY_SIZE {
            log::warn!(
                "Memory size {} KB is too small; using {} KB",
                self.memory_size,
                MIN_MEMORY_SIZE
            );
            self.memory_size = MIN_MEMORY_SIZE;
        }
        if self.max_cpu_time == 0 {
            log::warn!("Time quantum must be positive; using 1 ms");
            self.max_cpu_time = 1;
        }
        if self.simulation_length == 0 {
            log::warn!("Simulation length must be positive; using 1 ms");
            self.simulation_length = 1;
        }
        if self.avg_io_time > MAX_AVERAGE_TIME {
            log::warn!(
                "Average I/O time {} ms is too large; using {} ms",
                self.avg_io_time,
                MAX_AVERAGE_TIME
            );
            self.avg_io_time = MAX_AVERAGE_TIME;
        }
        if self.avg_arrival_interval > MAX_AVERAGE_TIME {
            log::warn!(
                "Average arrival interval {} ms is too large; using {} ms",
                self.avg_arrival_interval,
                MAX_AVERAGE_TIME
            );
            self.avg_arrival_interval = MAX_AVERAGE_TIME;
        }
        self
    }

    /// The CPU time quantum.
    #[must_use]
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.max_cpu_time)
    }

    /// The simulated time horizon.
    #[must_use]
    pub fn horizon(&self) -> Duration {
        Duration::from_millis(self.simulation_length)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mode_names() {
        assert_eq!(
            SchedulingMode::from_str("priority_round_robin").unwrap(),
            SchedulingMode::PriorityRoundRobin
        );
        assert_eq!(SchedulingMode::RoundRobin.to_string(), "round_robin");
        assert!(SchedulingMode::from_str("fifo").is_err());
    }

    #[test]
    fn test_from_json() -> Result<()> {
        let json = r#"{"memory_size": 1000, "mode": "priority_round_robin", "seed": 7}"#;
        let config = SimulationConfig::from_json(json.as_bytes())?;
        assert_eq!(
            config,
            SimulationConfig {
                memory_size: 1000,
                mode: SchedulingMode::PriorityRoundRobin,
                seed: Some(7),
                ..SimulationConfig::default()
            }
        );
        assert!(SimulationConfig::from_json(r#"{"mode": "lottery"}"#.as_bytes()).is_err());
        Ok(())
    }

    #[test]
    fn test_clamp() {
        let config = SimulationConfig {
            memory_size: 100,
            max_cpu_time: 0,
            simulation_length: 0,
            ..SimulationConfig::default()
        }
        .clamp();
        assert_eq!(config.memory_size, MIN_MEMORY_SIZE);
        assert_eq!(config.quantum(), Duration::from_millis(1));
        assert_eq!(config.horizon(), Duration::from_millis(1));
        let config = SimulationConfig {
            avg_io_time: u64::MAX,
            avg_arrival_interval: u64::MAX / 2 + 1,
            ..SimulationConfig::default()
        }
        .clamp();
        assert_eq!(config.avg_io_time, MAX_AVERAGE_TIME);
        assert_eq!(config.avg_arrival_interval, MAX_AVERAGE_TIME);
        let config = SimulationConfig::default();
        assert_eq!(config.clone().clamp(), config);
    }
}
