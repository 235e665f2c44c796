use ossim::{ProcessId, SchedulingMode, Simulation, SimulationConfig};
use proptest::prelude::*;

fn simulation(
    seed: u64,
    memory_size: u64,
    quantum: u64,
    io: u64,
    arrivals: u64,
    priority: bool,
) -> Simulation {
    Simulation::new(SimulationConfig {
        memory_size,
        max_cpu_time: quantum,
        avg_io_time: io,
        simulation_length: 20_000,
        avg_arrival_interval: arrivals,
        mode: if priority {
            SchedulingMode::PriorityRoundRobin
        } else {
            SchedulingMode::RoundRobin
        },
        seed: Some(seed),
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_invariants_hold(
        seed in any::<u64>(),
        memory_size in 400..4000_u64,
        quantum in 10..1000_u64,
        io in 0..500_u64,
        arrivals in 50..2000_u64,
        priority in any::<bool>(),
    ) {
        let mut sim = simulation(seed, memory_size, quantum, io, arrivals, priority);
        while sim.step().unwrap() {
            prop_assert!(sim.check_invariants().is_ok());
            let free = sim.memory().free();
            prop_assert!(free <= sim.memory().capacity());
        }
        let statistics = sim.statistics();
        prop_assert!(statistics.completed_processes <= statistics.created_processes);
        prop_assert_eq!(
            statistics.cpu_active_time + statistics.cpu_idle_time,
            statistics.total_time
        );
    }

    #[test]
    fn test_admission_is_first_come_first_served(
        seed in any::<u64>(),
        memory_size in 400..2000_u64,
        arrivals in 50..500_u64,
        priority in any::<bool>(),
    ) {
        let mut sim = simulation(seed, memory_size, 100, 50, arrivals, priority);
        while sim.step().unwrap() {
            let waiting: Vec<ProcessId> = sim.memory().queue().map(|p| p.id()).collect();
            prop_assert!(waiting.windows(2).all(|w| w[0] < w[1]));
            let admitted = sim
                .cpu()
                .ready()
                .chain(sim.cpu().active())
                .chain(sim.io().queue())
                .chain(sim.io().active())
                .map(|p| p.id())
                .max();
            if let (Some(first_waiting), Some(last_admitted)) = (waiting.first(), admitted) {
                prop_assert!(last_admitted < *first_waiting);
            }
        }
    }
}
