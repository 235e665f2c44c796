//! Operating system scheduler simulation application.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::convert::TryFrom;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use indicatif::{ProgressBar, ProgressStyle};

use ossim::{
    Observer, Process, ProcessId, SchedulingMode, Simulation, SimulationConfig, TraceWorkload,
};

/// Runs a simulation of processes competing for memory, a CPU, and an I/O device.
///
/// Values given as options override the ones read from the configuration file.
#[derive(Parser)]
#[clap(version, author)]
struct Opt {
    /// Path to a JSON file with the simulation configuration.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Memory size in kilobytes.
    #[clap(long)]
    memory_size: Option<u64>,

    /// CPU time quantum in milliseconds.
    #[clap(long)]
    max_cpu_time: Option<u64>,

    /// Average I/O operation time in milliseconds.
    #[clap(long)]
    avg_io_time: Option<u64>,

    /// Simulation length in milliseconds.
    #[clap(long)]
    simulation_length: Option<u64>,

    /// Average time between process arrivals in milliseconds.
    #[clap(long)]
    avg_arrival_interval: Option<u64>,

    /// Scheduling policy: `round_robin` or `priority_round_robin`.
    #[clap(short, long)]
    mode: Option<SchedulingMode>,

    /// Random seed.
    #[clap(long)]
    seed: Option<u64>,

    /// Path to a JSON array of process arrivals to replay instead of random processes.
    #[clap(long)]
    workload: Option<PathBuf>,

    /// Write the final report to this file in JSON format.
    #[clap(long)]
    report_json: Option<PathBuf>,

    /// Write a CSV record of every completed process to this file.
    #[clap(long)]
    process_log: Option<PathBuf>,

    /// Verbosity.
    #[clap(short, long, parse(from_occurrences))]
    verbose: i32,

    /// Store the logs this file.
    #[clap(long)]
    log_output: Option<PathBuf>,

    /// Do not log to the stderr.
    #[clap(long)]
    no_stderr: bool,

    /// Do not display the progress bar.
    #[clap(long)]
    no_progress: bool,
}

struct App {
    config: SimulationConfig,
    workload: Option<TraceWorkload>,
    report_json: Option<PathBuf>,
    process_log: Option<PathBuf>,
    progress: bool,
}

impl TryFrom<Opt> for App {
    type Error = eyre::Error;
    fn try_from(opt: Opt) -> eyre::Result<Self> {
        let mut config = if let Some(path) = &opt.config {
            let file = File::open(path)
                .wrap_err_with(|| format!("unable to open config file: {}", path.display()))?;
            SimulationConfig::from_json(file).wrap_err("unable to parse config")?
        } else {
            SimulationConfig::default()
        };
        config.memory_size = opt.memory_size.unwrap_or(config.memory_size);
        config.max_cpu_time = opt.max_cpu_time.unwrap_or(config.max_cpu_time);
        config.avg_io_time = opt.avg_io_time.unwrap_or(config.avg_io_time);
        config.simulation_length = opt.simulation_length.unwrap_or(config.simulation_length);
        config.avg_arrival_interval = opt
            .avg_arrival_interval
            .unwrap_or(config.avg_arrival_interval);
        config.mode = opt.mode.unwrap_or(config.mode);
        config.seed = opt.seed.or(config.seed);
        let workload = if let Some(path) = &opt.workload {
            let file = File::open(path)
                .wrap_err_with(|| format!("unable to open workload file: {}", path.display()))?;
            Some(TraceWorkload::from_json(file).wrap_err("unable to load workload")?)
        } else {
            None
        };
        Ok(Self {
            config,
            workload,
            report_json: opt.report_json,
            process_log: opt.process_log,
            progress: !opt.no_progress,
        })
    }
}

impl App {
    fn run(self) -> eyre::Result<()> {
        let mut sim = Simulation::new(self.config);
        if let Some(workload) = self.workload {
            sim = sim.with_workload(workload);
        }
        if self.process_log.is_some() {
            sim = sim.record_processes();
        }
        let bar = if self.progress {
            ProgressBar::new(sim.config().simulation_length / 1000)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(ProgressStyle::default_bar().template("{msg} {wide_bar} {percent}%"));
        let mut sim = sim.with_observer(Progress::new(bar.clone()));
        sim.run()?;
        bar.finish();

        let report = sim.report();
        println!("{}", report);
        if let Some(path) = &self.report_json {
            let file = File::create(path)
                .wrap_err_with(|| format!("unable to create report file: {}", path.display()))?;
            serde_json::to_writer_pretty(file, &report).wrap_err("unable to write report")?;
        }
        if let Some(path) = &self.process_log {
            let mut writer = csv::Writer::from_path(path)
                .wrap_err_with(|| format!("unable to create process log: {}", path.display()))?;
            for record in sim.statistics().records() {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

/// Shows simulated time and the processes currently using the CPU and the I/O device.
struct Progress {
    bar: ProgressBar,
    time: Duration,
    cpu: Option<ProcessId>,
    io: Option<ProcessId>,
}

impl Progress {
    fn new(bar: ProgressBar) -> Self {
        Self {
            bar,
            time: Duration::default(),
            cpu: None,
            io: None,
        }
    }
}

fn describe(process: Option<ProcessId>) -> String {
    process.map_or_else(|| String::from("-"), |id| id.to_string())
}

impl Observer for Progress {
    fn cpu_active_changed(&mut self, process: Option<&Process>) {
        self.cpu = process.map(Process::id);
    }

    fn io_active_changed(&mut self, process: Option<&Process>) {
        self.io = process.map(Process::id);
    }

    fn time_passed(&mut self, elapsed: Duration) {
        self.time += elapsed;
        let secs = self.time.as_secs();
        if self.bar.position() < secs {
            self.bar.set_position(secs);
            self.bar.set_message(&format!(
                "[{time}s] [CPU={cpu}] [IO={io}]",
                time = secs,
                cpu = describe(self.cpu),
                io = describe(self.io),
            ));
        }
    }
}

/// Set up a logger based on the given user options.
fn set_up_logger(opt: &Opt) -> Result<(), fern::InitError> {
    let log_level = match opt.verbose {
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        3 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Warn,
    };
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(log_level);
    let dispatch = if let Some(path) = &opt.log_output {
        dispatch.chain(fern::log_file(path)?)
    } else {
        dispatch
    };
    let dispatch = if opt.no_stderr {
        dispatch
    } else {
        dispatch.chain(std::io::stderr())
    };
    dispatch.apply()?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    set_up_logger(&opt)?;
    App::try_from(opt)?.run()
}
