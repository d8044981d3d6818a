use clap::Parser;

use crate::{
    backend::BackendKind,
    chan::{Capacity, Flavor},
    config::{Config, DEFAULT_CAPACITIES, DEFAULT_ITERATIONS, DEFAULT_SWITCH_TASKS, parse_threads},
};

/// Measures task-switch latency and channel hand-off throughput.
#[derive(Debug, Parser)]
#[command(name = "sched-bench", version, about)]
pub struct Args {
    /// Worker threads (runtime workers and producer/consumer pairs).
    /// Missing, malformed or zero values mean 1.
    #[arg(allow_hyphen_values = true)]
    pub threads: Option<String>,

    /// Arguments after the thread count are accepted and ignored.
    #[arg(hide = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,

    /// Iterations per benchmark (N)
    #[arg(short = 'n', long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: u64,

    /// Tasks sharing the yields of the many-task switch benchmark (K)
    #[arg(short = 'k', long, default_value_t = DEFAULT_SWITCH_TASKS)]
    pub switch_tasks: usize,

    /// Channel capacities to measure; `N` is unbounded
    #[arg(short, long = "capacity", value_delimiter = ',', default_values_t = DEFAULT_CAPACITIES)]
    pub capacities: Vec<Capacity>,

    #[arg(long, value_enum, default_value_t = BackendKind::default())]
    pub backend: BackendKind,

    #[arg(long, value_enum, default_value_t = Flavor::default())]
    pub flavor: Flavor,

    /// Also run the mutex contention benchmark
    #[arg(long)]
    pub mutex: bool,

    /// Also run the single-thread atomic increment baseline
    #[arg(long)]
    pub atomic: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        if !args.extra.is_empty() {
            log::debug!("ignoring extra arguments {:?}", args.extra);
        }
        Self {
            threads: parse_threads(args.threads.as_deref()),
            iterations: args.iterations,
            switch_tasks: args.switch_tasks,
            capacities: args.capacities,
            backend: args.backend,
            flavor: args.flavor,
            mutex: args.mutex,
            atomic: args.atomic,
        }
    }
}
