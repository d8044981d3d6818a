//! Benchmark configuration, read once at start-up and threaded into the runner.

use crate::{
    backend::BackendKind,
    chan::{Capacity, Flavor},
    error::ConfigError,
};

pub const DEFAULT_THREADS: usize = 1;
pub const DEFAULT_ITERATIONS: u64 = 1_000_000;
pub const DEFAULT_SWITCH_TASKS: usize = 1000;
pub const DEFAULT_CAPACITIES: [Capacity; 3] = [
    Capacity::RENDEZVOUS,
    Capacity::Bounded(1),
    Capacity::Unbounded,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Parallelism hint: runtime worker threads, and producer/consumer pairs
    pub threads: usize,
    /// N: yields per switch benchmark, sends per producer
    pub iterations: u64,
    /// K: workers sharing the yields of the many-task switch benchmark
    pub switch_tasks: usize,
    pub capacities: Vec<Capacity>,
    pub backend: BackendKind,
    pub flavor: Flavor,
    pub mutex: bool,
    pub atomic: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            iterations: DEFAULT_ITERATIONS,
            switch_tasks: DEFAULT_SWITCH_TASKS,
            capacities: DEFAULT_CAPACITIES.to_vec(),
            backend: BackendKind::default(),
            flavor: Flavor::default(),
            mutex: false,
            atomic: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.switch_tasks == 0 {
            return Err(ConfigError::ZeroSwitchTasks);
        }
        if self.switch_tasks as u64 > self.iterations {
            return Err(ConfigError::TooManySwitchTasks {
                tasks: self.switch_tasks,
                iterations: self.iterations,
            });
        }
        Ok(())
    }

    /// Yields each of the K switch tasks performs (floor division).
    pub fn yields_per_task(&self) -> u64 {
        self.iterations / self.switch_tasks.max(1) as u64
    }

    /// Operations across all workers of the per-thread scaled benchmarks.
    pub fn aggregate_ops(&self) -> u64 {
        self.iterations.saturating_mul(self.threads as u64)
    }
}

/// Reads the thread-count argument. Absent, malformed or zero values fall
/// back to [`DEFAULT_THREADS`] instead of failing.
pub fn parse_threads(arg: Option<&str>) -> usize {
    match arg.map(|s| s.trim().parse::<usize>()) {
        Some(Ok(n)) if n > 0 => n,
        Some(Ok(_)) | None => DEFAULT_THREADS,
        Some(Err(e)) => {
            log::debug!("ignoring thread count {arg:?}: {e}");
            DEFAULT_THREADS
        }
    }
}
