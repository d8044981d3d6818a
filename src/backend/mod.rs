//! Execution backends
//!
//! A backend owns the execution contexts the workers run on and implements
//! every benchmark body. All backends follow the same protocol so their
//! numbers stay comparable:
//!
//! - switch benchmarks complete through a [`Latch`](crate::completion::Latch)
//! - channel and mutex benchmarks complete through a [`Tally`](crate::completion::Tally)
//! - accounting is kept in worker-local counters and published once per worker
//!
//! ## Implementations
//!
//! - [`tasks`] — async tasks on a tokio multi-thread runtime
//! - [`threads`] — one scoped OS thread per worker

#[cfg(feature = "tasks")]
pub mod tasks;
pub mod threads;

use std::{
    hint::black_box,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    chan::{Capacity, Flavor},
    config::Config,
    error::Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    Tasks,
    Threads,
}

impl Default for BackendKind {
    #[cfg(feature = "tasks")]
    fn default() -> Self {
        Self::Tasks
    }

    #[cfg(not(feature = "tasks"))]
    fn default() -> Self {
        Self::Threads
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchReport {
    pub workers: usize,
    /// Yields performed across all workers
    pub yields: u64,
    /// Times the completion latch released the driver
    pub signals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReport {
    pub pairs: usize,
    pub sent: u64,
    pub received: u64,
    /// Tokens still buffered once every worker finished
    pub leftover: u64,
    pub signals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexReport {
    pub workers: usize,
    /// Final value of the shared counter
    pub increments: u64,
    pub signals: usize,
}

pub trait Backend {
    fn name(&self) -> &'static str;

    /// Parallelism in use: runtime workers or producer/consumer pairs.
    fn threads(&self) -> usize;

    /// One worker yields `n` times.
    fn switch_one(&self, n: u64) -> SwitchReport;

    /// `workers` workers yield `n / workers` times each.
    fn switch_many(&self, workers: usize, n: u64) -> SwitchReport;

    /// [`threads`](Backend::threads) producer/consumer pairs share one channel,
    /// each producer sending `n` tokens and each consumer receiving `n`.
    fn channel(&self, flavor: Flavor, capacity: Capacity, n: u64) -> ChannelReport;

    /// [`threads`](Backend::threads) workers increment one locked counter `n` times each.
    fn mutex(&self, n: u64) -> MutexReport;
}

/// Builds the backend selected by `config`. Construction happens before any
/// benchmark is timed.
pub fn build(config: &Config) -> Result<Box<dyn Backend>, Error> {
    let threads = config.threads.max(1);
    match config.backend {
        #[cfg(feature = "tasks")]
        BackendKind::Tasks => Ok(Box::new(tasks::Tasks::new(threads)?)),
        #[cfg(not(feature = "tasks"))]
        BackendKind::Tasks => Err(Error::Unavailable("tasks")),
        BackendKind::Threads => Ok(Box::new(threads::Threads::new(threads))),
    }
}

/// Single-thread baseline: `n` relaxed increments of one atomic counter.
pub fn atomic_baseline(n: u64) -> u64 {
    let counter = AtomicU64::new(0);
    for _ in 0..n {
        black_box(&counter).fetch_add(1, Ordering::Relaxed);
    }
    counter.into_inner()
}

#[cfg(test)]
mod backend_test {
    use super::*;

    #[test]
    fn test_atomic_baseline_counts() {
        assert_eq!(atomic_baseline(0), 0);
        assert_eq!(atomic_baseline(12_345), 12_345);
    }

    #[test]
    fn test_build_threads() {
        let config = Config {
            threads: 3,
            backend: BackendKind::Threads,
            ..Config::default()
        };
        let backend = build(&config).unwrap();
        assert_eq!(backend.name(), "threads");
        assert_eq!(backend.threads(), 3);
    }

    #[cfg(feature = "tasks")]
    #[test]
    fn test_build_tasks() {
        let config = Config {
            threads: 2,
            backend: BackendKind::Tasks,
            ..Config::default()
        };
        let backend = build(&config).unwrap();
        assert_eq!(backend.name(), "tasks");
        assert_eq!(backend.threads(), 2);
    }
}
