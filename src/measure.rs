//! Wall-clock measurements and their report line.

use std::{
    fmt,
    time::{Duration, Instant},
};

/// Scale of the `w/s` figure: operations per 100 microseconds of wall time.
pub const THROUGHPUT_SCALE: u128 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub name: String,
    /// Operations performed across all workers
    pub ops: u64,
    pub elapsed: Duration,
}

impl Measurement {
    pub fn new(name: impl Into<String>, ops: u64, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            ops,
            elapsed,
        }
    }

    /// Elapsed nanoseconds, never below one so derived figures stay finite.
    fn elapsed_ns(&self) -> u128 {
        self.elapsed.as_nanos().max(1)
    }

    /// Average wall time per operation, truncated.
    pub fn ns_per_op(&self) -> u128 {
        match self.ops {
            0 => 0,
            ops => self.elapsed_ns() / u128::from(ops),
        }
    }

    /// `100000 × ops / elapsed_ns`, truncated.
    pub fn throughput(&self) -> u128 {
        THROUGHPUT_SCALE * u128::from(self.ops) / self.elapsed_ns()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}    {}    {} ns/op    {} w/s",
            self.name,
            self.ops,
            self.ns_per_op(),
            self.throughput()
        )
    }
}

/// Times `f` alone: the clock is read right before and right after the call.
pub fn measure<R>(name: impl Into<String>, ops: u64, f: impl FnOnce() -> R) -> (Measurement, R) {
    let start = Instant::now();
    let out = f();
    let elapsed = start.elapsed();
    (Measurement::new(name, ops, elapsed), out)
}
