//! Micro-benchmarks for the raw cost of concurrency primitives
//!
//! Measures cooperative task-switch latency and channel hand-off throughput
//! under a configurable number of worker threads and channel capacities:
//!
//! - `Switch_1`: one worker yielding N times
//! - `Switch_K`: K workers sharing N yields, released by an atomic countdown
//! - `Channel_<c>`: producer/consumer pairs moving N tokens each through a
//!   channel of capacity `c` (`0` rendezvous, `1`, `N` unbounded)
//! - `Mutex` and `Atomic`: optional contention and baseline figures
//!
//! Each result is printed as
//!
//! ```text
//! <name>    <ops>    <ns_per_op> ns/op    <throughput> w/s
//! ```
//!
//! where throughput is `100000 × ops / elapsed_ns`.
//!
//! ```no_run
//! use sched_bench::{config::Config, runner::Runner};
//!
//! let runner = Runner::new(Config::default())?;
//! runner.run(&mut std::io::stdout())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod chan;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod measure;
pub mod runner;

pub use error::{ConfigError, Error};
