//! Benchmark sequence
//!
//! The runner times each benchmark call on its own and writes one line per
//! result. Backend construction, report checks and printing all happen
//! outside the timed region.

use std::io::{self, Write};

use crate::{
    backend::{self, Backend, ChannelReport, MutexReport, SwitchReport, atomic_baseline},
    chan::Capacity,
    config::Config,
    error::Error,
    measure::{Measurement, measure},
};

pub struct Runner {
    config: Config,
    backend: Box<dyn Backend>,
}

impl Runner {
    /// Validates `config` and builds its backend.
    pub fn new(mut config: Config) -> Result<Self, Error> {
        config.validate()?;
        config.threads = config.threads.max(1);
        let backend = backend::build(&config)?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn header(&self) -> String {
        format!("Thread: {}", self.backend.threads())
    }

    /// Runs every enabled benchmark in order, writing the header and one line
    /// per result to `out` as soon as it is measured.
    pub fn run(&self, out: &mut impl Write) -> io::Result<Vec<Measurement>> {
        let config = &self.config;
        let backend = self.backend.as_ref();
        let n = config.iterations;
        let scaled = config.aggregate_ops();
        let mut results = Vec::new();

        log::info!(
            "running on {} backend: n={n} switch_tasks={} flavor={:?} capacities={:?}",
            backend.name(),
            config.switch_tasks,
            config.flavor,
            config.capacities,
        );
        writeln!(out, "{}", self.header())?;

        if config.atomic {
            let (m, count) = measure("Atomic", n, || atomic_baseline(n));
            if count != n {
                log::warn!("{}: counted {count} of {n} increments", m.name);
            }
            emit(out, &mut results, m)?;
        }

        let (m, report) = measure("Switch_1", n, || backend.switch_one(n));
        check_switch(&m, report, 1);
        emit(out, &mut results, m)?;

        let k = config.switch_tasks;
        let yields = config.yields_per_task() * k as u64;
        if yields != n {
            log::warn!("{k} tasks do not divide {n} iterations, {} yields dropped", n - yields);
        }
        let (m, report) = measure(format!("Switch_{k}"), yields, || backend.switch_many(k, n));
        check_switch(&m, report, k);
        emit(out, &mut results, m)?;

        if config.mutex {
            let (m, report) = measure("Mutex", scaled, || backend.mutex(n));
            check_mutex(&m, report);
            emit(out, &mut results, m)?;
        }

        for &capacity in &config.capacities {
            let (m, report) = measure(channel_name(capacity), scaled, || {
                backend.channel(config.flavor, capacity, n)
            });
            check_channel(&m, report);
            emit(out, &mut results, m)?;
        }

        Ok(results)
    }
}

pub fn channel_name(capacity: Capacity) -> String {
    format!("Channel_{capacity}")
}

fn emit(out: &mut impl Write, results: &mut Vec<Measurement>, m: Measurement) -> io::Result<()> {
    writeln!(out, "{m}")?;
    results.push(m);
    Ok(())
}

fn check_switch(m: &Measurement, report: SwitchReport, workers: usize) -> bool {
    log::debug!("{}: {report:?}", m.name);
    let consistent = report.workers == workers && report.yields == m.ops && report.signals == 1;
    if !consistent {
        log::warn!("{}: inconsistent switch accounting {report:?}", m.name);
    }
    consistent
}

/// Every token sent was received, and none is left in the buffer.
fn check_channel(m: &Measurement, report: ChannelReport) -> bool {
    log::debug!("{}: {report:?}", m.name);
    let consistent = report.sent == m.ops
        && report.received == m.ops
        && report.leftover == 0
        && report.signals == 2 * report.pairs;
    if !consistent {
        log::warn!("{}: inconsistent channel accounting {report:?}", m.name);
    }
    consistent
}

fn check_mutex(m: &Measurement, report: MutexReport) -> bool {
    log::debug!("{}: {report:?}", m.name);
    let consistent = report.increments == m.ops && report.signals == report.workers;
    if !consistent {
        log::warn!("{}: inconsistent mutex accounting {report:?}", m.name);
    }
    consistent
}
