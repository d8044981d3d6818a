//! One OS thread per worker
//!
//! Workers are spawned inside a [`crossbeam_utils::thread::scope`], so they can
//! borrow the completion signal and counters straight from the driver's stack.
//! The switch primitive is [`std::thread::yield_now`], a hint to the OS
//! scheduler that may return without running anything else.
//!
//! A panicking worker wakes the driver, which drops its own channel endpoints
//! so that blocked peers see a disconnect and exit, then re-raises the panic.

use std::{
    any::Any,
    panic,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread,
};

use crossbeam_utils::thread::{Scope, scope};

use crate::{
    backend::{Backend, ChannelReport, MutexReport, SwitchReport},
    chan::{Capacity, Flavor, Flume, Kanal, SyncPipe},
    completion::{Latch, Tally},
};

pub struct Threads {
    threads: usize,
}

/// Runs `f` with a thread scope and propagates the first worker panic.
fn scoped<'env, R>(f: impl FnOnce(&Scope<'env>) -> R) -> R {
    match scope(f) {
        Ok(out) => out,
        Err(payload) => {
            // the scope collects every worker panic into one vector
            let payload: Box<dyn Any + Send> = match payload.downcast::<Vec<Box<dyn Any + Send>>>() {
                Ok(mut panics) if !panics.is_empty() => panics.swap_remove(0),
                Ok(panics) => panics,
                Err(other) => other,
            };
            panic::resume_unwind(payload)
        }
    }
}

impl Threads {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    fn switch(&self, workers: usize, yields: u64) -> SwitchReport {
        let latch = Latch::new(workers);
        scoped(|s| {
            for _ in 0..workers {
                s.spawn(|_| {
                    latch.run(|| {
                        for _ in 0..yields {
                            thread::yield_now();
                        }
                    })
                });
            }
            latch.wait();
            latch.rethrow();
        });

        SwitchReport {
            workers,
            yields: yields * workers as u64,
            signals: latch.fired(),
        }
    }

    fn channel_with<P: SyncPipe>(&self, capacity: Capacity, n: u64) -> ChannelReport {
        let pairs = self.threads;
        let (tx, rx) = P::pair(capacity);
        let tally = Tally::new(2 * pairs);
        let sent = AtomicU64::new(0);
        let received = AtomicU64::new(0);

        let (signals, leftover) = scoped(|s| {
            let (tally, sent, received) = (&tally, &sent, &received);
            for _ in 0..pairs {
                let tx = tx.clone();
                s.spawn(move |_| {
                    tally.run(|| {
                        let mut count = 0u64;
                        for _ in 0..n {
                            P::send(&tx, true);
                            count += 1;
                        }
                        sent.fetch_add(count, Ordering::Release);
                    })
                });

                let rx = rx.clone();
                s.spawn(move |_| {
                    tally.run(|| {
                        let mut got = 0u64;
                        for _ in 0..n {
                            got += u64::from(P::recv(&rx));
                        }
                        received.fetch_add(got, Ordering::Release);
                    })
                });
            }
            // workers hold the only senders from here on
            drop(tx);
            let signals = tally.wait();
            let leftover = P::len(&rx) as u64;
            drop(rx);
            tally.rethrow();
            (signals, leftover)
        });

        ChannelReport {
            pairs,
            sent: sent.load(Ordering::Acquire),
            received: received.load(Ordering::Acquire),
            leftover,
            signals,
        }
    }
}

impl Backend for Threads {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn threads(&self) -> usize {
        self.threads
    }

    fn switch_one(&self, n: u64) -> SwitchReport {
        self.switch(1, n)
    }

    fn switch_many(&self, workers: usize, n: u64) -> SwitchReport {
        self.switch(workers, n / workers.max(1) as u64)
    }

    fn channel(&self, flavor: Flavor, capacity: Capacity, n: u64) -> ChannelReport {
        match flavor {
            Flavor::Flume => self.channel_with::<Flume>(capacity, n),
            Flavor::Kanal => self.channel_with::<Kanal>(capacity, n),
        }
    }

    fn mutex(&self, n: u64) -> MutexReport {
        let workers = self.threads;
        let counter = Mutex::new(0u64);
        let tally = Tally::new(workers);

        let signals = scoped(|s| {
            for _ in 0..workers {
                s.spawn(|_| {
                    tally.run(|| {
                        for _ in 0..n {
                            *counter.lock().unwrap_or_else(PoisonError::into_inner) += 1;
                        }
                    })
                });
            }
            let signals = tally.wait();
            tally.rethrow();
            signals
        });

        MutexReport {
            workers,
            increments: counter.into_inner().unwrap_or_else(PoisonError::into_inner),
            signals,
        }
    }
}
