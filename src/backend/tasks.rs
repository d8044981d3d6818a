//! Async tasks on a tokio multi-thread runtime
//!
//! The runtime is built once with `threads` worker threads and every benchmark
//! is driven by `block_on` from the calling thread, which only spawns and then
//! waits on the completion signal.
//!
//! The switch primitive is [`tokio::task::yield_now`]: the task goes to the
//! back of its worker's run queue and is polled again after the other ready
//! tasks. With no other task ready it resumes right away, so `Switch_1` here
//! measures the round trip through the scheduler rather than a hand-off.
//!
//! Task bodies run under `run_async`, so a panicking task still signals
//! completion. The driver then releases its channel endpoints and re-raises
//! the panic from `block_on`.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::runtime::{Builder, Runtime};

use crate::{
    backend::{Backend, ChannelReport, MutexReport, SwitchReport},
    chan::{AsyncPipe, Capacity, Flavor, Flume, Kanal},
    completion::{Latch, Tally},
};

pub struct Tasks {
    rt: Runtime,
    threads: usize,
}

impl Tasks {
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let threads = threads.max(1);
        log::info!("starting tokio runtime with {threads} worker threads");
        let rt = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("sched-bench-worker")
            .build()?;
        Ok(Self { rt, threads })
    }

    fn switch(&self, workers: usize, yields: u64) -> SwitchReport {
        self.rt.block_on(async {
            let latch = Arc::new(Latch::new(workers));
            for _ in 0..workers {
                let latch = latch.clone();
                tokio::spawn(async move {
                    latch
                        .run_async(async {
                            for _ in 0..yields {
                                tokio::task::yield_now().await;
                            }
                        })
                        .await
                });
            }
            latch.wait_async().await;
            latch.rethrow();

            SwitchReport {
                workers,
                yields: yields * workers as u64,
                signals: latch.fired(),
            }
        })
    }

    fn channel_with<P: AsyncPipe>(&self, capacity: Capacity, n: u64) -> ChannelReport {
        let pairs = self.threads;
        self.rt.block_on(async {
            let (tx, rx) = P::pair(capacity);
            let tally = Arc::new(Tally::new(2 * pairs));
            let sent = Arc::new(AtomicU64::new(0));
            let received = Arc::new(AtomicU64::new(0));

            for _ in 0..pairs {
                let tx = tx.clone();
                let tally_tx = tally.clone();
                let sent = sent.clone();
                tokio::spawn(async move {
                    tally_tx
                        .run_async(async {
                            let mut count = 0u64;
                            for _ in 0..n {
                                P::send(&tx, true).await;
                                count += 1;
                            }
                            sent.fetch_add(count, Ordering::Release);
                        })
                        .await
                });

                let rx = rx.clone();
                let tally_rx = tally.clone();
                let received = received.clone();
                tokio::spawn(async move {
                    tally_rx
                        .run_async(async {
                            let mut got = 0u64;
                            for _ in 0..n {
                                got += u64::from(P::recv(&rx).await);
                            }
                            received.fetch_add(got, Ordering::Release);
                        })
                        .await
                });
            }
            // tasks hold the only senders from here on
            drop(tx);

            let signals = tally.wait_async().await;
            let leftover = P::len(&rx) as u64;
            drop(rx);
            // after a failure, surviving tasks exit on the disconnect
            tally.settle_async(signals).await;
            tally.rethrow();

            ChannelReport {
                pairs,
                sent: sent.load(Ordering::Acquire),
                received: received.load(Ordering::Acquire),
                leftover,
                signals,
            }
        })
    }
}

impl Backend for Tasks {
    fn name(&self) -> &'static str {
        "tasks"
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
        self.rt.block_on(async {
            let counter = Arc::new(tokio::sync::Mutex::new(0u64));
            let tally = Arc::new(Tally::new(workers));

            for _ in 0..workers {
                let counter = counter.clone();
                let tally = tally.clone();
                tokio::spawn(async move {
                    tally
                        .run_async(async {
                            for _ in 0..n {
                                *counter.lock().await += 1;
                            }
                        })
                        .await
                });
            }

            let signals = tally.wait_async().await;
            tally.rethrow();
            let increments = *counter.lock().await;
            MutexReport {
                workers,
                increments,
                signals,
            }
        })
    }
}
