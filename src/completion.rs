//! Completion signals
//!
//! Two ways for the driver to learn that every worker of a benchmark is done:
//!
//! - [`Latch`]: an atomic countdown. The last worker to arrive sends one token
//!   into a single-slot channel, so the driver is woken exactly once no matter
//!   how many workers there are. Used by the task-switch family.
//! - [`Tally`]: a buffered channel sized to the number of workers. Every worker
//!   pushes one token and the driver drains them all. Used by the channel and
//!   mutex families.
//!
//! Both are built on flume, whose endpoints can be waited on from an OS thread
//! or from an async task.
//!
//! Worker bodies go through `run`/`run_async`, which catch a panic, keep the
//! first payload and wake the driver at once. The driver re-raises it with
//! `rethrow` after releasing whatever the surviving workers may block on.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crossbeam_utils::CachePadded;

#[cfg(feature = "tasks")]
use futures::FutureExt;

type Payload = Box<dyn Any + Send>;

/// First panic caught in a worker.
#[derive(Default)]
struct Failure {
    failed: AtomicBool,
    payload: Mutex<Option<Payload>>,
}

impl Failure {
    fn record(&self, payload: Payload) {
        let mut slot = self.payload.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(payload);
        }
        self.failed.store(true, Ordering::Release);
    }

    fn is_set(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn rethrow(&self) {
        if !self.is_set() {
            return;
        }
        let payload = self
            .payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }
}

pub struct Latch {
    /// Workers that have not arrived yet
    remaining: CachePadded<AtomicUsize>,
    /// How many times the driver was released by a last arrival
    fired: AtomicUsize,
    failure: Failure,
    tx: flume::Sender<()>,
    rx: flume::Receiver<()>,
}

impl Latch {
    /// A latch with zero parties is already open.
    pub fn new(parties: usize) -> Self {
        let (tx, rx) = flume::bounded(1);
        if parties == 0 {
            let _ = tx.try_send(());
        }
        Self {
            remaining: CachePadded::new(AtomicUsize::new(parties)),
            fired: AtomicUsize::new(0),
            failure: Failure::default(),
            tx,
            rx,
        }
    }

    /// Records one finished worker. Returns `true` for the arrival that
    /// released the driver; arrivals past the party count are ignored.
    pub fn arrive(&self) -> bool {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));

        match prev {
            Ok(1) => {
                self.fired.fetch_add(1, Ordering::Relaxed);
                // single slot: a failure may have filled it already
                let _ = self.tx.try_send(());
                true
            }
            _ => false,
        }
    }

    /// Runs one worker body, then arrives. A panic is kept for
    /// [`rethrow`](Latch::rethrow) and wakes the driver immediately.
    pub fn run<R>(&self, work: impl FnOnce() -> R) -> Option<R> {
        let out = panic::catch_unwind(AssertUnwindSafe(work));
        self.finish(out)
    }

    #[cfg(feature = "tasks")]
    pub async fn run_async<F: Future>(&self, work: F) -> Option<F::Output> {
        let out = AssertUnwindSafe(work).catch_unwind().await;
        self.finish(out)
    }

    fn finish<R>(&self, out: Result<R, Payload>) -> Option<R> {
        let out = match out {
            Ok(out) => Some(out),
            Err(payload) => {
                self.failure.record(payload);
                let _ = self.tx.try_send(());
                None
            }
        };
        self.arrive();
        out
    }

    /// Blocks the calling thread until every party has arrived or one failed.
    pub fn wait(&self) {
        // `self` owns a sender, so the channel cannot disconnect
        let _ = self.rx.recv();
    }

    #[cfg(feature = "tasks")]
    pub async fn wait_async(&self) {
        let _ = self.rx.recv_async().await;
    }

    /// Re-raises the first worker panic, if any.
    pub fn rethrow(&self) {
        self.failure.rethrow();
    }

    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

pub struct Tally {
    expected: usize,
    failure: Failure,
    tx: flume::Sender<()>,
    rx: flume::Receiver<()>,
}

impl Tally {
    pub fn new(expected: usize) -> Self {
        let (tx, rx) = flume::bounded(expected);
        Self {
            expected,
            failure: Failure::default(),
            tx,
            rx,
        }
    }

    /// Pushes one completion token. Never blocks: a surplus signal is
    /// rejected and reported as `false`.
    pub fn signal(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    /// Runs one worker body, then signals. A panic is kept for
    /// [`rethrow`](Tally::rethrow) and ends the driver's wait early.
    pub fn run<R>(&self, work: impl FnOnce() -> R) -> Option<R> {
        let out = panic::catch_unwind(AssertUnwindSafe(work));
        self.finish(out)
    }

    #[cfg(feature = "tasks")]
    pub async fn run_async<F: Future>(&self, work: F) -> Option<F::Output> {
        let out = AssertUnwindSafe(work).catch_unwind().await;
        self.finish(out)
    }

    fn finish<R>(&self, out: Result<R, Payload>) -> Option<R> {
        let out = out.map_err(|payload| self.failure.record(payload)).ok();
        self.signal();
        out
    }

    /// Drains up to `expected` tokens, blocking the calling thread. Stops at
    /// the first token of a failed worker.
    pub fn wait(&self) -> usize {
        let mut drained = 0;
        while drained < self.expected && !self.failure.is_set() {
            if self.rx.recv().is_err() {
                break;
            }
            drained += 1;
        }
        drained
    }

    #[cfg(feature = "tasks")]
    pub async fn wait_async(&self) -> usize {
        let mut drained = 0;
        while drained < self.expected && !self.failure.is_set() {
            if self.rx.recv_async().await.is_err() {
                break;
            }
            drained += 1;
        }
        drained
    }

    /// Waits for the signals still outstanding after a wait that stopped
    /// early at `drained`. Every worker signals once, failed or not.
    #[cfg(feature = "tasks")]
    pub async fn settle_async(&self, drained: usize) {
        for _ in drained..self.expected {
            if self.rx.recv_async().await.is_err() {
                break;
            }
        }
    }

    /// Re-raises the first worker panic, if any.
    pub fn rethrow(&self) {
        self.failure.rethrow();
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Serializes panic hook swaps between concurrently running tests.
#[cfg(test)]
static HOOK: Mutex<()> = Mutex::new(());

/// Runs `f` with the panic hook silenced, restoring the hook afterwards.
#[cfg(test)]
pub(crate) fn quietly<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    let _guard = HOOK.lock().unwrap_or_else(PoisonError::into_inner);
    silenced(f)
}

#[cfg(test)]
fn silenced<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    let prev = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let out = panic::catch_unwind(AssertUnwindSafe(f));
    panic::set_hook(prev);
    out
}

#[cfg(test)]
pub(crate) fn panic_message(payload: Payload) -> String {
    match payload.downcast::<&str>() {
        Ok(s) => s.to_string(),
        Err(payload) => payload
            .downcast::<String>()
            .map(|s| *s)
            .unwrap_or_else(|_| "non-string panic".to_owned()),
    }
}

#[cfg(test)]
mod completion_test {
    use super::*;
    use crossbeam_utils::thread::scope;

    fn failing_worker() {
        panic!("worker failed")
    }

    /// Exactly one arrival releases the driver, and only after all parties arrived
    #[test]
    fn test_latch_fires_once() {
        const PARTIES: usize = 64;
        let latch = Latch::new(PARTIES);
        let released = AtomicUsize::new(0);

        scope(|s| {
            for _ in 0..PARTIES {
                s.spawn(|_| {
                    if latch.arrive() {
                        released.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
            latch.wait();
            assert_eq!(latch.remaining(), 0);
        })
        .unwrap();

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(latch.fired(), 1);
    }

    #[test]
    fn test_latch_ignores_surplus_arrivals() {
        let latch = Latch::new(2);
        assert!(!latch.arrive());
        assert_eq!(latch.remaining(), 1);
        assert!(latch.arrive());
        assert!(!latch.arrive());
        assert_eq!(latch.remaining(), 0);
        assert_eq!(latch.fired(), 1);
        latch.wait();
    }

    #[test]
    fn test_latch_without_parties_is_open() {
        let latch = Latch::new(0);
        latch.wait();
        assert_eq!(latch.fired(), 0);
    }

    /// A worker that never finishes must not keep the driver waiting once
    /// another worker has panicked
    #[test]
    fn test_latch_failure_wakes_driver() {
        let latch = Latch::new(3);
        let out = quietly(|| {
            scope(|s| {
                s.spawn(|_| latch.run(|| ()));
                s.spawn(|_| latch.run(failing_worker));
                latch.wait();
                latch.rethrow();
            })
        });

        let payload = out.unwrap_err();
        assert_eq!(panic_message(payload), "worker failed");
        assert_eq!(latch.remaining(), 1);
        assert_eq!(latch.fired(), 0);
    }

    #[test]
    fn test_latch_run_returns_output() {
        let latch = Latch::new(1);
        assert_eq!(latch.run(|| 7), Some(7));
        latch.wait();
        latch.rethrow();
        assert_eq!(latch.fired(), 1);
    }

    #[test]
    fn test_quietly_restores_hook() {
        static REPORTED: AtomicUsize = AtomicUsize::new(0);

        let _guard = HOOK.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = panic::take_hook();
        panic::set_hook(Box::new(|_| {
            REPORTED.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(silenced(failing_worker).is_err());
        assert_eq!(REPORTED.load(Ordering::SeqCst), 0);

        // the hook installed before the silenced call is back in place
        assert!(panic::catch_unwind(failing_worker).is_err());
        panic::set_hook(prev);
        assert_eq!(REPORTED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tally_drains_expected() {
        const WORKERS: usize = 8;
        let tally = Tally::new(WORKERS);

        scope(|s| {
            for _ in 0..WORKERS {
                s.spawn(|_| assert!(tally.signal()));
            }
            assert_eq!(tally.wait(), WORKERS);
        })
        .unwrap();

        assert_eq!(tally.pending(), 0);
    }

    #[test]
    fn test_tally_rejects_surplus() {
        let tally = Tally::new(2);
        assert!(tally.signal());
        assert!(tally.signal());
        assert!(!tally.signal());
        assert_eq!(tally.pending(), 2);
        assert_eq!(tally.wait(), 2);
        assert_eq!(tally.pending(), 0);
    }

    #[test]
    fn test_tally_failure_stops_drain() {
        let tally = Tally::new(4);
        let out = quietly(|| {
            assert_eq!(tally.run(|| ()), Some(()));
            tally.run(failing_worker);
            let drained = tally.wait();
            tally.rethrow();
            drained
        });

        assert_eq!(panic_message(out.unwrap_err()), "worker failed");
        assert_eq!(tally.pending(), 0);
    }

    #[cfg(feature = "tasks")]
    #[tokio::test]
    async fn test_async_wait() {
        use std::sync::Arc;

        let latch = Arc::new(Latch::new(16));
        let tally = Arc::new(Tally::new(16));
        for _ in 0..16 {
            let latch = latch.clone();
            let tally = tally.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                latch.arrive();
                tally.signal();
            });
        }

        latch.wait_async().await;
        assert_eq!(tally.wait_async().await, 16);
        assert_eq!(latch.fired(), 1);
    }

    #[cfg(feature = "tasks")]
    fn current_thread() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread().build().unwrap()
    }

    #[cfg(feature = "tasks")]
    #[test]
    fn test_async_failure_is_kept() {
        let latch = Latch::new(2);
        let out = quietly(|| {
            current_thread().block_on(async {
                let out = latch
                    .run_async(async {
                        tokio::task::yield_now().await;
                        failing_worker();
                    })
                    .await;
                latch.wait_async().await;
                out
            })
        });
        assert_eq!(out.unwrap(), None);

        let payload = quietly(|| latch.rethrow()).unwrap_err();
        assert_eq!(panic_message(payload), "worker failed");
    }

    #[cfg(feature = "tasks")]
    #[test]
    fn test_settle_after_failure() {
        let tally = Tally::new(3);
        let drained = quietly(|| {
            current_thread().block_on(async {
                tally.run_async(async { failing_worker() }).await;
                tally.wait_async().await
            })
        })
        .unwrap();
        assert_eq!(drained, 0);

        tally.run(|| ());
        tally.run(|| ());
        current_thread().block_on(tally.settle_async(drained));
        assert_eq!(tally.pending(), 0);
    }
}
