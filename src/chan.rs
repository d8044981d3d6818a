//! Channel flavors under test
//!
//! Every flavor exposes the same shape: an MPMC channel of `bool` tokens with
//! a configurable [`Capacity`], usable from OS threads ([`SyncPipe`]) and,
//! with the `tasks` feature, from async tasks ([`AsyncPipe`]).
//!
//! The benchmarks are generic over the pipe so that flavor dispatch happens
//! once per run and never inside the send/receive loop.

use std::{fmt, str::FromStr};

use crate::error::ConfigError;

#[cfg(feature = "tasks")]
pub use r#async::AsyncPipe;

const DISCONNECTED: &str = "channel disconnected while workers were running";

/// Buffer capacity of the channel under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capacity {
    /// `Bounded(0)` is a rendezvous: each send waits for its matching receive.
    Bounded(usize),
    /// The sender never blocks.
    Unbounded,
}

impl Capacity {
    pub const RENDEZVOUS: Self = Self::Bounded(0);
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(c) => write!(f, "{c}"),
            Self::Unbounded => f.write_str("N"),
        }
    }
}

impl FromStr for Capacity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "N" | "n" | "unbounded" => Ok(Self::Unbounded),
            other => other
                .parse()
                .map(Self::Bounded)
                .map_err(|_| ConfigError::InvalidCapacity(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Flavor {
    #[default]
    Flume,
    Kanal,
}

/// Blocking endpoints, driven from OS threads.
pub trait SyncPipe: Send + Sync + 'static {
    type Tx: Clone + Send + 'static;
    type Rx: Clone + Send + 'static;

    fn pair(capacity: Capacity) -> (Self::Tx, Self::Rx);

    /// Blocks while the buffer is full (or, for a rendezvous, until a receiver takes the token).
    fn send(tx: &Self::Tx, token: bool);

    fn recv(rx: &Self::Rx) -> bool;

    /// Tokens still buffered in the channel.
    fn len(rx: &Self::Rx) -> usize;
}

pub struct Flume;

pub struct Kanal;

impl SyncPipe for Flume {
    type Tx = flume::Sender<bool>;
    type Rx = flume::Receiver<bool>;

    fn pair(capacity: Capacity) -> (Self::Tx, Self::Rx) {
        match capacity {
            Capacity::Bounded(c) => flume::bounded(c),
            Capacity::Unbounded => flume::unbounded(),
        }
    }

    #[inline]
    fn send(tx: &Self::Tx, token: bool) {
        tx.send(token).expect(DISCONNECTED);
    }

    #[inline]
    fn recv(rx: &Self::Rx) -> bool {
        rx.recv().expect(DISCONNECTED)
    }

    fn len(rx: &Self::Rx) -> usize {
        rx.len()
    }
}

impl SyncPipe for Kanal {
    type Tx = kanal::Sender<bool>;
    type Rx = kanal::Receiver<bool>;

    fn pair(capacity: Capacity) -> (Self::Tx, Self::Rx) {
        match capacity {
            Capacity::Bounded(c) => kanal::bounded(c),
            Capacity::Unbounded => kanal::unbounded(),
        }
    }

    #[inline]
    fn send(tx: &Self::Tx, token: bool) {
        tx.send(token).expect(DISCONNECTED);
    }

    #[inline]
    fn recv(rx: &Self::Rx) -> bool {
        rx.recv().expect(DISCONNECTED)
    }

    fn len(rx: &Self::Rx) -> usize {
        rx.len()
    }
}

#[cfg(feature = "tasks")]
mod r#async {
    use super::*;

    /// Async endpoints, driven from runtime tasks. A full (or rendezvous)
    /// send suspends the task instead of blocking the worker thread.
    pub trait AsyncPipe: Send + Sync + 'static {
        type Tx: Clone + Send + Sync + 'static;
        type Rx: Clone + Send + Sync + 'static;

        fn pair(capacity: Capacity) -> (Self::Tx, Self::Rx);

        fn send(tx: &Self::Tx, token: bool) -> impl Future<Output = ()> + Send;

        fn recv(rx: &Self::Rx) -> impl Future<Output = bool> + Send;

        fn len(rx: &Self::Rx) -> usize;
    }

    impl AsyncPipe for Flume {
        type Tx = flume::Sender<bool>;
        type Rx = flume::Receiver<bool>;

        fn pair(capacity: Capacity) -> (Self::Tx, Self::Rx) {
            <Flume as SyncPipe>::pair(capacity)
        }

        fn send(tx: &Self::Tx, token: bool) -> impl Future<Output = ()> + Send {
            async move { tx.send_async(token).await.expect(DISCONNECTED) }
        }

        fn recv(rx: &Self::Rx) -> impl Future<Output = bool> + Send {
            async move { rx.recv_async().await.expect(DISCONNECTED) }
        }

        fn len(rx: &Self::Rx) -> usize {
            rx.len()
        }
    }

    impl AsyncPipe for Kanal {
        type Tx = kanal::AsyncSender<bool>;
        type Rx = kanal::AsyncReceiver<bool>;

        fn pair(capacity: Capacity) -> (Self::Tx, Self::Rx) {
            match capacity {
                Capacity::Bounded(c) => kanal::bounded_async(c),
                Capacity::Unbounded => kanal::unbounded_async(),
            }
        }

        fn send(tx: &Self::Tx, token: bool) -> impl Future<Output = ()> + Send {
            async move { tx.send(token).await.expect(DISCONNECTED) }
        }

        fn recv(rx: &Self::Rx) -> impl Future<Output = bool> + Send {
            async move { rx.recv().await.expect(DISCONNECTED) }
        }

        fn len(rx: &Self::Rx) -> usize {
            rx.len()
        }
    }
}

#[cfg(test)]
mod chan_test {
    use super::*;
    use crossbeam_utils::thread::scope;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    #[test]
    fn test_capacity_parse() {
        assert_eq!("0".parse::<Capacity>().unwrap(), Capacity::RENDEZVOUS);
        assert_eq!(" 1 ".parse::<Capacity>().unwrap(), Capacity::Bounded(1));
        assert_eq!("10000".parse::<Capacity>().unwrap(), Capacity::Bounded(10000));
        assert_eq!("N".parse::<Capacity>().unwrap(), Capacity::Unbounded);
        assert_eq!("unbounded".parse::<Capacity>().unwrap(), Capacity::Unbounded);
        assert_eq!(
            "-1".parse::<Capacity>(),
            Err(ConfigError::InvalidCapacity("-1".into()))
        );
    }

    #[test]
    fn test_capacity_label() {
        assert_eq!(Capacity::RENDEZVOUS.to_string(), "0");
        assert_eq!(Capacity::Bounded(1).to_string(), "1");
        assert_eq!(Capacity::Unbounded.to_string(), "N");
        assert_eq!(Capacity::Bounded(0), Capacity::RENDEZVOUS);
    }

    /// A rendezvous sender can never run ahead of the receiver
    fn rendezvous_holds_sender<P: SyncPipe>() {
        const ROUNDS: usize = 10;
        let (tx, rx) = P::pair(Capacity::RENDEZVOUS);
        let sent = AtomicUsize::new(0);

        scope(|s| {
            let sent = &sent;
            s.spawn(move |_| {
                for _ in 0..ROUNDS {
                    P::send(&tx, true);
                    sent.fetch_add(1, Ordering::SeqCst);
                }
            });

            // nobody is receiving yet
            thread::sleep(Duration::from_millis(20));
            assert_eq!(sent.load(Ordering::SeqCst), 0);

            for received in 1..=ROUNDS {
                assert!(P::recv(&rx));
                assert!(sent.load(Ordering::SeqCst) <= received);
            }
        })
        .unwrap();

        assert_eq!(sent.load(Ordering::SeqCst), ROUNDS);
    }

    /// A single-slot buffer lets the sender run exactly one token ahead
    fn single_slot_runs_one_ahead<P: SyncPipe>() {
        let (tx, rx) = P::pair(Capacity::Bounded(1));
        let sent = AtomicUsize::new(0);

        scope(|s| {
            let sent = &sent;
            s.spawn(move |_| {
                for _ in 0..2 {
                    P::send(&tx, true);
                    sent.fetch_add(1, Ordering::SeqCst);
                }
            });

            thread::sleep(Duration::from_millis(20));
            assert!(sent.load(Ordering::SeqCst) <= 1);
            assert!(P::recv(&rx));
            assert!(P::recv(&rx));
        })
        .unwrap();
    }

    #[test]
    fn test_flume_rendezvous() {
        rendezvous_holds_sender::<Flume>();
    }

    #[test]
    fn test_kanal_rendezvous() {
        rendezvous_holds_sender::<Kanal>();
    }

    #[test]
    fn test_flume_single_slot() {
        single_slot_runs_one_ahead::<Flume>();
    }

    #[test]
    fn test_kanal_single_slot() {
        single_slot_runs_one_ahead::<Kanal>();
    }

    #[test]
    fn test_unbounded_never_blocks() {
        let (tx, rx) = <Flume as SyncPipe>::pair(Capacity::Unbounded);
        for _ in 0..1000 {
            <Flume as SyncPipe>::send(&tx, true);
        }
        assert_eq!(<Flume as SyncPipe>::len(&rx), 1000);

        let (tx, rx) = <Kanal as SyncPipe>::pair(Capacity::Unbounded);
        for _ in 0..1000 {
            <Kanal as SyncPipe>::send(&tx, true);
        }
        assert_eq!(<Kanal as SyncPipe>::len(&rx), 1000);
    }

    #[cfg(feature = "tasks")]
    #[tokio::test]
    async fn test_async_rendezvous_round_trips() {
        async fn round_trips<P: AsyncPipe>() -> usize {
            let (tx, rx) = P::pair(Capacity::RENDEZVOUS);
            let producer = tokio::spawn(async move {
                for _ in 0..10 {
                    P::send(&tx, true).await;
                }
            });
            let mut received = 0;
            for _ in 0..10 {
                received += usize::from(P::recv(&rx).await);
            }
            producer.await.unwrap();
            received
        }

        assert_eq!(round_trips::<Flume>().await, 10);
        assert_eq!(round_trips::<Kanal>().await, 10);
    }
}
