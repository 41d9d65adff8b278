//! Wall clocks and keyed one-shot timers for Quorum.
//!
//! The game engine never reads the system time directly and never sleeps.
//! Instead each game manager owns a [`TimerWheel`] and is handed a
//! [`Clock`] at construction:
//!
//! - [`SystemClock`] reads `Utc::now()`.
//! - [`TokioClock`] anchors a wall time to tokio's monotonic clock, so it
//!   follows virtual time under `tokio::time::pause()`.
//! - [`ManualClock`] is moved by hand, for deterministic unit tests.
//!
//! # Integration
//!
//! The wheel only stores deadlines. Whoever drives the engine asks for the
//! earliest deadline, sleeps until then, and pops what is due:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = sleep_until_deadline(venue.next_deadline(), &*clock) => {
//!             venue.fire_due();
//!         }
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, Instant as TokioInstant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// A clock handle that can be shared between a manager, the roster, and
/// the driver loop.
pub type SharedClock = Arc<dyn Clock>;

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock that advances with tokio's monotonic clock.
///
/// The wall time is sampled once at construction; after that `now()` is
/// `origin + elapsed`, where `elapsed` comes from `tokio::time::Instant`.
/// When a test pauses tokio time, this clock pauses with it, which is what
/// lets the venue actor's timer loop be tested without real waiting.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin_wall: DateTime<Utc>,
    origin: TokioInstant,
}

impl TokioClock {
    /// Anchors the clock at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchors the clock at an arbitrary wall time.
    pub fn starting_at(origin_wall: DateTime<Utc>) -> Self {
        Self {
            origin_wall,
            origin: TokioInstant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TokioInstant::now().saturating_duration_since(self.origin);
        self.origin_wall
            + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero())
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle
/// and give another to the code under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Jumps to `t`. Moving backwards is allowed.
    pub fn set(&self, t: DateTime<Utc>) {
        self.millis.store(t.timestamp_millis(), Ordering::SeqCst);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// TimerWheel
// ---------------------------------------------------------------------------

/// A set of named one-shot timers.
///
/// Each key is armed at most once: scheduling an armed key moves its
/// deadline. Firing is pull-based through [`pop_due`](Self::pop_due); a
/// popped key is disarmed before it is returned, so a caller that checks
/// [`is_scheduled`](Self::is_scheduled) before acting can never act twice
/// on one firing, and a key cancelled before the pop never comes out.
///
/// Timers with the same deadline pop in the order they were armed.
pub struct TimerWheel<K> {
    /// Deadline-ordered queue. The `u64` is an arming sequence number that
    /// keeps equal deadlines distinct and FIFO.
    queue: BTreeMap<(DateTime<Utc>, u64), K>,

    /// Reverse index from key to its queue entry.
    armed: HashMap<K, (DateTime<Utc>, u64)>,

    next_seq: u64,
}

impl<K> TimerWheel<K>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    /// Creates an empty wheel.
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            armed: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Arms `key` to fire at `at`, replacing any earlier arming of the
    /// same key.
    pub fn schedule_at(&mut self, key: K, at: DateTime<Utc>) {
        self.cancel(&key);
        let entry = (at, self.next_seq);
        self.next_seq += 1;
        trace!(?key, %at, "timer armed");
        self.queue.insert(entry, key.clone());
        self.armed.insert(key, entry);
    }

    /// Disarms `key`. Returns `true` if it was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.armed.remove(key) {
            Some(entry) => {
                self.queue.remove(&entry);
                trace!(?key, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether `key` is currently armed.
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    /// When `key` will fire, if it is armed.
    pub fn deadline(&self, key: &K) -> Option<DateTime<Utc>> {
        self.armed.get(key).map(|(at, _)| *at)
    }

    /// The earliest armed deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Disarms and returns every key whose deadline is at or before `now`,
    /// earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<K> {
        let mut due = Vec::new();
        while let Some((&(at, _), _)) = self.queue.first_key_value() {
            if at > now {
                break;
            }
            if let Some((_, key)) = self.queue.pop_first() {
                self.armed.remove(&key);
                trace!(?key, %at, "timer due");
                due.push(key);
            }
        }
        due
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// `true` if nothing is armed.
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl<K> Default for TimerWheel<K>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug> fmt::Debug for TimerWheel<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.queue.iter().map(|((at, _), key)| (key, at)))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Driver helper
// ---------------------------------------------------------------------------

/// Sleeps until `deadline` as measured by `clock`.
///
/// With no deadline this future pends forever, so it can sit in a
/// `tokio::select!` next to a command channel without busy-looping. A
/// deadline already in the past resolves immediately.
pub async fn sleep_until_deadline(deadline: Option<DateTime<Utc>>, clock: &dyn Clock) {
    let Some(deadline) = deadline else {
        std::future::pending::<()>().await;
        return;
    };
    let wait = (deadline - clock.now()).to_std().unwrap_or(Duration::ZERO);
    time::sleep(wait).await;
}
