use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A point in time measured from a clock's arbitrary epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Self = Self(Duration::ZERO);

    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(d)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Whole milliseconds elapsed since `earlier`. Saturates at 0 when `earlier` is later.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        let ms = self.0.saturating_sub(earlier.0).as_millis();
        u64::try_from(ms).unwrap_or(u64::MAX)
    }

    /// Time elapsed since `earlier`, zero when `earlier` is later.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

/// Abstraction over time sources.
/// Implementations: SystemClock (production), ManualClock (testing).
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock using std::time::Instant.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.start.elapsed())
    }
}

/// Manually driven clock for deterministic testing.
///
/// Shared between threads, so the current time lives in an atomic.
#[derive(Debug, Default)]
pub struct ManualClock {
    current_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_millis(&self, ms: u64) {
        self.current_us.store(ms * 1000, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, ms: u64) {
        self.current_us.fetch_add(ms * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(Duration::from_micros(self.current_us.load(Ordering::SeqCst)))
    }
}
