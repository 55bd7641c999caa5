//! Deadline clock for absolute-deadline scheduling.
//!
//! A [`Deadline`] is a point on a monotonic time line, in microseconds. It
//! is never wall-clock time and is unaffected by `settimeofday`. Loops keep
//! their schedule by advancing a deadline (`next += period`) instead of
//! re-reading `now`, so processing jitter does not accumulate.
//!
//! [`MonotonicClock`] reads `CLOCK_MONOTONIC` and sleeps with
//! `clock_nanosleep(TIMER_ABSTIME)`. [`ManualClock`] is a deterministic
//! clock that only moves when told to.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::error;

/// Monotonic time point in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Deadline {
    micros: u64,
}

impl Deadline {
    /// Origin of the time line.
    pub const ZERO: Self = Self { micros: 0 };

    /// Point at `micros` since the clock origin.
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// Microseconds since the clock origin.
    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.micros
    }

    /// Nanoseconds since the clock origin.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.micros.saturating_mul(1000)
    }

    /// Advance this point by `micros`.
    #[inline]
    pub fn add_duration(&mut self, micros: u64) {
        self.micros = self.micros.saturating_add(micros);
    }

    /// Copy of this point advanced by `micros`.
    #[inline]
    pub const fn after(self, micros: u64) -> Self {
        Self {
            micros: self.micros.saturating_add(micros),
        }
    }

    /// True iff this point is at or before `now`.
    #[inline]
    pub fn is_expired(&self, now: Deadline) -> bool {
        self.micros <= now.micros
    }

    /// Microseconds from `earlier` to `self`, zero if `earlier` is later.
    #[inline]
    pub const fn micros_since(self, earlier: Deadline) -> u64 {
        self.micros.saturating_sub(earlier.micros)
    }
}

/// Result of [`Clock::sleep_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The thread was suspended until the deadline.
    Slept,
    /// The deadline had already passed; the thread yielded once.
    AlreadyPast,
}

/// Monotonic time source used by the publisher and subscriber loops.
pub trait Clock: Send + Sync + 'static {
    /// Current point.
    fn now(&self) -> Deadline;

    /// Suspend the calling thread until `deadline`.
    ///
    /// Returns [`SleepOutcome::AlreadyPast`] without sleeping when the
    /// deadline is not in the future. Whether that warrants a warning is up
    /// to the caller.
    fn sleep_until(&self, deadline: Deadline) -> SleepOutcome;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Deadline {
        (**self).now()
    }

    fn sleep_until(&self, deadline: Deadline) -> SleepOutcome {
        (**self).sleep_until(deadline)
    }
}

/// Last good monotonic reading, held when the clock cannot be read.
#[derive(Debug)]
struct LastReading {
    micros: AtomicU64,
    failed: AtomicBool,
}

impl LastReading {
    const fn new() -> Self {
        Self {
            micros: AtomicU64::new(0),
            failed: AtomicBool::new(false),
        }
    }

    /// Record a reading and return it, or return the last good one.
    ///
    /// The first failure is logged; later failures are silent.
    fn observe<E: std::fmt::Display>(&self, reading: Result<u64, E>) -> u64 {
        match reading {
            Ok(micros) => {
                let previous = self.micros.fetch_max(micros, Ordering::Relaxed);
                previous.max(micros)
            }
            Err(e) => {
                if !self.failed.swap(true, Ordering::Relaxed) {
                    error!(error = %e, "CLOCK_MONOTONIC read failed, holding last reading");
                }
                self.micros.load(Ordering::Relaxed)
            }
        }
    }
}

static LAST_MONOTONIC: LastReading = LastReading::new();

/// `CLOCK_MONOTONIC` clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    /// Create a monotonic clock handle.
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Deadline {
        use nix::time::{ClockId, clock_gettime};

        let reading = clock_gettime(ClockId::CLOCK_MONOTONIC).map(|ts| {
            (ts.tv_sec() as u64)
                .saturating_mul(1_000_000)
                .saturating_add(ts.tv_nsec() as u64 / 1000)
        });
        Deadline::from_micros(LAST_MONOTONIC.observe(reading))
    }

    fn sleep_until(&self, deadline: Deadline) -> SleepOutcome {
        if deadline.is_expired(self.now()) {
            std::thread::yield_now();
            return SleepOutcome::AlreadyPast;
        }
        sleep_absolute(deadline, self);
        SleepOutcome::Slept
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn sleep_absolute(deadline: Deadline, _clock: &MonotonicClock) {
    use nix::errno::Errno;
    use nix::sys::time::TimeSpec;
    use nix::time::{ClockId, ClockNanosleepFlags, clock_nanosleep};

    let micros = deadline.as_micros();
    let target = TimeSpec::new(
        (micros / 1_000_000) as _,
        ((micros % 1_000_000) * 1000) as _,
    );
    // Restart on EINTR; the target is absolute so no time is lost.
    while let Err(Errno::EINTR) =
        clock_nanosleep(ClockId::CLOCK_MONOTONIC, ClockNanosleepFlags::TIMER_ABSTIME, &target)
    {}
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn sleep_absolute(deadline: Deadline, clock: &MonotonicClock) {
    let remaining = deadline.micros_since(clock.now());
    std::thread::sleep(std::time::Duration::from_micros(remaining));
}

/// Deterministic clock driven by the caller.
///
/// `sleep_until` jumps straight to the deadline instead of blocking. Clones
/// share the same time line, so a test can keep a handle and advance time
/// while a loop owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at `start_us`.
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: Arc::new(AtomicU64::new(start_us)),
        }
    }

    /// Move time forward by `micros`.
    pub fn advance(&self, micros: u64) {
        self.now_us.fetch_add(micros, Ordering::SeqCst);
    }

    /// Set the current time. Never moves backwards.
    pub fn set(&self, micros: u64) {
        self.now_us.fetch_max(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Deadline {
        Deadline::from_micros(self.now_us.load(Ordering::SeqCst))
    }

    fn sleep_until(&self, deadline: Deadline) -> SleepOutcome {
        if deadline.is_expired(self.now()) {
            return SleepOutcome::AlreadyPast;
        }
        self.set(deadline.as_micros());
        SleepOutcome::Slept
    }
}
