//! Loop statistics, returned when a loop is joined.

/// O(1) per-cycle timing statistics.
///
/// Updated every cycle without allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    /// Cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [µs].
    pub last_cycle_us: u64,
    /// Minimum cycle duration [µs].
    pub min_cycle_us: u64,
    /// Maximum cycle duration [µs].
    pub max_cycle_us: u64,
    /// Running sum for the average.
    pub sum_cycle_us: u64,
    /// Maximum wake-up latency [µs] (actual minus scheduled start).
    pub max_latency_us: u64,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStats {
    /// Zeroed statistics.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_us: 0,
            min_cycle_us: u64::MAX,
            max_cycle_us: 0,
            sum_cycle_us: 0,
            max_latency_us: 0,
        }
    }

    /// Record one cycle.
    #[inline]
    pub fn record(&mut self, duration_us: u64, latency_us: u64) {
        self.cycle_count += 1;
        self.last_cycle_us = duration_us;
        self.min_cycle_us = self.min_cycle_us.min(duration_us);
        self.max_cycle_us = self.max_cycle_us.max(duration_us);
        self.sum_cycle_us = self.sum_cycle_us.saturating_add(duration_us);
        self.max_latency_us = self.max_latency_us.max(latency_us);
    }

    /// Average cycle duration [µs], 0 before the first cycle.
    #[inline]
    pub fn avg_cycle_us(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_us / self.cycle_count
        }
    }
}

/// Publisher loop counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Cycle timing.
    pub cycles: CycleStats,
    /// Cycles whose next deadline had already passed.
    pub overruns: u64,
    /// Overrun warnings actually logged.
    pub overrun_warnings: u64,
    /// Datagrams handed to the transport.
    pub sent: u64,
    /// Failed sends.
    pub send_failures: u64,
}

/// Subscriber loop counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Iterations executed.
    pub iterations: u64,
    /// Iterations without a datagram.
    pub idle: u64,
    /// Datagrams received.
    pub frames: u64,
    /// Datagrams dropped (truncated or malformed).
    pub discarded: u64,
    /// Values written to the cache.
    pub values_written: u64,
    /// Values for keys outside the cache, or with the wrong type.
    pub values_refused: u64,
    /// Decoded items no reader or cache key claimed.
    pub values_ignored: u64,
    /// Late-reception warnings logged.
    pub late_warnings: u64,
    /// Receive errors reported by the transport.
    pub receive_errors: u64,
}
