//! OPC UA DateTime: 100 ns ticks since 1601-01-01 UTC.
//!
//! Wall-clock time, used only for DataValue timestamps. Scheduling never
//! uses it (see [`crate::clock`]).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Ticks between 1601-01-01 and 1970-01-01.
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

/// Timestamp in 100 ns ticks since 1601-01-01 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateTime(pub i64);

impl DateTime {
    /// The null DateTime (1601-01-01).
    pub const MIN: Self = Self(0);

    /// Current UTC time.
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => Self(UNIX_EPOCH_TICKS + (since.as_nanos() / 100) as i64),
            Err(_) => Self::MIN,
        }
    }

    /// Raw tick count.
    #[inline]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Milliseconds since the Unix epoch (negative before 1970).
    pub const fn unix_millis(self) -> i64 {
        (self.0 - UNIX_EPOCH_TICKS) / 10_000
    }
}
