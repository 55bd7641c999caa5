//! Once-per-episode warning latch.

/// Rate limiter for warnings emitted from a hot loop.
///
/// [`trip`](WarnLatch::trip) returns `true` only on the first call of an
/// episode; later calls return `false` until [`reset`](WarnLatch::reset)
/// closes the episode. Loops reset the latch after one fully nominal
/// cycle, so sustained trouble produces one message.
#[derive(Debug, Clone, Default)]
pub struct WarnLatch {
    tripped: bool,
    episodes: u64,
}

impl WarnLatch {
    /// Open latch.
    pub const fn new() -> Self {
        Self {
            tripped: false,
            episodes: 0,
        }
    }

    /// Record an occurrence; `true` when a warning should be emitted.
    #[inline]
    pub fn trip(&mut self) -> bool {
        if self.tripped {
            return false;
        }
        self.tripped = true;
        self.episodes += 1;
        true
    }

    /// Close the current episode.
    #[inline]
    pub fn reset(&mut self) {
        self.tripped = false;
    }

    /// True while an episode is open.
    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Number of episodes opened so far.
    #[inline]
    pub fn episodes(&self) -> u64 {
        self.episodes
    }
}
