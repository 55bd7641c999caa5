//! System-wide constants for the PubSub workspace.
//!
//! Single source of truth for numeric limits and defaults. Imported by all
//! crates — no duplication permitted.

/// Default maximum encoded NetworkMessage size in bytes (one Ethernet MTU).
///
/// Shared ceiling between the publisher encoder and the subscriber receive
/// buffer allocation.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1500;

/// Smallest accepted `max_message_size`.
pub const MIN_MESSAGE_SIZE: usize = 64;

/// Largest accepted `max_message_size` (maximum UDP payload over IPv4).
pub const MAX_MESSAGE_SIZE: usize = 65_507;

/// Default publisher cycle period in microseconds (1 kHz).
pub const DEFAULT_PERIOD_US: u64 = 1000;

/// Default subscriber retry increment when no datagram is available [µs].
pub const DEFAULT_WAIT_INCREMENT_US: u64 = 1000;

/// Default expected-arrival window before a "late reception" warning [µs].
pub const DEFAULT_LATE_AFTER_US: u64 = 100_000;

/// Namespace index used to map gateway names onto String NodeIds.
pub const DEFAULT_TEXT_NAMESPACE: u16 = 1;

/// Maximum number of `Name:Value` pairs accepted in one gateway datagram.
pub const MAX_TEXT_FIELDS: usize = 64;

/// Highest supported value rank (matrix).
pub const MAX_VALUE_RANK: i32 = 2;

/// Cycles between periodic DEBUG statistics reports.
pub const STATS_REPORT_INTERVAL: u64 = 1000;

/// CPU cache line size in bytes.
///
/// Used to pad flags shared between loop threads and their controller.
pub const CACHE_LINE_SIZE: usize = 64;
