//! Prelude module for common re-exports.
//!
//! ```rust
//! use pubsub_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::pubsub::config::{
    DataSetConfig, Encoding, FieldConfig, PubSubConfig, PublisherConfig, ReaderConfig,
    SubscriberConfig,
};

// ─── Clock ──────────────────────────────────────────────────────────
pub use crate::clock::{Clock, Deadline, ManualClock, MonotonicClock, SleepOutcome};

// ─── Value model ────────────────────────────────────────────────────
pub use crate::pubsub::types::{
    ContentFlags, DataSetContentMask, DataSetMessageType, FieldEncoding, PublisherId,
};
pub use crate::types::{
    BuiltinType, DataValue, DateTime, FieldType, NodeId, Scalar, StatusCode, ValueRank, Variant,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PERIOD_US};
