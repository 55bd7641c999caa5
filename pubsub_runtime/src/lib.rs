//! # PubSub Runtime
//!
//! Periodic publisher and event-driven subscriber loops around one shared
//! [`pubsub_cache::Cache`].
//!
//! # Module Structure
//!
//! - [`runtime`] - `PubSubRuntime`: initialize, start, stop
//! - [`publisher`] - fixed-period cache-to-wire loop
//! - [`subscriber`] - polling wire-to-cache loop
//! - [`decoder`] - datagram decoders (UADP, text gateway)
//! - [`state`] - loop lifecycle and thread ownership
//! - [`rt`] - memory locking, CPU pinning, SCHED_FIFO
//! - [`stats`] - cycle statistics
//! - [`latch`] - once-per-episode warnings
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  lock   ┌─────────┐  lock   ┌───────────────┐
//! │ Publisher(s) │◄───────►│  Cache  │◄───────►│ Subscriber(s) │
//! └──────┬───────┘         └─────────┘         └───────▲───────┘
//!        │ SendTransport                 ReceiveTransport│
//!        ▼                                               │
//!   ─────────────────────── network ─────────────────────
//! ```

#![warn(missing_docs)]

pub mod decoder;
pub mod error;
pub mod latch;
pub mod publisher;
pub mod rt;
pub mod runtime;
pub mod state;
pub mod stats;
pub mod subscriber;

pub use decoder::{FrameDecoder, TextDecoder, UadpDecoder};
pub use error::{LoopError, PublisherError, RuntimeError, SubscriberError};
pub use publisher::{CycleOutcome, Publisher, PublisherLoop};
pub use rt::{RtReport, RtStep};
pub use runtime::{LoopReport, PubSubRuntime, RuntimeReport};
pub use state::{LoopControl, LoopHandle, LoopState};
pub use stats::{CycleStats, PublisherStats, SubscriberStats};
pub use subscriber::{PollOutcome, Subscriber, SubscriberLoop};
