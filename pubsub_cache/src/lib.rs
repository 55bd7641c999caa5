//! PubSub cache.
//!
//! The single shared-state boundary between the network loops and the rest
//! of the process: a closed key space of NodeIds, each holding one
//! [`DataValue`](pubsub_common::types::DataValue) guarded by one mutex.
//!
//! ```rust
//! use pubsub_cache::Cache;
//! use pubsub_common::types::{BuiltinType, DataValue, FieldType, NodeId};
//!
//! let counter = NodeId::string(1, "Counter");
//! let cache = Cache::from_fields([(counter.clone(), FieldType::scalar(BuiltinType::UInt32))])?;
//! assert!(cache.set(&counter, DataValue::new(7u32)));
//! assert_eq!(cache.get(&counter).map(|dv| dv.value), Some(7u32.into()));
//! # Ok::<(), pubsub_cache::CacheError>(())
//! ```

pub mod cache;
pub mod error;

pub use cache::{Cache, CacheGuard};
pub use error::{CacheError, CacheResult, SetError};
