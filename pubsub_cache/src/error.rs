//! Error types for cache construction and writes.

use pubsub_common::config::ConfigError;
use pubsub_common::types::{BuiltinType, FieldType, NodeId, ValueRank};
use thiserror::Error;

/// Errors raised while building the cache. All of them abort startup.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The configuration could not be turned into a key space.
    #[error("Invalid cache configuration: {0}")]
    Config(#[from] ConfigError),

    /// Same NodeId registered twice with different types.
    #[error("Conflicting types for {node_id}: {first:?} vs {second:?}")]
    ConflictingType {
        /// Key registered twice.
        node_id: NodeId,
        /// Type registered first.
        first: FieldType,
        /// Type of the later registration.
        second: FieldType,
    },

    /// Memory for the key space could not be reserved.
    #[error("Cache capacity exhausted reserving {requested} entries")]
    CapacityExhausted {
        /// Number of entries requested.
        requested: usize,
    },
}

/// Why a write was refused. The cache is left unchanged in both cases.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    /// Key was not registered at initialization.
    #[error("{0} is not registered in the cache")]
    UnknownKey(NodeId),

    /// Value type or rank differs from the declared one.
    #[error("{node_id} expects {expected:?}/{expected_rank:?}, got {found:?}/{found_rank:?}")]
    TypeMismatch {
        /// Target key.
        node_id: NodeId,
        /// Declared type.
        expected: BuiltinType,
        /// Declared rank.
        expected_rank: ValueRank,
        /// Type of the rejected value.
        found: Option<BuiltinType>,
        /// Rank of the rejected value.
        found_rank: Option<ValueRank>,
    },
}

/// Result type for cache construction.
pub type CacheResult<T> = Result<T, CacheError>;
