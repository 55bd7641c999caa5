//! Runtime error types.

use pubsub_cache::CacheError;
use pubsub_common::config::ConfigError;
use pubsub_common::types::NodeId;
use pubsub_message::NetworkMessageError;
use pubsub_transport::TransportError;
use thiserror::Error;

use crate::rt::RtStep;

/// Thread management failures shared by both loops.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Cannot spawn loop thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("RT setup of loop '{loop_name}' failed at {step}: {source}")]
    RtSetup {
        loop_name: String,
        step: RtStep,
        #[source]
        source: std::io::Error,
    },

    #[error("Loop '{0}' was already started")]
    AlreadyStarted(String),

    #[error("Loop '{0}' was already joined")]
    AlreadyJoined(String),

    #[error("Loop '{0}' panicked")]
    Panicked(String),
}

/// Publisher failures.
///
/// Everything except [`PublisherError::Transport`] at construction is a
/// configuration problem: the loop stops and the error reaches whoever
/// joins it. Send failures inside the loop are logged, never returned.
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Invalid publisher configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Published field {0} is not in the cache")]
    UnknownField(NodeId),

    #[error("Encoding failed: {0}")]
    Encode(#[from] NetworkMessageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Loop(#[from] LoopError),
}

/// Subscriber failures. Only construction and thread management can fail;
/// receive and decode problems are handled inside the loop.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("Invalid subscriber configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Reader field {0} is not in the cache")]
    UnknownField(NodeId),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Loop(#[from] LoopError),
}

/// Errors surfaced by [`crate::PubSubRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Publisher '{name}': {source}")]
    Publisher {
        name: String,
        #[source]
        source: PublisherError,
    },

    #[error("Subscriber '{name}': {source}")]
    Subscriber {
        name: String,
        #[source]
        source: SubscriberError,
    },

    #[error("Runtime is already started")]
    AlreadyStarted,

    #[error("Expected {expected} {kind} transports, got {actual}")]
    TransportCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}
