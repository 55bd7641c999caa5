//! PubSub connection configuration and wire-level identifiers.

pub mod config;
pub mod types;
