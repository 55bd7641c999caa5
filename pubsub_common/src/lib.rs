//! PubSub Common Library
//!
//! Shared value model, deadline clock, constants and configuration loading
//! for all PubSub workspace crates.
//!
//! # Module Structure
//!
//! - [`types`] - NodeId, Variant, DataValue, StatusCode, DateTime
//! - [`clock`] - monotonic deadlines and sleeping
//! - [`config`] - configuration loading traits and types
//! - [`pubsub`] - connection configuration, publisher ids, content masks
//! - [`consts`] - limits and defaults
//! - [`prelude`] - common re-exports for convenience

pub mod clock;
pub mod config;
pub mod consts;
pub mod prelude;
pub mod pubsub;
pub mod types;
