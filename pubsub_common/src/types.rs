//! OPC UA value model used by the cache and the message codecs.
//!
//! - [`node_id`] - variable identifiers
//! - [`variant`] - typed scalar / array / matrix values
//! - [`data_value`] - value + status + timestamps
//! - [`status`] - status codes
//! - [`date_time`] - wall-clock timestamps

pub mod data_value;
pub mod date_time;
pub mod node_id;
pub mod status;
pub mod variant;

pub use data_value::{DataValue, FieldType};
pub use date_time::DateTime;
pub use node_id::{NodeId, NodeIdParseError};
pub use status::StatusCode;
pub use variant::{BuiltinType, Scalar, ScalarArray, ScalarMatrix, ValueRank, Variant, VariantError};
