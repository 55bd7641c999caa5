//! DataValue: a variant with its status and timestamps.

use serde::Serialize;

use super::date_time::DateTime;
use super::status::StatusCode;
use super::variant::{BuiltinType, ValueRank, Variant, VariantError};

/// Declared type of a cache entry or DataSet field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FieldType {
    /// Built-in type of the value (element type for arrays).
    pub builtin: BuiltinType,
    /// Array rank.
    pub rank: ValueRank,
}

impl FieldType {
    /// Scalar field type.
    pub const fn scalar(builtin: BuiltinType) -> Self {
        Self {
            builtin,
            rank: ValueRank::Scalar,
        }
    }

    /// Build from a built-in type and an OPC UA value rank.
    pub fn from_value_rank(builtin: BuiltinType, value_rank: i32) -> Result<Self, VariantError> {
        Ok(Self {
            builtin,
            rank: ValueRank::from_value_rank(value_rank)?,
        })
    }

    /// True when `value` carries this type and rank.
    ///
    /// An empty variant matches every field type.
    pub fn matches(&self, value: &Variant) -> bool {
        match (value.builtin_type(), value.value_rank()) {
            (Some(builtin), Some(rank)) => builtin == self.builtin && rank == self.rank,
            _ => true,
        }
    }
}

/// Value with status code and optional timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DataValue {
    /// Payload.
    pub value: Variant,
    /// Quality of the payload.
    pub status: StatusCode,
    /// Time the value was produced at its source.
    pub source_timestamp: Option<DateTime>,
    /// Time the value was stored locally.
    pub server_timestamp: Option<DateTime>,
}

impl DataValue {
    /// Good-status value without timestamps.
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Default value for a field type, stamped with the current time.
    pub fn default_for(ty: FieldType) -> Self {
        let now = DateTime::now();
        Self {
            value: Variant::default_for(ty.builtin, ty.rank),
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// Replace the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Replace the source timestamp.
    pub fn with_source_timestamp(mut self, ts: DateTime) -> Self {
        self.source_timestamp = Some(ts);
        self
    }
}
