//! PubSub identifiers and DataSetMessage content masks.
//!
//! Shared by the configuration layer and the NetworkMessage codec.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Publisher identifier carried in the NetworkMessage header.
///
/// Numeric identifiers compare by value regardless of their encoded width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublisherId {
    Byte(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    String(String),
}

impl PublisherId {
    /// Numeric value, `None` for string ids.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Byte(v) => Some(u64::from(*v)),
            Self::UInt16(v) => Some(u64::from(*v)),
            Self::UInt32(v) => Some(u64::from(*v)),
            Self::UInt64(v) => Some(*v),
            Self::String(_) => None,
        }
    }

    /// Same publisher, ignoring numeric width.
    pub fn matches(&self, other: &PublisherId) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            (a, b) => a.as_u64().is_some() && a.as_u64() == b.as_u64(),
        }
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.as_u64().unwrap_or_default()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPublisherId {
    Numeric(u64),
    String(String),
}

impl Serialize for PublisherId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => RawPublisherId::String(s.clone()).serialize(serializer),
            other => RawPublisherId::Numeric(other.as_u64().unwrap_or_default()).serialize(serializer),
        }
    }
}

// Integers from configuration are carried as UInt64 on the wire.
impl<'de> Deserialize<'de> for PublisherId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawPublisherId::deserialize(deserializer)? {
            RawPublisherId::Numeric(v) => Self::UInt64(v),
            RawPublisherId::String(s) => Self::String(s),
        })
    }
}

bitflags! {
    /// Optional DataSetMessage header fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContentFlags: u8 {
        /// 16-bit sequence number.
        const SEQUENCE_NUMBER = 0x01;
        /// Status (high word of the StatusCode).
        const STATUS          = 0x02;
        /// DateTime timestamp.
        const TIMESTAMP       = 0x04;
        /// Picoseconds refinement of the timestamp.
        const PICOSECONDS     = 0x08;
    }
}

/// How DataSet fields are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEncoding {
    /// Each field is a Variant.
    #[default]
    Variant,
    /// Each field is a DataValue (value + status + timestamps).
    DataValue,
}

/// DataSetMessage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSetMessageType {
    /// All fields present.
    #[default]
    KeyFrame,
    /// No fields; signals the writer is alive.
    KeepAlive,
}

/// Per-DataSetMessage content mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataSetContentMask {
    /// Optional header fields.
    pub flags: ContentFlags,
    /// Field encoding.
    pub field_encoding: FieldEncoding,
    /// Message kind.
    pub message_type: DataSetMessageType,
}

impl DataSetContentMask {
    /// Key frame, Variant encoding, with the given optional fields.
    pub const fn key_frame(flags: ContentFlags) -> Self {
        Self {
            flags,
            field_encoding: FieldEncoding::Variant,
            message_type: DataSetMessageType::KeyFrame,
        }
    }

    /// Whether a flag is set.
    #[inline]
    pub fn has(&self, flag: ContentFlags) -> bool {
        self.flags.contains(flag)
    }
}
