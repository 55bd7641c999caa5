//! Error types for NetworkMessage encoding and datagram decoding.

use pubsub_common::types::{BuiltinType, VariantError};
use thiserror::Error;

/// Errors raised while building or encoding a NetworkMessage.
///
/// All of them indicate a configuration problem and are fatal to the
/// publisher loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessageError {
    /// A field index was never set before encoding.
    #[error("DataSetMessage {dataset} field {field} is not set")]
    IncompleteMessage {
        /// DataSetMessage index.
        dataset: usize,
        /// Field index.
        field: usize,
    },

    /// Encoded message exceeds the configured maximum size.
    #[error("Encoded message needs {required} bytes, maximum is {max}")]
    BufferTooSmall {
        /// Bytes needed.
        required: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Dataset or field index outside the shape fixed at creation.
    #[error("Index out of range: dataset {dataset}, field {field:?}")]
    IndexOutOfRange {
        /// DataSetMessage index.
        dataset: usize,
        /// Field index, if the error concerns a field.
        field: Option<usize>,
    },

    /// Message shape exceeds what the wire format can carry.
    #[error("Invalid message shape: {0}")]
    InvalidShape(String),

    /// Message storage could not be allocated.
    #[error("Allocation failed for {datasets} DataSetMessages")]
    AllocationFailed {
        /// Requested DataSetMessage count.
        datasets: usize,
    },

    /// Header field outside its wire range.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A value cannot be represented on the wire.
    #[error("Field {field} of DataSetMessage {dataset} cannot be encoded: {reason}")]
    UnencodableValue {
        /// DataSetMessage index.
        dataset: usize,
        /// Field index.
        field: usize,
        /// Why.
        reason: String,
    },
}

/// Errors raised while decoding a received datagram.
///
/// The datagram is discarded; nothing reaches the cache.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Datagram ended before the structure did.
    #[error("Truncated datagram: need {needed} bytes at offset {offset}")]
    Truncated {
        /// Read position.
        offset: usize,
        /// Bytes requested.
        needed: usize,
    },

    /// A header feature this decoder does not implement is enabled.
    #[error("Unsupported UADP feature: {0}")]
    UnsupportedFeature(&'static str),

    /// PublisherId type code is unknown.
    #[error("Unknown PublisherId type {0}")]
    UnknownPublisherIdType(u8),

    /// Variant type id is unknown or unsupported.
    #[error("Unsupported built-in type id {0}")]
    UnknownBuiltinType(u8),

    /// Negative or oversized length prefix.
    #[error("Invalid length {0}")]
    InvalidLength(i64),

    /// String payload is not UTF-8.
    #[error("String is not valid UTF-8")]
    InvalidUtf8,

    /// Array contents violate the variant rules.
    #[error("Invalid variant: {0}")]
    InvalidVariant(#[from] VariantError),

    /// Bytes left over after the last DataSetMessage.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// A DataSetMessage size does not match its content.
    #[error("DataSetMessage {index} declared {declared} bytes, decoded {actual}")]
    SizeMismatch {
        /// DataSetMessage index.
        index: usize,
        /// Size from the payload header.
        declared: usize,
        /// Bytes actually consumed.
        actual: usize,
    },

    /// Text datagram segment is not a `Name:Value` pair.
    #[error("Malformed text segment '{0}'")]
    MalformedPair(String),

    /// Text datagram carries more pairs than accepted.
    #[error("Text datagram has more than {0} pairs")]
    TooManyPairs(usize),

    /// A matched DataSetMessage does not carry the reader's field count.
    #[error("DataSetMessage from writer {writer_id} has {actual} fields, reader expects {expected}")]
    FieldCount {
        /// DataSetWriterId (0 when absent).
        writer_id: u16,
        /// Fields configured on the reader.
        expected: usize,
        /// Fields in the message.
        actual: usize,
    },

    /// Text value cannot be parsed for the target type.
    #[error("Cannot parse value for '{name}' as {expected:?}")]
    InvalidValue {
        /// Pair name.
        name: String,
        /// Declared type of the target.
        expected: BuiltinType,
    },
}

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;
