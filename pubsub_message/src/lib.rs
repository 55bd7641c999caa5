//! PubSub NetworkMessage model and codecs.
//!
//! - [`network_message`] - fixed-shape message builder, encode entry points
//! - [`uadp`] - UADP binary layout, encoder and decoder
//! - [`text`] - `Name:Value` gateway codec
//! - [`binary`] - little-endian primitives and Variant/DataValue encoding
//!
//! Encoding never allocates past the caller's buffer: the configured
//! maximum message size is a hard ceiling shared with the receive side.

pub mod binary;
pub mod error;
pub mod network_message;
pub mod text;
pub mod uadp;

pub use error::{DecodeError, DecodeResult, NetworkMessageError};
pub use network_message::{DataSetMessage, NetworkMessage, NetworkMessageHeader};
pub use uadp::{DecodedDataSetMessage, DecodedHeader, DecodedNetworkMessage};
