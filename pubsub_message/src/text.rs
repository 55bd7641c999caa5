//! Text gateway codec: comma separated `Name:Value` pairs.
//!
//! A datagram may be the bare list (`Counter:7,Speed:1.5,`) or wrapped in
//! the gateway envelope (`{"hdr":{Counter:7,Speed:1.5}}`), in which case the
//! list is taken from after the innermost opening brace up to the next
//! closing brace. Whitespace around names and values is ignored and empty
//! segments (trailing comma) are skipped. One malformed segment rejects the
//! whole datagram.

use std::fmt::Write as _;

use heapless::Vec as BoundedVec;
use pubsub_common::consts::MAX_TEXT_FIELDS;
use pubsub_common::types::Variant;

use crate::binary::Encoder;
use crate::error::{DecodeError, DecodeResult, NetworkMessageError};

/// Pairs borrowed from one datagram.
pub type TextPairs<'a> = BoundedVec<(&'a str, &'a str), MAX_TEXT_FIELDS>;

fn payload(frame: &str) -> &str {
    match frame.rfind('{') {
        Some(open) => {
            let body = &frame[open + 1..];
            match body.find('}') {
                Some(close) => &body[..close],
                None => body,
            }
        }
        None => frame,
    }
}

/// Split a datagram into `(name, value)` pairs.
pub fn decode_pairs(frame: &str) -> DecodeResult<TextPairs<'_>> {
    let mut pairs = TextPairs::new();
    for segment in payload(frame).split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (name, value) = segment
            .split_once(':')
            .ok_or_else(|| DecodeError::MalformedPair(segment.to_string()))?;
        let name = name.trim().trim_matches('"');
        if name.is_empty() {
            return Err(DecodeError::MalformedPair(segment.to_string()));
        }
        pairs
            .push((name, value.trim()))
            .map_err(|_| DecodeError::TooManyPairs(MAX_TEXT_FIELDS))?;
    }
    Ok(pairs)
}

/// Split a raw datagram, rejecting non UTF-8 input.
pub fn decode_datagram(bytes: &[u8]) -> DecodeResult<TextPairs<'_>> {
    let frame = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    decode_pairs(frame)
}

/// Encode `Name:Value,` for every pair into `out`, returning the length.
///
/// Only scalar values are representable. `out.len()` is the size ceiling.
pub fn encode_pairs<'a, I>(pairs: I, out: &mut [u8]) -> Result<usize, NetworkMessageError>
where
    I: IntoIterator<Item = (&'a str, &'a Variant)>,
{
    let mut enc = Encoder::new(out);
    let mut value_text = String::new();
    for (field, (name, value)) in pairs.into_iter().enumerate() {
        let Variant::Scalar(scalar) = value else {
            return Err(NetworkMessageError::UnencodableValue {
                dataset: 0,
                field,
                reason: format!("'{name}' is not a scalar"),
            });
        };
        value_text.clear();
        write!(value_text, "{scalar}").map_err(|_| {
            NetworkMessageError::UnencodableValue {
                dataset: 0,
                field,
                reason: "formatting failed".to_string(),
            }
        })?;
        if value_text.contains([',', ':', '{', '}']) {
            return Err(NetworkMessageError::UnencodableValue {
                dataset: 0,
                field,
                reason: format!("value of '{name}' contains a delimiter"),
            });
        }
        enc.write_bytes(name.as_bytes());
        enc.write_u8(b':');
        enc.write_bytes(value_text.as_bytes());
        enc.write_u8(b',');
    }

    if enc.overflowed() {
        return Err(NetworkMessageError::BufferTooSmall {
            required: enc.position(),
            max: enc.capacity(),
        });
    }
    Ok(enc.position())
}
