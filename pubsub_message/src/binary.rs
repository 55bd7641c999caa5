//! Little-endian binary encoder/decoder for UADP primitives.
//!
//! Implements the subset of the UA binary encoding needed for DataSet
//! fields: scalar built-in types, one-dimensional arrays, matrices, and
//! DataValues.
//!
//! The encoder writes into a caller-provided fixed buffer. On overflow it
//! stops copying but keeps counting, so the caller learns the full size the
//! message would have needed.

use pubsub_common::types::{
    BuiltinType, DataValue, DateTime, Scalar, ScalarArray, ScalarMatrix, StatusCode, Variant,
};

use crate::error::{DecodeError, DecodeResult};

const ARRAY_MASK: u8 = 0x80;
const DIMENSIONS_MASK: u8 = 0x40;
const TYPE_MASK: u8 = 0x3F;

const DV_VALUE: u8 = 0x01;
const DV_STATUS: u8 = 0x02;
const DV_SOURCE_TS: u8 = 0x04;
const DV_SERVER_TS: u8 = 0x08;
const DV_SOURCE_PICO: u8 = 0x10;
const DV_SERVER_PICO: u8 = 0x20;

/// Encoder over a fixed buffer.
pub struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    /// Create an encoder writing from the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far, including any that did not fit.
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// True once a write went past the end of the buffer.
    pub fn overflowed(&self) -> bool {
        self.pos > self.buf.len()
    }

    /// Capacity of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end <= self.buf.len() {
            self.buf[self.pos..end].copy_from_slice(bytes);
        }
        self.pos = end;
    }

    /// Overwrite two bytes at an earlier position (size back-patching).
    pub fn patch_u16(&mut self, at: usize, value: u16) {
        if at + 2 <= self.buf.len() {
            self.buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Length-prefixed byte string.
    pub fn write_byte_string(&mut self, bytes: &[u8]) {
        self.write_i32(bytes.len() as i32);
        self.write_bytes(bytes);
    }

    /// One scalar without its type byte.
    pub fn write_scalar(&mut self, scalar: &Scalar) {
        match scalar {
            Scalar::Boolean(v) => self.write_u8(u8::from(*v)),
            Scalar::SByte(v) => self.write_bytes(&v.to_le_bytes()),
            Scalar::Byte(v) => self.write_u8(*v),
            Scalar::Int16(v) => self.write_bytes(&v.to_le_bytes()),
            Scalar::UInt16(v) => self.write_u16(*v),
            Scalar::Int32(v) => self.write_i32(*v),
            Scalar::UInt32(v) => self.write_u32(*v),
            Scalar::Int64(v) => self.write_i64(*v),
            Scalar::UInt64(v) => self.write_u64(*v),
            Scalar::Float(v) => self.write_bytes(&v.to_le_bytes()),
            Scalar::Double(v) => self.write_bytes(&v.to_le_bytes()),
            Scalar::String(v) => self.write_byte_string(v.as_bytes()),
            Scalar::DateTime(v) => self.write_i64(v.ticks()),
            Scalar::ByteString(v) => self.write_byte_string(v),
            Scalar::StatusCode(v) => self.write_u32(v.bits()),
        }
    }

    fn write_elements(&mut self, array: &ScalarArray) {
        self.write_i32(array.len() as i32);
        for element in array.values() {
            self.write_scalar(element);
        }
    }

    /// Variant with its encoding byte.
    pub fn write_variant(&mut self, variant: &Variant) {
        match variant {
            Variant::Empty => self.write_u8(0),
            Variant::Scalar(s) => {
                self.write_u8(s.builtin_type().id());
                self.write_scalar(s);
            }
            Variant::Array(a) => {
                self.write_u8(a.element_type().id() | ARRAY_MASK);
                self.write_elements(a);
            }
            Variant::Matrix(m) => {
                self.write_u8(m.array().element_type().id() | ARRAY_MASK | DIMENSIONS_MASK);
                self.write_elements(m.array());
                self.write_i32(m.dimensions().len() as i32);
                for d in m.dimensions() {
                    self.write_i32(*d as i32);
                }
            }
        }
    }

    /// DataValue with its encoding mask. Good status is omitted.
    pub fn write_data_value(&mut self, dv: &DataValue) {
        let mut mask = 0u8;
        if !dv.value.is_empty() {
            mask |= DV_VALUE;
        }
        if dv.status != StatusCode::GOOD {
            mask |= DV_STATUS;
        }
        if dv.source_timestamp.is_some() {
            mask |= DV_SOURCE_TS;
        }
        if dv.server_timestamp.is_some() {
            mask |= DV_SERVER_TS;
        }
        self.write_u8(mask);
        if mask & DV_VALUE != 0 {
            self.write_variant(&dv.value);
        }
        if mask & DV_STATUS != 0 {
            self.write_u32(dv.status.bits());
        }
        if let Some(ts) = dv.source_timestamp {
            self.write_i64(ts.ticks());
        }
        if let Some(ts) = dv.server_timestamp {
            self.write_i64(ts.ticks());
        }
    }
}

/// Bounds-checked reader over a received datagram.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a decoder reading from the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read position.
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrow the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> DecodeResult<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    /// Length prefix; -1 (null) reads as zero elements.
    fn read_length(&mut self, min_element_size: usize) -> DecodeResult<usize> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(0);
        }
        let len = usize::try_from(len).map_err(|_| DecodeError::InvalidLength(i64::from(len)))?;
        if len.saturating_mul(min_element_size) > self.remaining() {
            return Err(DecodeError::InvalidLength(len as i64));
        }
        Ok(len)
    }

    /// Length-prefixed byte string.
    pub fn read_byte_string(&mut self) -> DecodeResult<&'a [u8]> {
        let len = self.read_length(1)?;
        self.read_bytes(len)
    }

    /// One scalar of a known type.
    pub fn read_scalar(&mut self, ty: BuiltinType) -> DecodeResult<Scalar> {
        Ok(match ty {
            BuiltinType::Boolean => Scalar::Boolean(self.read_u8()? != 0),
            BuiltinType::SByte => Scalar::SByte(i8::from_le_bytes(self.read_array()?)),
            BuiltinType::Byte => Scalar::Byte(self.read_u8()?),
            BuiltinType::Int16 => Scalar::Int16(i16::from_le_bytes(self.read_array()?)),
            BuiltinType::UInt16 => Scalar::UInt16(self.read_u16()?),
            BuiltinType::Int32 => Scalar::Int32(self.read_i32()?),
            BuiltinType::UInt32 => Scalar::UInt32(self.read_u32()?),
            BuiltinType::Int64 => Scalar::Int64(self.read_i64()?),
            BuiltinType::UInt64 => Scalar::UInt64(self.read_u64()?),
            BuiltinType::Float => Scalar::Float(f32::from_le_bytes(self.read_array()?)),
            BuiltinType::Double => Scalar::Double(f64::from_le_bytes(self.read_array()?)),
            BuiltinType::String => {
                let bytes = self.read_byte_string()?;
                let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
                Scalar::String(text.to_string())
            }
            BuiltinType::DateTime => Scalar::DateTime(DateTime(self.read_i64()?)),
            BuiltinType::ByteString => Scalar::ByteString(self.read_byte_string()?.to_vec()),
            BuiltinType::StatusCode => Scalar::StatusCode(StatusCode(self.read_u32()?)),
        })
    }

    fn read_elements(&mut self, ty: BuiltinType) -> DecodeResult<ScalarArray> {
        let len = self.read_length(ty.fixed_size().unwrap_or(4))?;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_scalar(ty)?);
        }
        Ok(ScalarArray::new(ty, values)?)
    }

    /// Variant with its encoding byte.
    pub fn read_variant(&mut self) -> DecodeResult<Variant> {
        let encoding = self.read_u8()?;
        let type_id = encoding & TYPE_MASK;
        if type_id == 0 {
            return Ok(Variant::Empty);
        }
        let ty = BuiltinType::from_id(type_id).ok_or(DecodeError::UnknownBuiltinType(type_id))?;

        if encoding & ARRAY_MASK == 0 {
            return Ok(Variant::Scalar(self.read_scalar(ty)?));
        }
        let array = self.read_elements(ty)?;
        if encoding & DIMENSIONS_MASK == 0 {
            return Ok(Variant::Array(array));
        }
        let ndims = self.read_length(4)?;
        let mut dims = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            let d = self.read_i32()?;
            dims.push(u32::try_from(d).map_err(|_| DecodeError::InvalidLength(i64::from(d)))?);
        }
        Ok(Variant::Matrix(ScalarMatrix::new(array, dims)?))
    }

    /// DataValue with its encoding mask.
    pub fn read_data_value(&mut self) -> DecodeResult<DataValue> {
        let mask = self.read_u8()?;
        let mut dv = DataValue::default();
        if mask & DV_VALUE != 0 {
            dv.value = self.read_variant()?;
        }
        if mask & DV_STATUS != 0 {
            dv.status = StatusCode(self.read_u32()?);
        }
        if mask & DV_SOURCE_TS != 0 {
            dv.source_timestamp = Some(DateTime(self.read_i64()?));
        }
        if mask & DV_SOURCE_PICO != 0 {
            self.read_u16()?;
        }
        if mask & DV_SERVER_TS != 0 {
            dv.server_timestamp = Some(DateTime(self.read_i64()?));
        }
        if mask & DV_SERVER_PICO != 0 {
            self.read_u16()?;
        }
        Ok(dv)
    }
}
