//! Variant: the typed payload of a DataValue or a DataSet field.
//!
//! Only the scalar built-in types used by the real-time core are modelled.
//! A variant is either empty, a scalar, a homogeneous one-dimensional array
//! or a matrix. Array homogeneity and matrix dimensions are checked by the
//! constructors, so the rank and the payload always agree.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::date_time::DateTime;
use super::status::StatusCode;
use crate::consts::MAX_VALUE_RANK;

/// Errors raised while building or parsing variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariantError {
    /// Array element does not match the declared element type.
    #[error("array element {index} is {found:?}, expected {expected:?}")]
    HeterogeneousArray {
        /// Index of the offending element.
        index: usize,
        /// Declared element type.
        expected: BuiltinType,
        /// Actual element type.
        found: BuiltinType,
    },

    /// Matrix dimensions do not multiply to the element count.
    #[error("matrix dimensions {dimensions:?} do not match {len} elements")]
    DimensionMismatch {
        /// Declared dimensions.
        dimensions: Vec<u32>,
        /// Number of elements.
        len: usize,
    },

    /// Value rank outside `..=2`.
    #[error("unsupported value rank {0} (max {MAX_VALUE_RANK})")]
    UnsupportedValueRank(i32),

    /// Text could not be parsed for the requested type.
    #[error("cannot parse '{text}' as {expected:?}")]
    Parse {
        /// Input text.
        text: String,
        /// Requested type.
        expected: BuiltinType,
    },

    /// Parsed integer does not fit the requested type.
    #[error("value '{text}' out of range for {expected:?}")]
    OutOfRange {
        /// Input text.
        text: String,
        /// Requested type.
        expected: BuiltinType,
    },
}

/// Built-in type identifiers (OPC UA Part 6 numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BuiltinType {
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    String = 12,
    DateTime = 13,
    ByteString = 15,
    StatusCode = 19,
}

impl BuiltinType {
    /// Convert from the wire identifier. Returns `None` for unsupported ids.
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Boolean),
            2 => Some(Self::SByte),
            3 => Some(Self::Byte),
            4 => Some(Self::Int16),
            5 => Some(Self::UInt16),
            6 => Some(Self::Int32),
            7 => Some(Self::UInt32),
            8 => Some(Self::Int64),
            9 => Some(Self::UInt64),
            10 => Some(Self::Float),
            11 => Some(Self::Double),
            12 => Some(Self::String),
            13 => Some(Self::DateTime),
            15 => Some(Self::ByteString),
            19 => Some(Self::StatusCode),
            _ => None,
        }
    }

    /// Wire identifier.
    #[inline]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Encoded size of one scalar, or `None` for variable-length types.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::SByte | Self::Byte => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float | Self::StatusCode => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double | Self::DateTime => Some(8),
            Self::String | Self::ByteString => None,
        }
    }
}

/// Array rank of a field, derived from the OPC UA value rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueRank {
    /// Single value (value rank < 0).
    Scalar,
    /// One-dimensional array (value rank 0 or 1).
    Array,
    /// Two-dimensional matrix (value rank 2).
    Matrix,
}

impl ValueRank {
    /// Map an OPC UA value rank onto the supported ranks.
    pub fn from_value_rank(rank: i32) -> Result<Self, VariantError> {
        match rank {
            r if r < 0 => Ok(Self::Scalar),
            0 | 1 => Ok(Self::Array),
            MAX_VALUE_RANK => Ok(Self::Matrix),
            r => Err(VariantError::UnsupportedValueRank(r)),
        }
    }
}

/// Single value of a built-in type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Scalar {
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime),
    ByteString(Vec<u8>),
    StatusCode(StatusCode),
}

impl Scalar {
    /// Built-in type of the active member.
    pub const fn builtin_type(&self) -> BuiltinType {
        match self {
            Self::Boolean(_) => BuiltinType::Boolean,
            Self::SByte(_) => BuiltinType::SByte,
            Self::Byte(_) => BuiltinType::Byte,
            Self::Int16(_) => BuiltinType::Int16,
            Self::UInt16(_) => BuiltinType::UInt16,
            Self::Int32(_) => BuiltinType::Int32,
            Self::UInt32(_) => BuiltinType::UInt32,
            Self::Int64(_) => BuiltinType::Int64,
            Self::UInt64(_) => BuiltinType::UInt64,
            Self::Float(_) => BuiltinType::Float,
            Self::Double(_) => BuiltinType::Double,
            Self::String(_) => BuiltinType::String,
            Self::DateTime(_) => BuiltinType::DateTime,
            Self::ByteString(_) => BuiltinType::ByteString,
            Self::StatusCode(_) => BuiltinType::StatusCode,
        }
    }

    /// Default value: false / 0 / empty, current time for DateTime.
    pub fn default_for(ty: BuiltinType) -> Self {
        match ty {
            BuiltinType::Boolean => Self::Boolean(false),
            BuiltinType::SByte => Self::SByte(0),
            BuiltinType::Byte => Self::Byte(0),
            BuiltinType::Int16 => Self::Int16(0),
            BuiltinType::UInt16 => Self::UInt16(0),
            BuiltinType::Int32 => Self::Int32(0),
            BuiltinType::UInt32 => Self::UInt32(0),
            BuiltinType::Int64 => Self::Int64(0),
            BuiltinType::UInt64 => Self::UInt64(0),
            BuiltinType::Float => Self::Float(0.0),
            BuiltinType::Double => Self::Double(0.0),
            BuiltinType::String => Self::String(String::new()),
            BuiltinType::DateTime => Self::DateTime(DateTime::now()),
            BuiltinType::ByteString => Self::ByteString(Vec::new()),
            BuiltinType::StatusCode => Self::StatusCode(StatusCode::GOOD),
        }
    }

    /// Parse a textual value for the given type.
    ///
    /// Integers accept decimal or `0x`-prefixed hexadecimal; an empty string
    /// yields the type's zero. DateTime takes the current time when empty,
    /// otherwise a raw tick count.
    pub fn parse(ty: BuiltinType, text: &str) -> Result<Self, VariantError> {
        let text = text.trim();
        let parse_err = || VariantError::Parse {
            text: text.to_string(),
            expected: ty,
        };
        let range_err = || VariantError::OutOfRange {
            text: text.to_string(),
            expected: ty,
        };

        macro_rules! int {
            ($variant:ident, $t:ty) => {{
                let wide = parse_integer(text).ok_or_else(parse_err)?;
                let narrow = <$t>::try_from(wide).map_err(|_| range_err())?;
                Ok(Self::$variant(narrow))
            }};
        }

        match ty {
            BuiltinType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" => Ok(Self::Boolean(true)),
                "false" => Ok(Self::Boolean(false)),
                _ => parse_integer(text)
                    .map(|v| Self::Boolean(v != 0))
                    .ok_or_else(parse_err),
            },
            BuiltinType::SByte => int!(SByte, i8),
            BuiltinType::Byte => int!(Byte, u8),
            BuiltinType::Int16 => int!(Int16, i16),
            BuiltinType::UInt16 => int!(UInt16, u16),
            BuiltinType::Int32 => int!(Int32, i32),
            BuiltinType::UInt32 => int!(UInt32, u32),
            BuiltinType::Int64 => int!(Int64, i64),
            BuiltinType::UInt64 => int!(UInt64, u64),
            BuiltinType::StatusCode => {
                let wide = parse_integer(text).ok_or_else(parse_err)?;
                let code = u32::try_from(wide).map_err(|_| range_err())?;
                Ok(Self::StatusCode(StatusCode(code)))
            }
            BuiltinType::Float => {
                if text.is_empty() {
                    return Ok(Self::Float(0.0));
                }
                text.parse::<f32>().map(Self::Float).map_err(|_| parse_err())
            }
            BuiltinType::Double => {
                if text.is_empty() {
                    return Ok(Self::Double(0.0));
                }
                text.parse::<f64>().map(Self::Double).map_err(|_| parse_err())
            }
            BuiltinType::String => Ok(Self::String(text.to_string())),
            BuiltinType::ByteString => Ok(Self::ByteString(text.as_bytes().to_vec())),
            BuiltinType::DateTime => {
                if text.is_empty() {
                    return Ok(Self::DateTime(DateTime::now()));
                }
                text.parse::<i64>()
                    .map(|ticks| Self::DateTime(DateTime(ticks)))
                    .map_err(|_| parse_err())
            }
        }
    }
}

/// Integer parse shared by all integer types: empty → 0, `0x` → hex.
/// Widened to i128 so u64 and i64 extremes both fit before narrowing.
fn parse_integer(text: &str) -> Option<i128> {
    if text.is_empty() {
        return Some(0);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.starts_with(['-', '+']) {
        return None;
    }
    let hex = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"));
    let magnitude = match hex {
        Some(hex) if !hex.is_empty() && !hex.starts_with(['-', '+']) => {
            i128::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", *v as u8),
            Self::SByte(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.ticks()),
            Self::ByteString(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            Self::StatusCode(v) => write!(f, "0x{:08X}", v.bits()),
        }
    }
}

/// Homogeneous one-dimensional array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarArray {
    element_type: BuiltinType,
    values: Vec<Scalar>,
}

impl ScalarArray {
    /// Build an array, checking every element against `element_type`.
    pub fn new(element_type: BuiltinType, values: Vec<Scalar>) -> Result<Self, VariantError> {
        if let Some((index, found)) = values
            .iter()
            .map(Scalar::builtin_type)
            .enumerate()
            .find(|(_, ty)| *ty != element_type)
        {
            return Err(VariantError::HeterogeneousArray {
                index,
                expected: element_type,
                found,
            });
        }
        Ok(Self {
            element_type,
            values,
        })
    }

    /// Empty array of the given element type.
    pub fn empty(element_type: BuiltinType) -> Self {
        Self {
            element_type,
            values: Vec::new(),
        }
    }

    /// Element type.
    pub fn element_type(&self) -> BuiltinType {
        self.element_type
    }

    /// Elements.
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Multi-dimensional array stored in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarMatrix {
    array: ScalarArray,
    dimensions: Vec<u32>,
}

impl ScalarMatrix {
    /// Build a matrix; the dimensions must multiply to the element count.
    pub fn new(array: ScalarArray, dimensions: Vec<u32>) -> Result<Self, VariantError> {
        let product = dimensions
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d as usize));
        if dimensions.is_empty() || product != Some(array.len()) {
            return Err(VariantError::DimensionMismatch {
                dimensions,
                len: array.len(),
            });
        }
        Ok(Self { array, dimensions })
    }

    /// Empty 0×0 matrix.
    pub fn empty(element_type: BuiltinType) -> Self {
        Self {
            array: ScalarArray::empty(element_type),
            dimensions: vec![0, 0],
        }
    }

    /// Flattened elements.
    pub fn array(&self) -> &ScalarArray {
        &self.array
    }

    /// Dimension lengths.
    pub fn dimensions(&self) -> &[u32] {
        &self.dimensions
    }
}

/// Typed value with its rank.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum Variant {
    /// Null variant.
    #[default]
    Empty,
    /// Single value.
    Scalar(Scalar),
    /// One-dimensional array.
    Array(ScalarArray),
    /// Matrix.
    Matrix(ScalarMatrix),
}

impl Variant {
    /// Default value for a field of the given type and rank.
    pub fn default_for(ty: BuiltinType, rank: ValueRank) -> Self {
        match rank {
            ValueRank::Scalar => Self::Scalar(Scalar::default_for(ty)),
            ValueRank::Array => Self::Array(ScalarArray::empty(ty)),
            ValueRank::Matrix => Self::Matrix(ScalarMatrix::empty(ty)),
        }
    }

    /// Built-in type, `None` for an empty variant.
    pub fn builtin_type(&self) -> Option<BuiltinType> {
        match self {
            Self::Empty => None,
            Self::Scalar(s) => Some(s.builtin_type()),
            Self::Array(a) => Some(a.element_type()),
            Self::Matrix(m) => Some(m.array().element_type()),
        }
    }

    /// Rank, `None` for an empty variant.
    pub fn value_rank(&self) -> Option<ValueRank> {
        match self {
            Self::Empty => None,
            Self::Scalar(_) => Some(ValueRank::Scalar),
            Self::Array(_) => Some(ValueRank::Array),
            Self::Matrix(_) => Some(ValueRank::Matrix),
        }
    }

    /// Scalar payload, if any.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// True when the variant is [`Variant::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Scalar> for Variant {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

macro_rules! impl_variant_from {
    ($($t:ty => $member:ident),* $(,)?) => {
        $(
            impl From<$t> for Variant {
                fn from(value: $t) -> Self {
                    Self::Scalar(Scalar::$member(value))
                }
            }
        )*
    };
}

impl_variant_from!(
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime => DateTime,
    Vec<u8> => ByteString,
    StatusCode => StatusCode,
);

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "<empty>"),
            Self::Scalar(s) => write!(f, "{s}"),
            Self::Array(a) => write!(f, "[ARR {:?} x{}]", a.element_type(), a.len()),
            Self::Matrix(m) => write!(
                f,
                "[MAT {:?} {:?}]",
                m.array().element_type(),
                m.dimensions()
            ),
        }
    }
}
