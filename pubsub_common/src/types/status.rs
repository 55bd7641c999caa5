//! OPC UA StatusCode.
//!
//! The two most significant bits carry the severity: `00` good,
//! `01` uncertain, `10`/`11` bad.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-bit OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Operation succeeded.
    pub const GOOD: Self = Self(0x0000_0000);
    /// Value is uncertain, no specific reason.
    pub const UNCERTAIN: Self = Self(0x4000_0000);
    /// Value is bad, no specific reason.
    pub const BAD: Self = Self(0x8000_0000);
    /// The value was not received in time.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// Data is missing.
    pub const BAD_NO_DATA: Self = Self(0x809B_0000);

    /// Severity mask for bad codes.
    pub const BAD_MASK: u32 = 0x8000_0000;
    /// Severity mask for uncertain codes.
    pub const UNCERTAIN_MASK: u32 = 0x4000_0000;

    /// Raw code.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Severity is bad.
    #[inline]
    pub const fn is_bad(self) -> bool {
        self.0 & Self::BAD_MASK != 0
    }

    /// Severity is uncertain.
    #[inline]
    pub const fn is_uncertain(self) -> bool {
        !self.is_bad() && self.0 & Self::UNCERTAIN_MASK != 0
    }

    /// Severity is good.
    #[inline]
    pub const fn is_good(self) -> bool {
        self.0 & (Self::BAD_MASK | Self::UNCERTAIN_MASK) == 0
    }

    /// High 16 bits, as carried by a UADP DataSetMessage status field.
    #[inline]
    pub const fn high_word(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Rebuild a status from the high 16 bits of a UADP DataSetMessage.
    #[inline]
    pub const fn from_high_word(word: u16) -> Self {
        Self((word as u32) << 16)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bad() {
            write!(f, "BAD 0x{:08X}", self.0)
        } else if self.is_uncertain() {
            write!(f, "UNCERTAIN 0x{:08X}", self.0)
        } else {
            write!(f, "GOOD")
        }
    }
}
