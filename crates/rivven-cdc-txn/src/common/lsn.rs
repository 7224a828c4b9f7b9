//! Log positions
//!
//! PostgreSQL Log Sequence Numbers in their `XXXXXXXX/XXXXXXXX` text form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a record in the write-ahead log.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Lsn(u64);

impl Lsn {
    /// The zero position.
    pub const INVALID: Lsn = Lsn(0);

    /// Create from a raw 64-bit value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw 64-bit value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check whether this is the zero position.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for Lsn {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Lsn::new(0x1_2345_ABCD).to_string(), "1/2345ABCD");
        assert_eq!(Lsn::new((0x16 << 32) | 0xB374_D848).to_string(), "16/B374D848");
        assert_eq!(Lsn::INVALID.to_string(), "0/0");
    }

    #[test]
    fn test_ordering() {
        let a = Lsn::new(0x10);
        let b = Lsn::new(1 << 32);
        assert!(a < b);
        assert!(a.is_valid());
        assert!(!Lsn::default().is_valid());
    }
}
