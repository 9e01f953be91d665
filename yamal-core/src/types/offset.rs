//! Stable byte offsets into a yamal file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset into the memory-mapped log.
///
/// This is a raw byte offset from the start of the file. Offsets are the
/// only form in which positions are handed out; they are resolved to an
/// address at the moment of access and stay valid for the lifetime of the
/// file regardless of how the mapping grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Offset(u64);

impl Offset {
    /// The "none yet" offset stored in unlinked `next` words and empty
    /// directory entries.
    pub const NONE: Self = Self(0);

    /// Sentinel linked after the last record of a closed list.
    pub const CLOSED: Self = Self(u64::MAX);

    /// Create a new offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Get the raw offset value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if this is the "none yet" offset.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0 == Self::NONE.0
    }

    /// Check if this is the closed-list sentinel.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.0 == Self::CLOSED.0
    }

    /// Check if this offset addresses a record (neither sentinel).
    #[must_use]
    pub const fn is_record(&self) -> bool {
        !self.is_none() && !self.is_closed()
    }

    /// Add a byte offset.
    #[must_use]
    pub const fn add(&self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    /// Check whether the offset is aligned to `align` bytes.
    #[must_use]
    pub const fn is_aligned(&self, align: u64) -> bool {
        self.0 % align == 0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("none"),
            Self::CLOSED => f.write_str("closed"),
            Self(raw) => write!(f, "0x{raw:08x}"),
        }
    }
}

impl From<u64> for Offset {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

impl From<Offset> for u64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_not_records() {
        assert!(Offset::NONE.is_none());
        assert!(!Offset::NONE.is_record());
        assert!(Offset::CLOSED.is_closed());
        assert!(!Offset::CLOSED.is_record());
        assert!(Offset::new(192).is_record());
    }

    #[test]
    fn display_formats() {
        assert_eq!(Offset::new(0x100).to_string(), "0x00000100");
        assert_eq!(Offset::NONE.to_string(), "none");
        assert_eq!(Offset::CLOSED.to_string(), "closed");
    }

    #[test]
    fn alignment() {
        assert!(Offset::new(64).is_aligned(8));
        assert!(!Offset::new(65).is_aligned(8));
        assert_eq!(Offset::new(64).add(16), Offset::new(80));
    }
}
