//! Bounds-checked list indices.

use crate::error::{Result, YamalError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest valid list index.
pub const LIST_MIN: u8 = 0;

/// Highest valid list index.
pub const LIST_MAX: u8 = 7;

/// Number of lists in the directory.
pub const LIST_COUNT: usize = (LIST_MAX - LIST_MIN) as usize + 1;

/// Index of one of the fixed logical lists sharing a yamal file.
///
/// A `ListIndex` can only be constructed for values in
/// `[LIST_MIN, LIST_MAX]`, so directory lookups never go out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ListIndex(u8);

impl ListIndex {
    /// The first list.
    pub const MIN: Self = Self(LIST_MIN);

    /// The last list.
    pub const MAX: Self = Self(LIST_MAX);

    /// Create a list index, failing for values outside `[LIST_MIN, LIST_MAX]`.
    pub fn new(index: u8) -> Result<Self> {
        if (LIST_MIN..=LIST_MAX).contains(&index) {
            Ok(Self(index))
        } else {
            Err(YamalError::InvalidList {
                index: u64::from(index),
            })
        }
    }

    /// Create a list index from a compile-time constant.
    ///
    /// Panics during constant evaluation when out of range.
    #[must_use]
    pub const fn from_const(index: u8) -> Self {
        assert!(index <= LIST_MAX);
        Self(index)
    }

    /// Raw index value.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based slot in the list directory.
    #[must_use]
    pub const fn slot(&self) -> usize {
        (self.0 - LIST_MIN) as usize
    }

    /// Tag written into a linked record header (index + 1, 0 means unlinked).
    pub(crate) const fn tag(&self) -> u32 {
        self.0 as u32 + 1
    }

    /// Inverse of [`ListIndex::tag`].
    pub(crate) fn from_tag(tag: u32) -> Option<Self> {
        let index = tag.checked_sub(1)?;
        u8::try_from(index).ok().and_then(|i| Self::new(i).ok())
    }

    /// All list indices in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (LIST_MIN..=LIST_MAX).map(Self)
    }
}

impl fmt::Display for ListIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list_{}", self.0)
    }
}

impl TryFrom<u8> for ListIndex {
    type Error = YamalError;

    fn try_from(index: u8) -> Result<Self> {
        Self::new(index)
    }
}

impl TryFrom<usize> for ListIndex {
    type Error = YamalError;

    fn try_from(index: usize) -> Result<Self> {
        u8::try_from(index)
            .map_err(|_| YamalError::InvalidList {
                index: index as u64,
            })
            .and_then(Self::new)
    }
}

impl From<ListIndex> for u8 {
    fn from(index: ListIndex) -> Self {
        index.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_enforced() {
        assert!(ListIndex::new(LIST_MIN).is_ok());
        assert!(ListIndex::new(LIST_MAX).is_ok());

        let err = ListIndex::new(LIST_MAX + 1).unwrap_err();
        assert!(matches!(err, YamalError::InvalidList { index: 8 }));

        assert!(ListIndex::try_from(300usize).is_err());
    }

    #[test]
    fn tags_roundtrip_and_reject_unlinked() {
        let list = ListIndex::new(3).unwrap();
        assert_eq!(list.tag(), 4);
        assert_eq!(ListIndex::from_tag(4), Some(list));
        assert_eq!(ListIndex::from_tag(0), None);
        assert_eq!(ListIndex::from_tag(200), None);
    }

    #[test]
    fn all_lists_in_order() {
        let lists: Vec<u8> = ListIndex::all().map(|l| l.get()).collect();
        assert_eq!(lists, (LIST_MIN..=LIST_MAX).collect::<Vec<_>>());
        assert_eq!(lists.len(), LIST_COUNT);
    }
}
