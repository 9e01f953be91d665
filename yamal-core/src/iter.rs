//! Cursors over a single list.

use crate::directory::{Anchor, ListDirectory};
use crate::error::{Result, YamalError};
use crate::record::{self, Record};
use crate::storage::MappedStorage;
use crate::types::{ListIndex, Offset};

/// Where a [`ListIter`] currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// On a committed record.
    Positioned(Offset),
    /// Past the last committed record. More records may arrive; advance
    /// again later to pick them up.
    AtListEnd(ListIndex),
    /// The list has been closed and no more records will arrive.
    Closed(ListIndex),
}

impl IterState {
    /// Offset of the current record, if positioned on one.
    pub fn offset(&self) -> Option<Offset> {
        match *self {
            Self::Positioned(offset) => Some(offset),
            Self::AtListEnd(_) | Self::Closed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Record(Offset),
    /// Waiting on the given `next` word to become non-zero.
    End(Anchor),
    Closed,
}

/// A position in one list.
///
/// An iterator does not borrow the log; it is advanced through the handle
/// that created it. Iterators are never invalidated by the file growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListIter {
    list: ListIndex,
    pos: Position,
}

impl ListIter {
    /// The list being iterated.
    pub fn list(&self) -> ListIndex {
        self.list
    }

    /// Current state.
    pub fn state(&self) -> IterState {
        match self.pos {
            Position::Record(offset) => IterState::Positioned(offset),
            Position::End(_) => IterState::AtListEnd(self.list),
            Position::Closed => IterState::Closed(self.list),
        }
    }

    /// Offset of the current record, if any.
    pub fn offset(&self) -> Option<Offset> {
        self.state().offset()
    }

    /// Whether the iterator is past the last committed record.
    pub fn is_at_end(&self) -> bool {
        !matches!(self.pos, Position::Record(_))
    }

    pub(crate) fn at(list: ListIndex, offset: Offset) -> Self {
        Self {
            list,
            pos: Position::Record(offset),
        }
    }

    fn resolve(directory: &ListDirectory<'_>, anchor: Anchor) -> Result<Position> {
        let next = directory.load(anchor)?;
        Ok(if next.is_closed() {
            Position::Closed
        } else if next.is_none() {
            Position::End(anchor)
        } else {
            Position::Record(next)
        })
    }

    /// Iterator on the first record of `list`.
    pub(crate) fn begin(storage: &MappedStorage, list: ListIndex) -> Result<Self> {
        let directory = ListDirectory::new(storage);
        Ok(Self {
            list,
            pos: Self::resolve(&directory, Anchor::Head(list))?,
        })
    }

    /// Iterator past the last record of `list`, for readers only
    /// interested in what is committed from now on.
    pub(crate) fn end(storage: &MappedStorage, list: ListIndex) -> Result<Self> {
        let (anchor, next) = ListDirectory::new(storage).last(list)?;
        let pos = if next.is_closed() {
            Position::Closed
        } else {
            Position::End(anchor)
        };
        Ok(Self { list, pos })
    }

    /// Iterator on a previously read record of `list`.
    pub(crate) fn seek(storage: &MappedStorage, list: ListIndex, offset: Offset) -> Result<Self> {
        let record = record::read(storage, offset)?;
        if record.list() != list {
            return Err(YamalError::InvalidOffset {
                offset,
                cause: format!("record belongs to {}, not {list}", record.list()),
            });
        }
        Ok(Self::at(list, offset))
    }

    /// Step to the next record.
    ///
    /// On the last record, or when already at the end, this re-checks for
    /// a successor and stays at the end if none was committed yet.
    pub(crate) fn advance(&mut self, storage: &MappedStorage) -> Result<IterState> {
        let directory = ListDirectory::new(storage);
        self.pos = match self.pos {
            Position::Record(offset) => Self::resolve(&directory, Anchor::Record(offset))?,
            Position::End(anchor) => Self::resolve(&directory, anchor)?,
            Position::Closed => Position::Closed,
        };
        Ok(self.state())
    }

    /// The record the iterator is on.
    pub(crate) fn read<'a>(&self, storage: &'a MappedStorage) -> Result<Record<'a>> {
        match self.pos {
            Position::Record(offset) => record::read(storage, offset),
            Position::End(_) | Position::Closed => Err(YamalError::InvalidOffset {
                offset: Offset::NONE,
                cause: format!("iterator is at the end of {}", self.list),
            }),
        }
    }
}

/// `Iterator` adapter yielding the records of a list.
///
/// Returns `None` once it reaches the end of the list. The adapter is not
/// fused: calling `next` again later yields records committed since. Once
/// the handle is closed it yields `HandleClosed` once and then ends.
pub struct Records<'a> {
    storage: &'a MappedStorage,
    iter: ListIter,
    pending: bool,
    closed: bool,
}

impl<'a> Records<'a> {
    /// Yield records starting with the one `iter` is on.
    pub(crate) fn new(storage: &'a MappedStorage, iter: ListIter) -> Self {
        Self {
            storage,
            pending: !iter.is_at_end(),
            iter,
            closed: false,
        }
    }

    /// Position after the last yielded record.
    pub fn position(&self) -> ListIter {
        self.iter
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        if let Err(e) = self.storage.ensure_open() {
            self.closed = true;
            return Some(Err(e));
        }
        if !self.pending {
            match self.iter.advance(self.storage) {
                Ok(IterState::Positioned(_)) => {}
                Ok(IterState::AtListEnd(_) | IterState::Closed(_)) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
        self.pending = false;
        Some(self.iter.read(self.storage))
    }
}
