//! Per-list head/tail directory and the lock-free link protocol.
//!
//! Every list is a singly linked chain of records. The directory entry of a
//! list holds the offset of its first record (`head`, written once) and a
//! hint to its last record (`tail`, only ever moved forward). Appending is
//! a compare-and-swap of the last record's `next` word from "none yet" to
//! the new record, so writers on different lists never touch the same
//! word, and writers on the same list serialize on that single word.

use crate::error::{Result, YamalError};
use crate::record::{NEXT_FIELD, TAG_FIELD};
use crate::storage::{AtomicLe64, DIRECTORY_ENTRY_SIZE, DIRECTORY_FIELD, MappedStorage};
use crate::types::{ListIndex, Offset};
use std::sync::atomic::Ordering;

/// A `next` word a position in a list can be anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Anchor {
    /// The directory head word of a list.
    Head(ListIndex),
    /// The `next` word of a linked record.
    Record(Offset),
}

/// View of the list directory inside a mapped file.
pub(crate) struct ListDirectory<'a> {
    storage: &'a MappedStorage,
}

impl<'a> ListDirectory<'a> {
    pub(crate) fn new(storage: &'a MappedStorage) -> Self {
        Self { storage }
    }

    fn head_word(&self, list: ListIndex) -> Result<AtomicLe64<'a>> {
        self.storage
            .atomic_u64(DIRECTORY_FIELD + DIRECTORY_ENTRY_SIZE * list.slot() as u64)
    }

    fn tail_word(&self, list: ListIndex) -> Result<AtomicLe64<'a>> {
        self.storage
            .atomic_u64(DIRECTORY_FIELD + DIRECTORY_ENTRY_SIZE * list.slot() as u64 + 8)
    }

    /// The word an anchor refers to.
    pub(crate) fn next_word(&self, anchor: Anchor) -> Result<AtomicLe64<'a>> {
        match anchor {
            Anchor::Head(list) => self.head_word(list),
            Anchor::Record(offset) => self.storage.atomic_u64(offset.add(NEXT_FIELD).as_u64()),
        }
    }

    /// Value of the word an anchor refers to.
    pub(crate) fn load(&self, anchor: Anchor) -> Result<Offset> {
        Ok(Offset::new(self.next_word(anchor)?.load(Ordering::Acquire)))
    }

    /// First record of `list`, or [`Offset::NONE`] while nothing was committed.
    pub(crate) fn head(&self, list: ListIndex) -> Result<Offset> {
        let head = self.load(Anchor::Head(list))?;
        Ok(if head.is_record() { head } else { Offset::NONE })
    }

    /// Last record of `list` as recorded in the directory.
    ///
    /// The stored tail may trail commits that are still completing on other
    /// threads; it never points at a record that is not linked yet.
    pub(crate) fn tail(&self, list: ListIndex) -> Result<Offset> {
        Ok(Offset::new(self.tail_word(list)?.load(Ordering::Acquire)))
    }

    /// Anchor to start walking from: the tail hint, or the head word.
    fn tail_anchor(&self, list: ListIndex) -> Result<Anchor> {
        let tail = self.tail(list)?;
        Ok(if tail.is_record() {
            Anchor::Record(tail)
        } else {
            Anchor::Head(list)
        })
    }

    /// Walk from the tail hint to the last `next` word of the list.
    ///
    /// Returns the anchor of that word and its value, which is either
    /// [`Offset::NONE`] or [`Offset::CLOSED`].
    pub(crate) fn last(&self, list: ListIndex) -> Result<(Anchor, Offset)> {
        let mut anchor = self.tail_anchor(list)?;
        loop {
            let next = self.load(anchor)?;
            if !next.is_record() {
                return Ok((anchor, next));
            }
            anchor = Anchor::Record(next);
        }
    }

    /// Publish `record` at the end of `list`.
    ///
    /// The record header must be fully written. Fails with `ListClosed`
    /// when the list has been closed.
    pub(crate) fn link(&self, list: ListIndex, record: Offset) -> Result<()> {
        self.link_with(list, record, || {})
    }

    /// Like [`ListDirectory::link`], calling `prepare` before every attempt.
    ///
    /// `prepare` runs only once the record's would-be predecessor is itself
    /// linked, so anything it claims from a shared counter is ordered after
    /// whatever the predecessor claimed. A failed attempt calls it again.
    pub(crate) fn link_with(
        &self,
        list: ListIndex,
        record: Offset,
        mut prepare: impl FnMut(),
    ) -> Result<()> {
        let tag = self.storage.atomic_u32(record.add(TAG_FIELD).as_u64())?;
        tag.store(list.tag(), Ordering::Release);

        let mut anchor = self.tail_anchor(list)?;
        loop {
            let word = self.next_word(anchor)?;
            let next = Offset::new(word.load(Ordering::Acquire));
            if next.is_record() {
                anchor = Anchor::Record(next);
                continue;
            }
            if next.is_closed() {
                tag.store(0, Ordering::Release);
                return Err(YamalError::ListClosed { list });
            }

            prepare();
            match word.compare_exchange(Offset::NONE.as_u64(), record.as_u64()) {
                Ok(_) => break,
                Err(next) if Offset::new(next).is_closed() => {
                    tag.store(0, Ordering::Release);
                    return Err(YamalError::ListClosed { list });
                }
                Err(next) => anchor = Anchor::Record(Offset::new(next)),
            }
        }

        tracing::trace!(list = %list, offset = %record, "Linked record");
        self.advance_tail(list)
    }

    /// Move the tail hint forward to the last linked record.
    ///
    /// The tail only ever moves from a record to its successor, so it is
    /// monotonic even with several threads advancing it at once.
    fn advance_tail(&self, list: ListIndex) -> Result<()> {
        let tail_word = self.tail_word(list)?;
        let mut tail = Offset::new(tail_word.load(Ordering::Acquire));
        loop {
            let anchor = if tail.is_record() {
                Anchor::Record(tail)
            } else {
                Anchor::Head(list)
            };
            let next = self.load(anchor)?;
            if !next.is_record() {
                return Ok(());
            }
            tail = match tail_word.compare_exchange(tail.as_u64(), next.as_u64()) {
                Ok(_) => next,
                Err(actual) => Offset::new(actual),
            };
        }
    }

    /// Terminate `list` so no further records can be linked.
    ///
    /// Closing an already closed list succeeds.
    pub(crate) fn close(&self, list: ListIndex) -> Result<()> {
        if !self.storage.is_closable() {
            return Err(YamalError::NotClosable);
        }

        let mut anchor = self.tail_anchor(list)?;
        loop {
            match self
                .next_word(anchor)?
                .compare_exchange(Offset::NONE.as_u64(), Offset::CLOSED.as_u64())
            {
                Ok(_) => {
                    tracing::debug!(list = %list, "Closed list");
                    return Ok(());
                }
                Err(next) if Offset::new(next).is_closed() => return Ok(()),
                Err(next) => anchor = Anchor::Record(Offset::new(next)),
            }
        }
    }

    /// Whether `list` has been closed.
    pub(crate) fn is_closed(&self, list: ListIndex) -> Result<bool> {
        Ok(self.last(list)?.1.is_closed())
    }
}
