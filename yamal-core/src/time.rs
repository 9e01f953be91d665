//! Sequence-numbered, time-stamped records.
//!
//! Every record written through [`TimeLog`] starts with a 16-byte prefix
//! `{sequence: u64, timestamp: i64}`. The sequence number is assigned at
//! commit from a counter stored in the file header, so it is shared by all
//! handles and processes writing to the same file and totally orders
//! records across lists.

use crate::config::YamalConfig;
use crate::error::{Result, YamalError};
use crate::iter::{IterState, ListIter, Records};
use crate::record::{self, Record, Reservation};
use crate::storage::SEQUENCE_FIELD;
use crate::types::{ListIndex, Offset};
use crate::yamal::Yamal;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Size of the `{sequence, timestamp}` prefix.
pub const TIME_HEADER_SIZE: usize = 16;

/// A reservation whose payload excludes the time prefix.
pub struct TimedReservation<'a> {
    inner: Reservation<'a>,
}

impl TimedReservation<'_> {
    /// Offset of the record this reservation will become.
    pub fn offset(&self) -> Offset {
        self.inner.offset()
    }
}

impl Deref for TimedReservation<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner[TIME_HEADER_SIZE..]
    }
}

impl DerefMut for TimedReservation<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.inner[TIME_HEADER_SIZE..]
    }
}

impl fmt::Debug for TimedReservation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedReservation")
            .field("offset", &self.offset())
            .field("size", &self.len())
            .finish()
    }
}

/// A committed record with its sequence number and timestamp.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TimedRecord<'a> {
    offset: Offset,
    list: ListIndex,
    sequence: u64,
    timestamp: i64,
    payload: &'a [u8],
}

impl<'a> TimedRecord<'a> {
    /// Split the time prefix off a raw record.
    pub fn decode(record: Record<'a>) -> Result<Self> {
        let bytes = record.payload();
        if bytes.len() < TIME_HEADER_SIZE {
            return Err(YamalError::InvalidOffset {
                offset: record.offset(),
                cause: format!(
                    "record of {} bytes is too short for a time prefix",
                    bytes.len()
                ),
            });
        }
        Ok(Self {
            offset: record.offset(),
            list: record.list(),
            sequence: LittleEndian::read_u64(&bytes[0..8]),
            timestamp: LittleEndian::read_i64(&bytes[8..16]),
            payload: &bytes[TIME_HEADER_SIZE..],
        })
    }

    /// Offset of the record.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// List the record was committed to.
    pub fn list(&self) -> ListIndex {
        self.list
    }

    /// File-wide sequence number, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Caller-supplied timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Payload size in bytes, excluding the time prefix.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The payload.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

impl fmt::Debug for TimedRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedRecord")
            .field("offset", &self.offset)
            .field("list", &self.list)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("size", &self.payload.len())
            .finish()
    }
}

/// Log of sequence-numbered, time-stamped records.
#[derive(Debug, Clone)]
pub struct TimeLog {
    yamal: Yamal,
}

impl From<Yamal> for TimeLog {
    fn from(yamal: Yamal) -> Self {
        Self { yamal }
    }
}

impl TimeLog {
    /// Open `path` as a time log.
    pub fn open(path: impl AsRef<Path>, config: YamalConfig) -> Result<Self> {
        Yamal::open(path, config).map(Self::from)
    }

    /// The underlying handle.
    pub fn yamal(&self) -> &Yamal {
        &self.yamal
    }

    /// Largest payload `reserve` accepts.
    pub fn max_record_size(&self) -> u64 {
        self.yamal
            .max_record_size()
            .saturating_sub(TIME_HEADER_SIZE as u64)
    }

    /// Reserve a record with `size` payload bytes after the time prefix.
    pub fn reserve(&self, size: usize) -> Result<TimedReservation<'_>> {
        let max = self.max_record_size();
        if size == 0 || size as u64 > max {
            return Err(YamalError::InvalidSize {
                requested: size as u64,
                max,
            });
        }
        let inner = self.yamal.reserve(size + TIME_HEADER_SIZE)?;
        Ok(TimedReservation { inner })
    }

    /// Assign the next sequence number, stamp `timestamp` and publish on
    /// `list`.
    ///
    /// The sequence number is claimed right before each link attempt, after
    /// the record's predecessor is linked. A writer that loses a race to
    /// another writer on the same list claims a fresh number, so sequence
    /// numbers strictly increase along every list. Numbers lost that way
    /// leave gaps.
    pub fn commit(
        &self,
        reservation: TimedReservation<'_>,
        list: ListIndex,
        timestamp: i64,
    ) -> Result<ListIter> {
        let storage = self.yamal.storage();
        storage.ensure_writable("commit")?;

        let counter = storage.atomic_u64(SEQUENCE_FIELD)?;
        let mut sequence = 0;
        let offset = record::commit_with(storage, reservation.inner, list, |prefix| {
            sequence = counter.fetch_add(1) + 1;
            LittleEndian::write_u64(&mut prefix[0..8], sequence);
            LittleEndian::write_i64(&mut prefix[8..16], timestamp);
        })?;

        tracing::trace!(list = %list, sequence, timestamp, "Committed timed record");
        Ok(ListIter::at(list, offset))
    }

    /// Reserve, fill and commit in one call.
    pub fn append(&self, list: ListIndex, timestamp: i64, payload: &[u8]) -> Result<ListIter> {
        let mut reservation = self.reserve(payload.len())?;
        reservation.copy_from_slice(payload);
        self.commit(reservation, list, timestamp)
    }

    /// Read the record an iterator is on.
    pub fn read(&self, iter: &ListIter) -> Result<TimedRecord<'_>> {
        TimedRecord::decode(self.yamal.read(iter)?)
    }

    /// Read the committed record at `offset`.
    pub fn read_at(&self, offset: Offset) -> Result<TimedRecord<'_>> {
        TimedRecord::decode(self.yamal.read_at(offset)?)
    }

    /// Iterator on the first record of `list`.
    pub fn begin(&self, list: ListIndex) -> Result<ListIter> {
        self.yamal.begin(list)
    }

    /// Iterator past the current last record of `list`.
    pub fn end(&self, list: ListIndex) -> Result<ListIter> {
        self.yamal.end(list)
    }

    /// Advance `iter`.
    pub fn next(&self, iter: &mut ListIter) -> Result<IterState> {
        self.yamal.next(iter)
    }

    /// Iterator on a previously read record of `list`.
    pub fn seek(&self, list: ListIndex, offset: Offset) -> Result<ListIter> {
        self.yamal.seek(list, offset)
    }

    /// All records of `list` from the beginning.
    pub fn records(
        &self,
        list: ListIndex,
    ) -> Result<impl Iterator<Item = Result<TimedRecord<'_>>> + '_> {
        Ok(timed(self.yamal.records(list)?))
    }

    /// Records starting at the position of `iter`.
    pub fn records_from(
        &self,
        iter: ListIter,
    ) -> impl Iterator<Item = Result<TimedRecord<'_>>> + '_ {
        timed(self.yamal.records_from(iter))
    }

    /// Last sequence number assigned in this file.
    pub fn last_sequence(&self) -> Result<u64> {
        self.yamal.last_sequence()
    }

    /// Close the handle.
    pub fn close(self) -> Result<()> {
        self.yamal.close()
    }
}

fn timed(records: Records<'_>) -> impl Iterator<Item = Result<TimedRecord<'_>>> + '_ {
    records.map(|r| r.and_then(TimedRecord::decode))
}
