//! Record layout and the two-phase reserve/commit protocol.
//!
//! A record is `[size: u32][list: u32][next: u64][payload]`, padded to 8
//! bytes. `reserve` claims and zeroes space for a record without making it
//! reachable; `commit` links it onto a list, which is the only moment
//! readers can observe it.

use crate::directory::ListDirectory;
use crate::error::{Result, YamalError};
use crate::storage::{HEADER_SIZE, MappedStorage, align};
use crate::types::{ListIndex, Offset};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;

/// Size of the record header preceding every payload.
pub const RECORD_HEADER_SIZE: u64 = 16;

pub(crate) const SIZE_FIELD: u64 = 0;
pub(crate) const TAG_FIELD: u64 = 4;
pub(crate) const NEXT_FIELD: u64 = 8;

/// Space reserved for a record that has not been committed yet.
///
/// The payload is zero-initialized and writable through `DerefMut`.
/// Dropping a reservation without committing leaves the space unused; it
/// is never visible to readers.
pub struct Reservation<'a> {
    storage: &'a MappedStorage,
    offset: Offset,
    payload: &'a mut [u8],
}

impl Reservation<'_> {
    /// Offset of the record this reservation will become.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Writable payload.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut *self.payload
    }
}

impl Deref for Reservation<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &*self.payload
    }
}

impl DerefMut for Reservation<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut *self.payload
    }
}

impl fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("offset", &self.offset)
            .field("size", &self.payload.len())
            .finish()
    }
}

/// A committed record borrowed from the mapping.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    offset: Offset,
    list: ListIndex,
    payload: &'a [u8],
}

impl<'a> Record<'a> {
    /// Offset of the record.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// List the record was committed to.
    pub fn list(&self) -> ListIndex {
        self.list
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The payload.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("offset", &self.offset)
            .field("list", &self.list)
            .field("size", &self.payload.len())
            .finish()
    }
}

/// Reserve a zeroed record with `size` payload bytes.
pub(crate) fn reserve(
    storage: &MappedStorage,
    max_payload: u64,
    size: u64,
) -> Result<Reservation<'_>> {
    storage.ensure_writable("reserve")?;
    if size == 0 || size > max_payload {
        return Err(YamalError::InvalidSize {
            requested: size,
            max: max_payload,
        });
    }

    let offset = storage.reserve_region(align(RECORD_HEADER_SIZE + size))?;
    let base = offset.as_u64();

    storage
        .atomic_u32(base + SIZE_FIELD)?
        .store(size as u32, Ordering::Relaxed);
    storage
        .atomic_u32(base + TAG_FIELD)?
        .store(0, Ordering::Relaxed);
    storage
        .atomic_u64(base + NEXT_FIELD)?
        .store(Offset::NONE.as_u64(), Ordering::Relaxed);

    // SAFETY: the region was just handed out by `reserve_region` and is not
    // linked to any list.
    let payload = unsafe { storage.bytes_mut(base + RECORD_HEADER_SIZE, size)? };
    payload.fill(0);

    Ok(Reservation {
        storage,
        offset,
        payload,
    })
}

/// Link a reservation onto `list`, making it visible to readers.
pub(crate) fn commit(
    storage: &MappedStorage,
    reservation: Reservation<'_>,
    list: ListIndex,
) -> Result<Offset> {
    commit_with(storage, reservation, list, |_| {})
}

/// Link a reservation onto `list`, letting `stamp` rewrite the payload
/// before every link attempt.
pub(crate) fn commit_with(
    storage: &MappedStorage,
    reservation: Reservation<'_>,
    list: ListIndex,
    mut stamp: impl FnMut(&mut [u8]),
) -> Result<Offset> {
    storage.ensure_writable("commit")?;
    if !std::ptr::eq(storage, reservation.storage) {
        return Err(YamalError::InvalidOffset {
            offset: reservation.offset,
            cause: "reservation belongs to a different file".to_string(),
        });
    }

    let Reservation {
        offset, payload, ..
    } = reservation;
    ListDirectory::new(storage).link_with(list, offset, || stamp(&mut *payload))?;
    Ok(offset)
}

/// Read the committed record at `offset`.
pub(crate) fn read(storage: &MappedStorage, offset: Offset) -> Result<Record<'_>> {
    let invalid = |cause: String| YamalError::InvalidOffset { offset, cause };

    let base = offset.as_u64();
    if !offset.is_record() || base < HEADER_SIZE {
        return Err(invalid("offset is outside the record area".to_string()));
    }
    if !offset.is_aligned(8) {
        return Err(invalid("offset is not 8-byte aligned".to_string()));
    }

    let reserved = storage.reserved_size();
    if base + RECORD_HEADER_SIZE > reserved {
        return Err(invalid(format!("offset is past the reserved size {reserved}")));
    }

    let tag = storage.atomic_u32(base + TAG_FIELD)?.load(Ordering::Acquire);
    let list = ListIndex::from_tag(tag)
        .ok_or_else(|| invalid(format!("record is not committed (list tag {tag})")))?;

    let size = u64::from(storage.atomic_u32(base + SIZE_FIELD)?.load(Ordering::Relaxed));
    if size == 0 || base + RECORD_HEADER_SIZE + size > reserved {
        return Err(invalid(format!("record size {size} is out of bounds")));
    }

    let payload = storage.bytes(offset.add(RECORD_HEADER_SIZE).as_u64(), size)?;
    Ok(Record {
        offset,
        list,
        payload,
    })
}
