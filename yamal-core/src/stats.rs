//! File and per-list statistics.

use crate::directory::{Anchor, ListDirectory};
use crate::error::Result;
use crate::record;
use crate::storage::{MappedStorage, SEQUENCE_FIELD};
use crate::types::{ListIndex, Offset};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

/// Statistics for one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListStats {
    /// The list.
    pub list: ListIndex,
    /// Number of committed records.
    pub records: u64,
    /// Sum of payload sizes.
    pub payload_bytes: u64,
    /// First record.
    pub head: Offset,
    /// Last record.
    pub tail: Offset,
    /// Whether the list has been closed.
    pub closed: bool,
}

/// Statistics for a yamal file.
#[derive(Debug, Clone, Serialize)]
pub struct YamalStats {
    /// Backing file.
    pub path: PathBuf,
    /// Mapping page size.
    pub page_size: u64,
    /// End of the reserved area.
    pub reserved_size: u64,
    /// Configured upper bound on the file size.
    pub max_size: u64,
    /// Pages mapped by this handle.
    pub mapped_pages: usize,
    /// Last sequence number handed out by the time layer.
    pub last_sequence: u64,
    /// Whether the handle is read-only.
    pub read_only: bool,
    /// Whether lists can be closed.
    pub closable: bool,
    /// Per-list statistics, in index order.
    pub lists: Vec<ListStats>,
}

impl YamalStats {
    /// Total number of committed records across all lists.
    pub fn total_records(&self) -> u64 {
        self.lists.iter().map(|l| l.records).sum()
    }
}

/// Walk every list and collect statistics.
pub(crate) fn collect(storage: &MappedStorage) -> Result<YamalStats> {
    let directory = ListDirectory::new(storage);
    let lists = ListIndex::all()
        .map(|list| list_stats(storage, &directory, list))
        .collect::<Result<Vec<_>>>()?;

    Ok(YamalStats {
        path: storage.path().to_path_buf(),
        page_size: storage.page_size(),
        reserved_size: storage.reserved_size(),
        max_size: storage.max_size(),
        mapped_pages: storage.mapped_pages(),
        last_sequence: last_sequence(storage)?,
        read_only: storage.is_read_only(),
        closable: storage.is_closable(),
        lists,
    })
}

pub(crate) fn last_sequence(storage: &MappedStorage) -> Result<u64> {
    Ok(storage.atomic_u64(SEQUENCE_FIELD)?.load(Ordering::Acquire))
}

fn list_stats(
    storage: &MappedStorage,
    directory: &ListDirectory<'_>,
    list: ListIndex,
) -> Result<ListStats> {
    let mut stats = ListStats {
        list,
        records: 0,
        payload_bytes: 0,
        head: directory.head(list)?,
        tail: Offset::NONE,
        closed: false,
    };

    let mut anchor = Anchor::Head(list);
    loop {
        let next = directory.load(anchor)?;
        if next.is_closed() {
            stats.closed = true;
            break;
        }
        if next.is_none() {
            break;
        }
        let record = record::read(storage, next)?;
        stats.records += 1;
        stats.payload_bytes += record.size() as u64;
        stats.tail = next;
        anchor = Anchor::Record(next);
    }

    Ok(stats)
}
