//! Cp command - copy records from one yamal file into another.

use anyhow::{Context, Result};
use std::path::Path;
use yamal_core::storage::HEADER_SIZE;
use yamal_core::{
    IterState, ListIndex, ListIter, RECORD_HEADER_SIZE, TIME_HEADER_SIZE, TimeLog, YamalConfig,
};

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Lists to copy.
    pub lists: Vec<ListIndex>,
    /// Stop after this many records.
    pub max_count: Option<u64>,
    /// Stop before the copied data would exceed this many bytes.
    pub max_bytes: Option<u64>,
}

/// Outcome of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopySummary {
    /// Records written to the destination.
    pub records: u64,
    /// Bytes accounted against the size limit, header included.
    pub bytes: u64,
}

/// Run the cp command.
pub fn run(src: &Path, dest: &Path, options: &CopyOptions) -> Result<()> {
    tracing::info!(src = %src.display(), dest = %dest.display(), "Copying yamal file");

    let source = TimeLog::open(src, YamalConfig::read_only().from_env()?)
        .with_context(|| format!("Failed to open source: {}", src.display()))?;
    let config = YamalConfig::default()
        .with_closable(source.yamal().is_closable())
        .from_env()?;
    let target = TimeLog::open(dest, config)
        .with_context(|| format!("Failed to open destination: {}", dest.display()))?;

    let summary = copy(&source, &target, options)?;
    tracing::info!(records = summary.records, bytes = summary.bytes, "Copy finished");
    target.close().context("Failed to close destination")?;
    Ok(())
}

/// Copy records of the selected lists from `source` to `target`.
///
/// Lists are merged by source sequence number, so the relative order of
/// records across lists is the same in the copy. Each record keeps its
/// list and timestamp and gets a fresh sequence number in `target`.
pub fn copy(source: &TimeLog, target: &TimeLog, options: &CopyOptions) -> Result<CopySummary> {
    let mut cursors = options
        .lists
        .iter()
        .map(|&list| source.begin(list))
        .collect::<yamal_core::Result<Vec<ListIter>>>()?;

    let mut summary = CopySummary {
        records: 0,
        bytes: HEADER_SIZE,
    };
    loop {
        if options.max_count.is_some_and(|max| summary.records >= max) {
            break;
        }

        let mut oldest: Option<(usize, u64)> = None;
        for (slot, cursor) in cursors.iter().enumerate() {
            if let IterState::Positioned(_) = cursor.state() {
                let sequence = source.read(cursor)?.sequence();
                if oldest.is_none_or(|(_, best)| sequence < best) {
                    oldest = Some((slot, sequence));
                }
            }
        }
        let Some((slot, _)) = oldest else {
            break;
        };

        let record = source.read(&cursors[slot])?;
        let bytes = summary.bytes
            + RECORD_HEADER_SIZE
            + TIME_HEADER_SIZE as u64
            + record.size() as u64;
        if options.max_bytes.is_some_and(|max| bytes > max) {
            break;
        }

        if record.size() == 0 {
            tracing::warn!(offset = %record.offset(), "Skipping record without payload");
        } else {
            let mut reservation = target.reserve(record.size())?;
            reservation.copy_from_slice(record.payload());
            target
                .commit(reservation, record.list(), record.timestamp())
                .with_context(|| format!("Failed to copy record at {}", record.offset()))?;
            summary.records += 1;
            summary.bytes = bytes;
        }

        source.next(&mut cursors[slot])?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn all_lists() -> CopyOptions {
        CopyOptions {
            lists: ListIndex::all().collect(),
            max_count: None,
            max_bytes: None,
        }
    }

    fn contents(log: &TimeLog, list: ListIndex) -> Vec<(i64, Vec<u8>)> {
        log.records(list)
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                (r.timestamp(), r.payload().to_vec())
            })
            .collect()
    }

    #[test]
    fn copy_keeps_lists_and_cross_list_order() {
        let dir = tempdir().unwrap();
        let source = TimeLog::open(dir.path().join("src.ytp"), YamalConfig::for_testing()).unwrap();
        let target = TimeLog::open(dir.path().join("dst.ytp"), YamalConfig::for_testing()).unwrap();
        let (a, b) = (ListIndex::new(0).unwrap(), ListIndex::new(3).unwrap());

        source.append(a, 1, b"a1").unwrap();
        source.append(b, 2, b"b1").unwrap();
        source.append(a, 3, b"a2").unwrap();

        let summary = copy(&source, &target, &all_lists()).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(contents(&target, a), contents(&source, a));
        assert_eq!(contents(&target, b), contents(&source, b));

        let seq = |list, n: usize| {
            target.records(list).unwrap().nth(n).unwrap().unwrap().sequence()
        };
        assert!(seq(a, 0) < seq(b, 0) && seq(b, 0) < seq(a, 1));
    }

    #[test]
    fn copy_honors_count_and_size_limits() {
        let dir = tempdir().unwrap();
        let source = TimeLog::open(dir.path().join("src.ytp"), YamalConfig::for_testing()).unwrap();
        let list = ListIndex::MIN;
        for i in 0..10u8 {
            source.append(list, 0, &[i; 100]).unwrap();
        }

        let target = TimeLog::open(dir.path().join("n.ytp"), YamalConfig::for_testing()).unwrap();
        let counted = CopyOptions {
            max_count: Some(4),
            ..all_lists()
        };
        assert_eq!(copy(&source, &target, &counted).unwrap().records, 4);
        assert_eq!(contents(&target, list).len(), 4);

        let target = TimeLog::open(dir.path().join("s.ytp"), YamalConfig::for_testing()).unwrap();
        let per_record = RECORD_HEADER_SIZE + TIME_HEADER_SIZE as u64 + 100;
        let sized = CopyOptions {
            max_bytes: Some(HEADER_SIZE + 3 * per_record + 1),
            ..all_lists()
        };
        let summary = copy(&source, &target, &sized).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.bytes, HEADER_SIZE + 3 * per_record);
    }

    #[test]
    fn copy_of_selected_list_ignores_others() {
        let dir = tempdir().unwrap();
        let source = TimeLog::open(dir.path().join("src.ytp"), YamalConfig::for_testing()).unwrap();
        let target = TimeLog::open(dir.path().join("dst.ytp"), YamalConfig::for_testing()).unwrap();
        source.append(ListIndex::MIN, 0, b"keep").unwrap();
        source.append(ListIndex::MAX, 0, b"skip").unwrap();

        let only_first = CopyOptions {
            lists: vec![ListIndex::MIN],
            ..all_lists()
        };
        copy(&source, &target, &only_first).unwrap();
        assert_eq!(contents(&target, ListIndex::MIN).len(), 1);
        assert!(contents(&target, ListIndex::MAX).is_empty());
    }
}
