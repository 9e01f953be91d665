//! Integration tests for ordering, visibility and persistence of the log.

use std::path::Path;
use tempfile::tempdir;
use yamal_core::prelude::*;
use yamal_core::stream::{DATA, PEER_ANNOUNCEMENT};

fn open_log(path: &Path) -> TimeLog {
    TimeLog::open(path, YamalConfig::for_testing()).unwrap()
}

fn collect(log: &TimeLog, list: ListIndex) -> Vec<(u64, i64, Vec<u8>)> {
    log.records(list)
        .unwrap()
        .map(|r| {
            let r = r.unwrap();
            (r.sequence(), r.timestamp(), r.payload().to_vec())
        })
        .collect()
}

#[test]
fn test_append_order_with_interleaved_lists() {
    let dir = tempdir().unwrap();
    let log = open_log(&dir.path().join("order.ytp"));
    let lists: Vec<ListIndex> = ListIndex::all().collect();

    for i in 0..200u32 {
        let list = lists[(i as usize * 7) % lists.len()];
        log.append(list, i64::from(i), &i.to_le_bytes()).unwrap();
    }

    for (slot, &list) in lists.iter().enumerate() {
        let expected: Vec<u32> = (0..200u32)
            .filter(|i| (*i as usize * 7) % lists.len() == slot)
            .collect();
        let got: Vec<u32> = collect(&log, list)
            .into_iter()
            .map(|(_, _, p)| u32::from_le_bytes(p.try_into().unwrap()))
            .collect();
        assert_eq!(got, expected, "{list}");
    }
}

#[test]
fn test_two_list_scenario() {
    let dir = tempdir().unwrap();
    let log = open_log(&dir.path().join("scenario.ytp"));

    log.append(DATA, 100, b"A1").unwrap();
    log.append(PEER_ANNOUNCEMENT, 50, b"B1").unwrap();
    log.append(DATA, 200, b"A2").unwrap();

    let data = collect(&log, DATA);
    let announcements = collect(&log, PEER_ANNOUNCEMENT);

    assert_eq!(
        data.iter().map(|(_, ts, p)| (*ts, p.as_slice())).collect::<Vec<_>>(),
        vec![(100, &b"A1"[..]), (200, &b"A2"[..])]
    );
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0].2, b"B1");

    let (a1, b1, a2) = (data[0].0, announcements[0].0, data[1].0);
    assert!(a1 < b1 && b1 < a2);
}

#[test]
fn test_reserve_without_commit_is_invisible() {
    let dir = tempdir().unwrap();
    let log = open_log(&dir.path().join("reserve.ytp"));

    log.append(DATA, 1, b"visible").unwrap();
    let before = collect(&log, DATA);

    let mut reservation = log.reserve(64).unwrap();
    reservation.fill(0xAA);
    drop(reservation);

    assert_eq!(collect(&log, DATA), before);
    for list in ListIndex::all().filter(|&l| l != DATA) {
        assert!(collect(&log, list).is_empty());
    }
}

#[test]
fn test_end_of_list_repoll() {
    let dir = tempdir().unwrap();
    let log = open_log(&dir.path().join("poll.ytp"));

    let mut iter = log.append(DATA, 1, b"first").unwrap();
    assert_eq!(log.next(&mut iter).unwrap(), IterState::AtListEnd(DATA));
    assert_eq!(log.next(&mut iter).unwrap(), IterState::AtListEnd(DATA));

    let second = log.append(DATA, 2, b"second").unwrap();
    assert_eq!(
        log.next(&mut iter).unwrap(),
        IterState::Positioned(second.offset().unwrap())
    );
    assert_eq!(log.read(&iter).unwrap().payload(), b"second");
}

#[test]
fn test_records_are_immutable() {
    let dir = tempdir().unwrap();
    let log = open_log(&dir.path().join("immutable.ytp"));

    let iter = log.append(DATA, 7, b"constant").unwrap();
    let offset = iter.offset().unwrap();
    let first = log.read_at(offset).unwrap();
    let snapshot = (first.sequence(), first.timestamp(), first.payload().to_vec());

    for i in 0..100u8 {
        log.append(DATA, i64::from(i), &[i; 32]).unwrap();
    }

    let again = log.read_at(offset).unwrap();
    assert_eq!(
        (again.sequence(), again.timestamp(), again.payload().to_vec()),
        snapshot
    );
}

#[test]
fn test_growth_keeps_offsets_valid() {
    let dir = tempdir().unwrap();
    let log = open_log(&dir.path().join("growth.ytp"));
    let page_size = log.yamal().page_size();

    let early: Vec<(Offset, Vec<u8>)> = (0..10u8)
        .map(|i| {
            let payload = vec![i; 100];
            let iter = log.append(DATA, 0, &payload).unwrap();
            (iter.offset().unwrap(), payload)
        })
        .collect();

    let chunk = vec![0x5A; 4000];
    while log.yamal().reserved_size().unwrap() < page_size * 6 {
        log.append(PEER_ANNOUNCEMENT, 0, &chunk).unwrap();
    }
    assert!(log.yamal().stats().unwrap().mapped_pages >= 6);

    for (offset, payload) in early {
        assert_eq!(log.read_at(offset).unwrap().payload(), payload.as_slice());
    }
}

#[test]
fn test_reopen_reproduces_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reopen.ytp");

    let (data, announcements) = {
        let log = open_log(&path);
        for i in 0..50i64 {
            let list = if i % 3 == 0 { PEER_ANNOUNCEMENT } else { DATA };
            log.append(list, i * 10, format!("record-{i}").as_bytes())
                .unwrap();
        }
        let snapshot = (collect(&log, DATA), collect(&log, PEER_ANNOUNCEMENT));
        log.close().unwrap();
        snapshot
    };

    let log = open_log(&path);
    assert_eq!(collect(&log, DATA), data);
    assert_eq!(collect(&log, PEER_ANNOUNCEMENT), announcements);
    assert_eq!(log.last_sequence().unwrap(), 50);

    let next = log.append(DATA, 0, b"after reopen").unwrap();
    assert_eq!(log.read(&next).unwrap().sequence(), 51);
}

#[test]
fn test_read_only_handle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ro.ytp");
    let writer = open_log(&path);
    writer.append(DATA, 1, b"shared").unwrap();

    let reader = TimeLog::open(&path, YamalConfig::read_only()).unwrap();
    assert!(reader.yamal().is_read_only());
    assert_eq!(collect(&reader, DATA).len(), 1);

    assert!(matches!(
        reader.reserve(8),
        Err(YamalError::ReadOnly { .. })
    ));
    assert!(matches!(
        reader.yamal().close_list(DATA),
        Err(YamalError::ReadOnly { .. })
    ));

    let mut iter = reader.begin(DATA).unwrap();
    assert_eq!(reader.next(&mut iter).unwrap(), IterState::AtListEnd(DATA));
    writer.append(DATA, 2, b"live").unwrap();
    assert!(matches!(reader.next(&mut iter).unwrap(), IterState::Positioned(_)));
    assert_eq!(reader.read(&iter).unwrap().payload(), b"live");
}

#[test]
fn test_invalid_files_are_rejected() {
    let dir = tempdir().unwrap();

    let garbage = dir.path().join("garbage.bin");
    std::fs::write(&garbage, b"not a yamal file").unwrap();
    let err = Yamal::open(&garbage, YamalConfig::for_testing()).unwrap_err();
    assert!(matches!(err, YamalError::InvalidFormat { .. }));
    assert!(err.is_structural());

    let missing = dir.path().join("missing.ytp");
    let err = Yamal::open(&missing, YamalConfig::read_only()).unwrap_err();
    assert!(matches!(err, YamalError::Io { .. }));
}

#[test]
fn test_seek_resumes_from_saved_offset() {
    let dir = tempdir().unwrap();
    let log = open_log(&dir.path().join("seek.ytp"));

    let mut saved = None;
    for i in 0..10i64 {
        let iter = log.append(DATA, i, &i.to_le_bytes()).unwrap();
        if i == 4 {
            saved = iter.offset();
        }
    }

    let offset = saved.unwrap();
    let resumed: Vec<i64> = log
        .records_from(log.seek(DATA, offset).unwrap())
        .map(|r| r.unwrap().timestamp())
        .collect();
    assert_eq!(resumed, (4..10).collect::<Vec<_>>());

    assert!(log.seek(PEER_ANNOUNCEMENT, offset).is_err());
    assert!(log.seek(DATA, offset.add(16)).is_err());
}

#[test]
fn test_closed_lists_stop_accepting_records() {
    let dir = tempdir().unwrap();
    let stream = Stream::open(dir.path().join("closed.ytp"), YamalConfig::for_testing()).unwrap();

    stream.write(StreamList::Data, 1, b"one").unwrap();
    let mut tail = stream.end(StreamList::Data).unwrap();
    stream.close_all().unwrap();

    assert_eq!(stream.next(&mut tail).unwrap(), IterState::Closed(DATA));
    assert!(matches!(
        stream.write(StreamList::Data, 2, b"two"),
        Err(YamalError::ListClosed { .. })
    ));

    let mut iter = stream.begin(StreamList::Data).unwrap();
    assert_eq!(stream.read(&iter).unwrap().payload(), b"one");
    assert_eq!(stream.next(&mut iter).unwrap(), IterState::Closed(DATA));
}
