//! The fixed set of logical streams sharing a file.
//!
//! Higher layers (peer and channel announcements, subscriptions, indices)
//! give meaning to records on particular lists. A data record may carry the
//! offset of an announcement it refers to; such references are opaque here
//! and are neither validated nor resolved at append time.

use crate::config::YamalConfig;
use crate::error::{Result, YamalError};
use crate::iter::{IterState, ListIter};
use crate::time::{TimeLog, TimedRecord, TimedReservation};
use crate::types::ListIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// List carrying message data.
pub const DATA: ListIndex = ListIndex::from_const(0);
/// List carrying peer announcements.
pub const PEER_ANNOUNCEMENT: ListIndex = ListIndex::from_const(1);
/// List carrying channel announcements.
pub const CHANNEL_ANNOUNCEMENT: ListIndex = ListIndex::from_const(2);
/// List carrying subscriptions.
pub const SUBSCRIPTION: ListIndex = ListIndex::from_const(3);
/// List carrying index records.
pub const INDEX: ListIndex = ListIndex::from_const(4);

/// Named logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamList {
    /// Message data.
    Data,
    /// Peer announcements.
    PeerAnnouncement,
    /// Channel announcements.
    ChannelAnnouncement,
    /// Subscriptions.
    Subscription,
    /// Index records.
    Index,
}

impl StreamList {
    /// Every stream, in list order.
    pub const ALL: [Self; 5] = [
        Self::Data,
        Self::PeerAnnouncement,
        Self::ChannelAnnouncement,
        Self::Subscription,
        Self::Index,
    ];

    /// The list backing this stream.
    pub const fn index(self) -> ListIndex {
        match self {
            Self::Data => DATA,
            Self::PeerAnnouncement => PEER_ANNOUNCEMENT,
            Self::ChannelAnnouncement => CHANNEL_ANNOUNCEMENT,
            Self::Subscription => SUBSCRIPTION,
            Self::Index => INDEX,
        }
    }

    /// The stream backed by `list`, if any.
    pub fn from_index(list: ListIndex) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.index() == list)
    }

    /// Stable lower-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::PeerAnnouncement => "peer_announcement",
            Self::ChannelAnnouncement => "channel_announcement",
            Self::Subscription => "subscription",
            Self::Index => "index",
        }
    }
}

impl From<StreamList> for ListIndex {
    fn from(stream: StreamList) -> Self {
        stream.index()
    }
}

impl fmt::Display for StreamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StreamList {
    type Err = YamalError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|stream| stream.name() == normalized)
            .ok_or_else(|| YamalError::Config {
                field: "stream",
                cause: format!("unknown stream '{s}'"),
            })
    }
}

/// A time log viewed as a set of named streams.
#[derive(Debug, Clone)]
pub struct Stream {
    log: TimeLog,
}

impl From<TimeLog> for Stream {
    fn from(log: TimeLog) -> Self {
        Self { log }
    }
}

impl Stream {
    /// Open `path` as a stream file.
    pub fn open(path: impl AsRef<Path>, config: YamalConfig) -> Result<Self> {
        TimeLog::open(path, config).map(Self::from)
    }

    /// The underlying time log.
    pub fn log(&self) -> &TimeLog {
        &self.log
    }

    /// Reserve a record for `stream`.
    pub fn reserve(&self, size: usize) -> Result<TimedReservation<'_>> {
        self.log.reserve(size)
    }

    /// Publish a reservation on `stream`.
    pub fn commit(
        &self,
        reservation: TimedReservation<'_>,
        stream: StreamList,
        timestamp: i64,
    ) -> Result<ListIter> {
        self.log.commit(reservation, stream.index(), timestamp)
    }

    /// Append `payload` to `stream`.
    pub fn write(&self, stream: StreamList, timestamp: i64, payload: &[u8]) -> Result<ListIter> {
        self.log.append(stream.index(), timestamp, payload)
    }

    /// Iterator on the first record of `stream`.
    pub fn begin(&self, stream: StreamList) -> Result<ListIter> {
        self.log.begin(stream.index())
    }

    /// Iterator past the current last record of `stream`.
    pub fn end(&self, stream: StreamList) -> Result<ListIter> {
        self.log.end(stream.index())
    }

    /// Advance `iter`.
    pub fn next(&self, iter: &mut ListIter) -> Result<IterState> {
        self.log.next(iter)
    }

    /// Read the record an iterator is on.
    pub fn read(&self, iter: &ListIter) -> Result<TimedRecord<'_>> {
        self.log.read(iter)
    }

    /// Close every list in index order.
    ///
    /// Keeps going after a failure and returns the first error seen.
    pub fn close_all(&self) -> Result<()> {
        let yamal = self.log.yamal();
        let mut first = None;
        for list in ListIndex::all() {
            if let Err(e) = yamal.close_list(list) {
                tracing::warn!(list = %list, error = %e, "Failed to close list");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Flush every list to disk.
    pub fn flush_all(&self) -> Result<()> {
        self.log.yamal().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LIST_COUNT;
    use tempfile::tempdir;

    #[test]
    fn stream_names_roundtrip() {
        for stream in StreamList::ALL {
            assert_eq!(stream.name().parse::<StreamList>().unwrap(), stream);
            assert_eq!(StreamList::from_index(stream.index()), Some(stream));
        }
        assert_eq!("Peer-Announcement".parse::<StreamList>().unwrap(), StreamList::PeerAnnouncement);
        assert!("bogus".parse::<StreamList>().is_err());
        assert_eq!(StreamList::from_index(ListIndex::MAX), None);
    }

    #[test]
    fn close_all_closes_every_list() {
        let dir = tempdir().unwrap();
        let stream = Stream::open(dir.path().join("s.ytp"), YamalConfig::for_testing()).unwrap();
        stream.write(StreamList::Data, 1, b"msg").unwrap();

        stream.close_all().unwrap();
        let yamal = stream.log().yamal();
        let closed = ListIndex::all()
            .filter(|&list| yamal.is_list_closed(list).unwrap())
            .count();
        assert_eq!(closed, LIST_COUNT);

        assert!(matches!(
            stream.write(StreamList::Data, 2, b"late"),
            Err(YamalError::ListClosed { list }) if list == DATA
        ));
        stream.close_all().unwrap();
    }

    #[test]
    fn close_all_reports_first_error() {
        let dir = tempdir().unwrap();
        let config = YamalConfig::for_testing().with_closable(false);
        let stream = Stream::open(dir.path().join("s.ytp"), config).unwrap();
        assert!(matches!(stream.close_all(), Err(YamalError::NotClosable)));
    }

    #[test]
    fn streams_are_separate_lists() {
        let dir = tempdir().unwrap();
        let stream = Stream::open(dir.path().join("s.ytp"), YamalConfig::for_testing()).unwrap();
        stream.write(StreamList::Data, 100, b"A1").unwrap();
        stream.write(StreamList::PeerAnnouncement, 50, b"B1").unwrap();

        let mut iter = stream.begin(StreamList::PeerAnnouncement).unwrap();
        assert_eq!(stream.read(&iter).unwrap().payload(), b"B1");
        assert_eq!(
            stream.next(&mut iter).unwrap(),
            IterState::AtListEnd(PEER_ANNOUNCEMENT)
        );
    }
}
