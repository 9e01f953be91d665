//! The yamal handle.

use crate::config::YamalConfig;
use crate::directory::ListDirectory;
use crate::error::Result;
use crate::iter::{IterState, ListIter, Records};
use crate::maintenance::Maintenance;
use crate::record::{self, Record, Reservation};
use crate::stats::{self, YamalStats};
use crate::storage::MappedStorage;
use crate::types::{ListIndex, Offset};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

struct YamalInner {
    storage: Arc<MappedStorage>,
    max_payload: u64,
    sync_on_close: bool,
    maintenance: Mutex<Option<Maintenance>>,
}

impl YamalInner {
    fn shutdown(&self) -> Result<()> {
        if let Some(mut maintenance) = self.maintenance.lock().take() {
            maintenance.stop();
        }
        if !self.storage.close() {
            return Ok(());
        }
        tracing::debug!(path = %self.storage.path().display(), "Closing yamal file");
        if self.sync_on_close {
            self.storage.sync()?;
        }
        Ok(())
    }
}

impl Drop for YamalInner {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Failed to flush yamal file on drop");
        }
    }
}

/// Handle to a memory-mapped multi-list log.
///
/// `Yamal` is cheap to clone; clones share the same mapping. It is `Send`
/// and `Sync`, so any number of threads may reserve, commit and iterate
/// concurrently. Several processes may map the same file at once.
///
/// # Example
///
/// ```no_run
/// use yamal_core::{ListIndex, Yamal, YamalConfig};
///
/// let yamal = Yamal::open("/tmp/example.ytp", YamalConfig::default())?;
/// let list = ListIndex::new(0)?;
///
/// let mut reservation = yamal.reserve(5)?;
/// reservation.copy_from_slice(b"hello");
/// let iter = yamal.commit(reservation, list)?;
///
/// assert_eq!(yamal.read(&iter)?.payload(), b"hello");
/// # Ok::<(), yamal_core::YamalError>(())
/// ```
#[derive(Clone)]
pub struct Yamal {
    inner: Arc<YamalInner>,
}

impl std::fmt::Debug for Yamal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Yamal")
            .field("storage", &self.inner.storage)
            .finish()
    }
}

impl Yamal {
    /// Open `path`, creating and initializing it when empty or missing
    /// (unless read-only).
    pub fn open(path: impl AsRef<Path>, config: YamalConfig) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(MappedStorage::open(path.as_ref(), &config)?);
        let max_payload = config.max_payload(storage.page_size());

        let maintenance = match config.maintenance {
            Some(maintenance) if !storage.is_read_only() => {
                Some(Maintenance::spawn(&storage, maintenance)?)
            }
            _ => None,
        };

        Ok(Self {
            inner: Arc::new(YamalInner {
                storage,
                max_payload,
                sync_on_close: config.sync_on_close && !config.read_only,
                maintenance: Mutex::new(maintenance),
            }),
        })
    }

    pub(crate) fn storage(&self) -> &MappedStorage {
        &self.inner.storage
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.storage().path()
    }

    /// Whether the file is mapped read-only.
    pub fn is_read_only(&self) -> bool {
        self.storage().is_read_only()
    }

    /// Whether lists in this file can be closed.
    pub fn is_closable(&self) -> bool {
        self.storage().is_closable()
    }

    /// Mapping page size of the file.
    pub fn page_size(&self) -> u64 {
        self.storage().page_size()
    }

    /// Largest payload `reserve` accepts.
    pub fn max_record_size(&self) -> u64 {
        self.inner.max_payload
    }

    /// Reserve a zeroed record of `size` payload bytes.
    ///
    /// The record is invisible to readers until passed to
    /// [`Yamal::commit`].
    pub fn reserve(&self, size: usize) -> Result<Reservation<'_>> {
        record::reserve(self.storage(), self.inner.max_payload, size as u64)
    }

    /// Publish a reservation on `list`.
    ///
    /// Returns an iterator positioned on the new record.
    pub fn commit(&self, reservation: Reservation<'_>, list: ListIndex) -> Result<ListIter> {
        let offset = record::commit(self.storage(), reservation, list)?;
        Ok(ListIter::at(list, offset))
    }

    /// Reserve, fill and commit a record in one call.
    pub fn append(&self, list: ListIndex, payload: &[u8]) -> Result<ListIter> {
        let mut reservation = self.reserve(payload.len())?;
        reservation.copy_from_slice(payload);
        self.commit(reservation, list)
    }

    /// Read the record an iterator is on.
    pub fn read(&self, iter: &ListIter) -> Result<Record<'_>> {
        self.storage().ensure_open()?;
        iter.read(self.storage())
    }

    /// Read the committed record at `offset`.
    pub fn read_at(&self, offset: Offset) -> Result<Record<'_>> {
        self.storage().ensure_open()?;
        record::read(self.storage(), offset)
    }

    /// Iterator on the first record of `list`.
    pub fn begin(&self, list: ListIndex) -> Result<ListIter> {
        self.storage().ensure_open()?;
        ListIter::begin(self.storage(), list)
    }

    /// Iterator past the current last record of `list`.
    pub fn end(&self, list: ListIndex) -> Result<ListIter> {
        self.storage().ensure_open()?;
        ListIter::end(self.storage(), list)
    }

    /// Advance `iter`.
    ///
    /// [`IterState::AtListEnd`] is not final: call again later to pick up
    /// records committed since.
    pub fn next(&self, iter: &mut ListIter) -> Result<IterState> {
        self.storage().ensure_open()?;
        iter.advance(self.storage())
    }

    /// Iterator on a previously read record of `list`.
    ///
    /// Fails with `InvalidOffset` unless `offset` is a record committed to
    /// `list`.
    pub fn seek(&self, list: ListIndex, offset: Offset) -> Result<ListIter> {
        self.storage().ensure_open()?;
        ListIter::seek(self.storage(), list, offset)
    }

    /// All records of `list` from the beginning.
    pub fn records(&self, list: ListIndex) -> Result<Records<'_>> {
        Ok(Records::new(self.storage(), self.begin(list)?))
    }

    /// Records starting at the position of `iter`.
    pub fn records_from(&self, iter: ListIter) -> Records<'_> {
        Records::new(self.storage(), iter)
    }

    /// First record of `list`, [`Offset::NONE`] when empty.
    pub fn head(&self, list: ListIndex) -> Result<Offset> {
        self.storage().ensure_open()?;
        ListDirectory::new(self.storage()).head(list)
    }

    /// Last record of `list` known to the directory, [`Offset::NONE`] when
    /// empty.
    pub fn tail(&self, list: ListIndex) -> Result<Offset> {
        self.storage().ensure_open()?;
        ListDirectory::new(self.storage()).tail(list)
    }

    /// Close `list`; further commits to it fail with `ListClosed`.
    pub fn close_list(&self, list: ListIndex) -> Result<()> {
        self.storage().ensure_writable("close a list")?;
        ListDirectory::new(self.storage()).close(list)
    }

    /// Whether `list` has been closed.
    pub fn is_list_closed(&self, list: ListIndex) -> Result<bool> {
        self.storage().ensure_open()?;
        ListDirectory::new(self.storage()).is_closed(list)
    }

    /// End of the reserved area in bytes.
    pub fn reserved_size(&self) -> Result<u64> {
        self.storage().ensure_open()?;
        Ok(self.storage().reserved_size())
    }

    /// Map page `index` ahead of time, growing the file if needed.
    pub fn allocate_page(&self, index: u64) -> Result<()> {
        self.storage().ensure_writable("allocate a page")?;
        self.storage().allocate_page(index)
    }

    /// Last sequence number assigned by the time layer.
    pub fn last_sequence(&self) -> Result<u64> {
        self.storage().ensure_open()?;
        stats::last_sequence(self.storage())
    }

    /// Flush mapped pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.storage().ensure_open()?;
        self.storage().sync()
    }

    /// Collect file and per-list statistics.
    pub fn stats(&self) -> Result<YamalStats> {
        self.storage().ensure_open()?;
        stats::collect(self.storage())
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.storage().is_closed()
    }

    /// Close the handle.
    ///
    /// Stops background maintenance and flushes if configured. Every clone
    /// of this handle fails with `HandleClosed` afterwards.
    pub fn close(self) -> Result<()> {
        self.inner.shutdown()
    }
}
