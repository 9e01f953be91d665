//! Paged memory mapping of the backing file.
//!
//! The file is mapped in fixed-size pages on demand. A page, once mapped,
//! stays at the same address until the storage is dropped, so every
//! reference handed out is tied to the lifetime of the storage rather than
//! to a particular mapping generation. Positions are always exchanged as
//! [`Offset`]s and resolved to a page on each access.

use super::header::{
    CLOSABLE, CLOSABLE_FIELD, FileHeader, HEADER_SIZE, MAGIC_FIELD, PAGE_SIZE_FIELD,
    RESERVED_FIELD, UNCLOSABLE, YAMAL_MAGIC, closable_flag, validate_page_size,
};
use crate::config::YamalConfig;
use crate::error::{Result, YamalError};
use crate::types::Offset;
use fs2::FileExt;
use memmap2::{MmapOptions, MmapRaw};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Record alignment.
pub(crate) const ALIGNMENT: u64 = 8;

/// Round `len` up to the record alignment.
pub(crate) const fn align(len: u64) -> u64 {
    (len + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// One mapped page of the file.
struct Page {
    map: MmapRaw,
}

/// Little-endian 64-bit word living inside the mapping.
///
/// Values are stored little-endian regardless of the host so files can be
/// shared between machines.
#[derive(Clone, Copy)]
pub(crate) struct AtomicLe64<'a>(&'a AtomicU64);

impl AtomicLe64<'_> {
    pub(crate) fn load(&self, order: Ordering) -> u64 {
        u64::from_le(self.0.load(order))
    }

    pub(crate) fn store(&self, value: u64, order: Ordering) {
        self.0.store(value.to_le(), order);
    }

    /// Compare-and-swap. On failure returns the value currently stored.
    pub(crate) fn compare_exchange(&self, current: u64, new: u64) -> std::result::Result<u64, u64> {
        self.0
            .compare_exchange(current.to_le(), new.to_le(), Ordering::AcqRel, Ordering::Acquire)
            .map(u64::from_le)
            .map_err(u64::from_le)
    }

    /// Add to the stored value, returning the previous value.
    pub(crate) fn fetch_add(&self, delta: u64) -> u64 {
        if cfg!(target_endian = "little") {
            return self.0.fetch_add(delta, Ordering::AcqRel);
        }
        let mut current = self.load(Ordering::Acquire);
        loop {
            match self.compare_exchange(current, current.wrapping_add(delta)) {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }

    /// Set the word to `value` unless it already holds something else.
    ///
    /// Returns the stored value on mismatch.
    pub(crate) fn expect_or_init(&self, value: u64) -> std::result::Result<(), u64> {
        match self.compare_exchange(0, value) {
            Ok(_) => Ok(()),
            Err(actual) if actual == value => Ok(()),
            Err(actual) => Err(actual),
        }
    }
}

/// Little-endian 32-bit word living inside the mapping.
#[derive(Clone, Copy)]
pub(crate) struct AtomicLe32<'a>(&'a AtomicU32);

impl AtomicLe32<'_> {
    pub(crate) fn load(&self, order: Ordering) -> u32 {
        u32::from_le(self.0.load(order))
    }

    pub(crate) fn store(&self, value: u32, order: Ordering) {
        self.0.store(value.to_le(), order);
    }

    pub(crate) fn expect_or_init(&self, value: u32) -> std::result::Result<(), u32> {
        match self.0.compare_exchange(
            0,
            value.to_le(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(actual) if u32::from_le(actual) == value => Ok(()),
            Err(actual) => Err(u32::from_le(actual)),
        }
    }
}

/// The backing file and its page mappings.
pub(crate) struct MappedStorage {
    path: PathBuf,
    file: File,
    read_only: bool,
    closable: bool,
    page_size: u64,
    max_size: u64,
    pages: Box<[OnceLock<Page>]>,
    /// Serializes file growth and page mapping within this process.
    grow_lock: Mutex<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MappedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedStorage")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("page_size", &self.page_size)
            .field("mapped_pages", &self.mapped_pages())
            .finish()
    }
}

impl MappedStorage {
    /// Open or create the file at `path`.
    ///
    /// An empty file opened for writing is initialized with a fresh header.
    /// Existing files keep the page size recorded in their header.
    pub(crate) fn open(path: &Path, config: &YamalConfig) -> Result<Self> {
        let path = path.to_path_buf();

        let mut file = if config.read_only {
            OpenOptions::new().read(true).open(&path)
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
        }
        .map_err(|e| YamalError::io(&path, e))?;

        let file_size = file
            .metadata()
            .map_err(|e| YamalError::io(&path, e))?
            .len();

        let page_size = bootstrap_page_size(&path, &mut file, file_size, config)?;

        let capacity = config.max_size.max(file_size);
        let page_count = (capacity / page_size).max(1);
        let pages = (0..page_count).map(|_| OnceLock::new()).collect();

        let mut storage = Self {
            path,
            file,
            read_only: config.read_only,
            closable: config.closable,
            page_size,
            max_size: config.max_size,
            pages,
            grow_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        };

        if storage.read_only {
            storage.check_header()?;
        } else {
            storage.init_header(config.closable)?;
        }

        tracing::info!(
            path = %storage.path.display(),
            page_size,
            read_only = storage.read_only,
            closable = storage.closable,
            reserved = storage.reserved_size(),
            "Opened yamal file"
        );

        Ok(storage)
    }

    /// Claim header fields of a writable file.
    ///
    /// Each field is set only if still zero, so concurrent openers agree on
    /// one layout. The magic is written last and marks the file as usable.
    fn init_header(&self, closable: bool) -> Result<()> {
        let page_size = self.page_size as u32;
        self.atomic_u32(PAGE_SIZE_FIELD)?
            .expect_or_init(page_size)
            .map_err(|stored| {
                self.invalid_format(format!(
                    "page size {stored} in header differs from {page_size}"
                ))
            })?;

        match self
            .atomic_u32(CLOSABLE_FIELD)?
            .expect_or_init(closable_flag(closable))
        {
            Ok(()) => {}
            Err(CLOSABLE | UNCLOSABLE) => {
                return Err(YamalError::ClosableMismatch {
                    configured: closable,
                    stored: !closable,
                });
            }
            Err(other) => {
                return Err(self.invalid_format(format!("unknown closable flag {other}")));
            }
        }

        let reserved = self.atomic_u64(RESERVED_FIELD)?;
        if let Err(stored) = reserved.expect_or_init(HEADER_SIZE)
            && stored < HEADER_SIZE
        {
            return Err(self.invalid_format(format!("reserved size {stored} overlaps the header")));
        }

        self.atomic_u64(MAGIC_FIELD)?
            .expect_or_init(YAMAL_MAGIC)
            .map_err(|stored| self.invalid_format(format!("bad magic 0x{stored:016x}")))?;

        Ok(())
    }

    fn check_header(&mut self) -> Result<()> {
        let magic = self.atomic_u64(MAGIC_FIELD)?.load(Ordering::Acquire);
        if magic != YAMAL_MAGIC {
            return Err(self.invalid_format("header is not initialized".to_string()));
        }
        self.closable = match self.atomic_u32(CLOSABLE_FIELD)?.load(Ordering::Acquire) {
            CLOSABLE => true,
            UNCLOSABLE => false,
            other => return Err(self.invalid_format(format!("unknown closable flag {other}"))),
        };
        Ok(())
    }

    fn invalid_format(&self, cause: String) -> YamalError {
        YamalError::InvalidFormat {
            path: self.path.clone(),
            cause,
        }
    }

    /// Path of the backing file.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether lists in this file can be closed.
    pub(crate) fn is_closable(&self) -> bool {
        self.closable
    }

    pub(crate) fn page_size(&self) -> u64 {
        self.page_size
    }

    pub(crate) fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Bytes covered by whole pages, the real upper bound on reservations.
    fn capacity(&self) -> u64 {
        self.pages.len() as u64 * self.page_size
    }

    /// Number of pages currently mapped by this handle.
    pub(crate) fn mapped_pages(&self) -> usize {
        self.pages.iter().filter(|page| page.get().is_some()).count()
    }

    /// Mark the storage closed. Mappings stay valid until drop.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fail with `HandleClosed` once [`MappedStorage::close`] was called.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(YamalError::HandleClosed)
        } else {
            Ok(())
        }
    }

    /// Fail with `ReadOnly` for read-only mappings.
    pub(crate) fn ensure_writable(&self, operation: &'static str) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            Err(YamalError::ReadOnly { operation })
        } else {
            Ok(())
        }
    }

    /// End of the reserved area.
    pub(crate) fn reserved_size(&self) -> u64 {
        self.atomic_u64(RESERVED_FIELD)
            .map(|word| word.load(Ordering::Acquire))
            .unwrap_or(HEADER_SIZE)
    }

    /// Claim `len` bytes (already aligned) that do not cross a page boundary.
    ///
    /// When the remainder of the current page is too small the cursor skips
    /// to the start of the next page.
    ///
    /// The returned region is exclusively owned by the caller. The page
    /// containing it is mapped before returning.
    pub(crate) fn reserve_region(&self, len: u64) -> Result<Offset> {
        self.ensure_writable("reserve")?;
        debug_assert_eq!(len, align(len));

        if len == 0 || len > self.page_size {
            return Err(YamalError::InvalidSize {
                requested: len,
                max: self.page_size,
            });
        }

        let cursor = self.atomic_u64(RESERVED_FIELD)?;
        let mut current = cursor.load(Ordering::Acquire);
        loop {
            let mut start = current;
            if start % self.page_size + len > self.page_size {
                start = (start / self.page_size + 1) * self.page_size;
            }
            let end = start + len;

            if end > self.capacity() {
                return Err(YamalError::Memory {
                    offset: Offset::new(start),
                    len,
                    cause: format!(
                        "file would exceed the mappable size of {} bytes",
                        self.capacity()
                    ),
                });
            }

            match cursor.compare_exchange(current, end) {
                Ok(_) => {
                    self.page(start / self.page_size)?;
                    return Ok(Offset::new(start));
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Map page `index`, growing the file when needed.
    pub(crate) fn allocate_page(&self, index: u64) -> Result<()> {
        self.ensure_open()?;
        self.page(index).map(|_| ())
    }

    /// Map every page up to `ahead` bytes past the reservation cursor.
    pub(crate) fn preallocate(&self, ahead: u64) -> Result<()> {
        let reserved = self.reserved_size();
        let target = reserved.saturating_add(ahead).min(self.capacity());
        let first = reserved / self.page_size;
        let last = target.saturating_sub(1) / self.page_size;
        for index in first..=last.min(self.pages.len() as u64 - 1) {
            self.page(index)?;
        }
        Ok(())
    }

    /// Flush all mapped pages to disk.
    pub(crate) fn sync(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        for page in self.pages.iter().filter_map(OnceLock::get) {
            page.map.flush().map_err(|e| YamalError::io(&self.path, e))?;
        }
        Ok(())
    }

    fn page(&self, index: u64) -> Result<&Page> {
        let slot = self.pages.get(index as usize).ok_or_else(|| YamalError::Memory {
            offset: Offset::new(index.saturating_mul(self.page_size)),
            len: self.page_size,
            cause: format!("page {index} is past the maximum file size"),
        })?;

        if let Some(page) = slot.get() {
            return Ok(page);
        }

        let _guard = self.grow_lock.lock();
        if let Some(page) = slot.get() {
            return Ok(page);
        }
        let page = self.map_page(index)?;
        Ok(slot.get_or_init(|| page))
    }

    fn map_page(&self, index: u64) -> Result<Page> {
        let start = index * self.page_size;
        let end = start + self.page_size;

        let map = if self.read_only {
            let file_size = self
                .file
                .metadata()
                .map_err(|e| YamalError::io(&self.path, e))?
                .len();
            if file_size < end {
                return Err(YamalError::Eof {
                    offset: Offset::new(start),
                    file_size,
                });
            }
            MmapOptions::new()
                .offset(start)
                .len(self.page_size as usize)
                .map_raw_read_only(&self.file)
        } else {
            self.file.allocate(end).map_err(|e| YamalError::Memory {
                offset: Offset::new(start),
                len: self.page_size,
                cause: format!("failed to grow file: {e}"),
            })?;
            MmapOptions::new()
                .offset(start)
                .len(self.page_size as usize)
                .map_raw(&self.file)
        }
        .map_err(|e| YamalError::Memory {
            offset: Offset::new(start),
            len: self.page_size,
            cause: e.to_string(),
        })?;

        tracing::debug!(page = index, offset = start, len = self.page_size, "Mapped page");
        Ok(Page { map })
    }

    /// Raw pointer to `offset`, which must not cross a page boundary with
    /// the following `len` bytes.
    fn ptr(&self, offset: u64, len: u64) -> Result<*mut u8> {
        let index = offset / self.page_size;
        let within = offset % self.page_size;
        if within + len > self.page_size {
            return Err(YamalError::InvalidOffset {
                offset: Offset::new(offset),
                cause: format!("{len} bytes cross a page boundary"),
            });
        }
        let page = self.page(index)?;
        // SAFETY: `within + len` lies inside the page mapping.
        Ok(unsafe { page.map.as_mut_ptr().add(within as usize) })
    }

    /// Atomic view of the 8-byte aligned word at `offset`.
    pub(crate) fn atomic_u64(&self, offset: u64) -> Result<AtomicLe64<'_>> {
        debug_assert_eq!(offset % 8, 0);
        let ptr = self.ptr(offset, 8)?;
        // SAFETY: the pointer is 8-byte aligned (pages are page-aligned and
        // the offset is a multiple of 8) and stays mapped while `self` lives.
        // All concurrent access to header and link words goes through atomics.
        Ok(AtomicLe64(unsafe { AtomicU64::from_ptr(ptr.cast()) }))
    }

    /// Atomic view of the 4-byte aligned word at `offset`.
    pub(crate) fn atomic_u32(&self, offset: u64) -> Result<AtomicLe32<'_>> {
        debug_assert_eq!(offset % 4, 0);
        let ptr = self.ptr(offset, 4)?;
        // SAFETY: as for `atomic_u64`, with 4-byte alignment.
        Ok(AtomicLe32(unsafe { AtomicU32::from_ptr(ptr.cast()) }))
    }

    /// Bytes at `offset` belonging to a committed record.
    pub(crate) fn bytes(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let ptr = self.ptr(offset, len)?;
        // SAFETY: the range is mapped for the lifetime of `self`. Committed
        // payloads are never written again.
        Ok(unsafe { std::slice::from_raw_parts(ptr, len as usize) })
    }

    /// Mutable bytes of a region returned by [`MappedStorage::reserve_region`].
    ///
    /// # Safety
    ///
    /// The caller must own the region exclusively: it was reserved by the
    /// caller and has not been published yet.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, offset: u64, len: u64) -> Result<&mut [u8]> {
        let ptr = self.ptr(offset, len)?;
        // SAFETY: guaranteed exclusive by the caller; the range is mapped
        // writable for the lifetime of `self`.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, len as usize) })
    }
}

/// Determine the page size before anything is mapped.
fn bootstrap_page_size(
    path: &Path,
    file: &mut File,
    file_size: u64,
    config: &YamalConfig,
) -> Result<u64> {
    let invalid = |cause: &str| YamalError::InvalidFormat {
        path: path.to_path_buf(),
        cause: cause.to_string(),
    };

    if file_size == 0 {
        if config.read_only {
            return Err(invalid("file is empty"));
        }
        return Ok(config.page_size);
    }
    if file_size < HEADER_SIZE {
        return Err(invalid("file is smaller than the header"));
    }

    let mut bytes = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut bytes)
        .map_err(|e| YamalError::io(path, e))?;
    let header = FileHeader::from_bytes(&bytes).map_err(|e| invalid(&e.to_string()))?;

    if header.is_initialized() {
        header.validate().map_err(invalid)?;
        return Ok(u64::from(header.page_size));
    }
    if header.magic != 0 {
        return Err(invalid("magic number does not match"));
    }

    // Another opener is still initializing the header.
    match u64::from(header.page_size) {
        0 if config.read_only => Err(invalid("header is not initialized")),
        0 => Ok(config.page_size),
        page_size => {
            validate_page_size(page_size).map_err(invalid)?;
            Ok(page_size)
        }
    }
}
