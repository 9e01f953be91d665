//! Growable memory-mapped storage.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Header (192 bytes): magic, page size, closable flag,             │
//! │ reservation cursor, last sequence, list directory                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Record area (append-only, 8-byte aligned)                        │
//! │ ┌──────────────────────────────────────────────────────────────┐ │
//! │ │ [size: u32][list: u32][next: u64][payload ...]               │ │
//! │ ├──────────────────────────────────────────────────────────────┤ │
//! │ │ ...                                                          │ │
//! │ └──────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The file is mapped page by page and records never straddle a page, so a
//! mapped address never moves once handed out.

mod header;
mod mapped;

pub use header::{FileHeader, HEADER_SIZE, MIN_PAGE_SIZE, YAMAL_MAGIC};

pub(crate) use header::{DIRECTORY_ENTRY_SIZE, DIRECTORY_FIELD, SEQUENCE_FIELD, validate_page_size};
pub(crate) use mapped::{AtomicLe32, AtomicLe64, MappedStorage, align};
