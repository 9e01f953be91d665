//! File header layout.
//!
//! The header occupies the first [`HEADER_SIZE`] bytes of page 0. Live
//! fields are accessed atomically through the mapping; [`FileHeader`] is a
//! decoded snapshot used while bootstrapping and for inspection.

use crate::types::LIST_COUNT;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

/// Magic number for yamal files ("YAMAL001").
pub const YAMAL_MAGIC: u64 = u64::from_le_bytes(*b"YAMAL001");

/// Fixed size of the file header in bytes.
pub const HEADER_SIZE: u64 = 192;

/// Smallest accepted page size.
pub const MIN_PAGE_SIZE: u64 = 64 * 1024;

pub(crate) const MAGIC_FIELD: u64 = 0;
pub(crate) const PAGE_SIZE_FIELD: u64 = 8;
pub(crate) const CLOSABLE_FIELD: u64 = 12;
pub(crate) const RESERVED_FIELD: u64 = 16;
pub(crate) const SEQUENCE_FIELD: u64 = 24;
pub(crate) const DIRECTORY_FIELD: u64 = 64;

/// Size of one `{head, tail}` directory entry.
pub(crate) const DIRECTORY_ENTRY_SIZE: u64 = 16;

pub(crate) const CLOSABLE: u32 = 1;
pub(crate) const UNCLOSABLE: u32 = 2;

const _: () = assert!(DIRECTORY_FIELD + DIRECTORY_ENTRY_SIZE * LIST_COUNT as u64 == HEADER_SIZE);

/// Encode the closable flag as stored in the header.
pub(crate) const fn closable_flag(closable: bool) -> u32 {
    if closable { CLOSABLE } else { UNCLOSABLE }
}

/// Decoded copy of the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic number, zero while the file is being initialized.
    pub magic: u64,
    /// Page size the file was created with.
    pub page_size: u32,
    /// `Some(true)` for closable files, `None` while uninitialized.
    pub closable: Option<bool>,
    /// End of the reserved area.
    pub reserved: u64,
    /// Last assigned sequence number.
    pub sequence: u64,
    /// `(head, tail)` per list.
    pub directory: [(u64, u64); LIST_COUNT],
}

impl FileHeader {
    /// Read header from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if (bytes.len() as u64) < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Buffer too small for header",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);

        let magic = cursor.read_u64::<LittleEndian>()?;
        let page_size = cursor.read_u32::<LittleEndian>()?;
        let closable = match cursor.read_u32::<LittleEndian>()? {
            CLOSABLE => Some(true),
            UNCLOSABLE => Some(false),
            _ => None,
        };
        let reserved = cursor.read_u64::<LittleEndian>()?;
        let sequence = cursor.read_u64::<LittleEndian>()?;

        let mut padding = [0u8; (DIRECTORY_FIELD - SEQUENCE_FIELD - 8) as usize];
        cursor.read_exact(&mut padding)?;

        let mut directory = [(0u64, 0u64); LIST_COUNT];
        for entry in &mut directory {
            entry.0 = cursor.read_u64::<LittleEndian>()?;
            entry.1 = cursor.read_u64::<LittleEndian>()?;
        }

        Ok(Self {
            magic,
            page_size,
            closable,
            reserved,
            sequence,
            directory,
        })
    }

    /// Check if the header has been fully initialized.
    pub fn is_initialized(&self) -> bool {
        self.magic == YAMAL_MAGIC
    }

    /// Validate an initialized header.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != YAMAL_MAGIC {
            return Err("Invalid magic number");
        }
        validate_page_size(u64::from(self.page_size))?;
        if self.reserved < HEADER_SIZE {
            return Err("Reserved size is smaller than the header");
        }
        if self.closable.is_none() {
            return Err("Unknown closable flag");
        }
        Ok(())
    }
}

/// Check that a page size can be used to map the file.
pub(crate) fn validate_page_size(page_size: u64) -> Result<(), &'static str> {
    if !page_size.is_power_of_two() {
        return Err("Page size must be a power of two");
    }
    if page_size < MIN_PAGE_SIZE {
        return Err("Page size must be at least 64 KiB");
    }
    if page_size > u64::from(u32::MAX) {
        return Err("Page size must fit in 32 bits");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(magic: u64, page_size: u32, closable: u32, reserved: u64) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&magic.to_le_bytes());
        buf[8..12].copy_from_slice(&page_size.to_le_bytes());
        buf[12..16].copy_from_slice(&closable.to_le_bytes());
        buf[16..24].copy_from_slice(&reserved.to_le_bytes());
        buf[24..32].copy_from_slice(&7u64.to_le_bytes());
        buf[64..72].copy_from_slice(&256u64.to_le_bytes());
        buf[72..80].copy_from_slice(&512u64.to_le_bytes());
        buf
    }

    #[test]
    fn decode_header() {
        let bytes = encode(YAMAL_MAGIC, 1 << 20, CLOSABLE, 1024);
        let header = FileHeader::from_bytes(&bytes).unwrap();

        assert!(header.is_initialized());
        assert_eq!(header.page_size, 1 << 20);
        assert_eq!(header.closable, Some(true));
        assert_eq!(header.reserved, 1024);
        assert_eq!(header.sequence, 7);
        assert_eq!(header.directory[0], (256, 512));
        assert_eq!(header.directory[1], (0, 0));
        assert!(header.validate().is_ok());
    }

    #[test]
    fn header_validation() {
        let bad_magic = FileHeader::from_bytes(&encode(0xDEAD_BEEF, 1 << 20, CLOSABLE, 1024));
        assert!(bad_magic.unwrap().validate().is_err());

        let bad_page = FileHeader::from_bytes(&encode(YAMAL_MAGIC, 3000, CLOSABLE, 1024));
        assert!(bad_page.unwrap().validate().is_err());

        let bad_reserved = FileHeader::from_bytes(&encode(YAMAL_MAGIC, 1 << 20, CLOSABLE, 8));
        assert!(bad_reserved.unwrap().validate().is_err());
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(FileHeader::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn magic_spells_yamal() {
        assert_eq!(&YAMAL_MAGIC.to_le_bytes(), b"YAMAL001");
    }
}
