//! Error types for yamal.
//!
//! Every failure is returned as a value. Variants carry the offset, list or
//! path involved and a stable code, grouped by the kind of problem:
//!
//! - structural (`E0xx`): the file content cannot be trusted
//! - resource (`E2xx`): the request could not be satisfied right now
//! - policy (`E3xx`): the caller asked for something this handle forbids
//! - protocol (`E4xx`): announcement-layer errors, kept distinct from
//!   storage corruption
//! - I/O and configuration (`E9xx`)

use crate::types::{ListIndex, Offset};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for yamal operations.
#[derive(Error, Debug)]
pub enum YamalError {
    // =========================================================================
    // Structural errors (E001-E099)
    // =========================================================================
    /// The file header does not carry the expected magic or layout.
    #[error("E001: Invalid yamal file format in {path}: {cause}")]
    InvalidFormat {
        /// The file that failed validation.
        path: PathBuf,
        /// What did not match.
        cause: String,
    },

    /// The file ended before a region that must exist.
    #[error("E002: Unexpected end of file at offset {offset}: file is {file_size} bytes")]
    Eof {
        /// The offset that could not be mapped.
        offset: Offset,
        /// Current size of the file.
        file_size: u64,
    },

    /// An offset does not address a valid record.
    #[error("E003: Invalid offset {offset}: {cause}")]
    InvalidOffset {
        /// The invalid offset.
        offset: Offset,
        /// Reason why the offset is invalid.
        cause: String,
    },

    /// A list index outside `[LIST_MIN, LIST_MAX]`.
    #[error("E004: List index {index} is out of range")]
    InvalidList {
        /// The rejected index.
        index: u64,
    },

    // =========================================================================
    // Resource errors (E200-E299)
    // =========================================================================
    /// Requested record size is zero or over the configured limit.
    #[error("E201: Invalid record size {requested}: must be between 1 and {max} bytes")]
    InvalidSize {
        /// Number of payload bytes requested.
        requested: u64,
        /// Largest payload this handle accepts.
        max: u64,
    },

    /// Growing or mapping the file failed.
    #[error("E202: Failed to map {len} bytes at offset {offset}: {cause}")]
    Memory {
        /// Start of the region that could not be provided.
        offset: Offset,
        /// Length of the region.
        len: u64,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Policy errors (E300-E399)
    // =========================================================================
    /// A write was attempted through a read-only mapping.
    #[error("E301: Unable to {operation} using a read-only mapping")]
    ReadOnly {
        /// The rejected operation.
        operation: &'static str,
    },

    /// The handle has been closed.
    #[error("E302: The yamal handle is closed")]
    HandleClosed,

    /// A commit targeted a list that has been closed.
    #[error("E303: {list} is closed")]
    ListClosed {
        /// The closed list.
        list: ListIndex,
    },

    /// Closing lists was requested on a file created as unclosable.
    #[error("E304: Unable to close lists of an unclosable file")]
    NotClosable,

    /// The closable setting differs from the one recorded in the file.
    #[error("E305: Configured closable={configured} differs from closable={stored} in file")]
    ClosableMismatch {
        /// Setting requested by the caller.
        configured: bool,
        /// Setting recorded in the file header.
        stored: bool,
    },

    // =========================================================================
    // Protocol errors (E400-E499)
    // =========================================================================
    /// A referenced peer has not been announced.
    #[error("E401: Peer not found: {peer}")]
    PeerNotFound {
        /// Peer name or reference.
        peer: String,
    },

    /// A referenced channel has not been announced.
    #[error("E402: Channel not found: {channel}")]
    ChannelNotFound {
        /// Channel name or reference.
        channel: String,
    },

    /// A peer announcement record is malformed.
    #[error("E403: Malformed peer announcement at offset {offset}: {cause}")]
    PeerAnnouncement {
        /// Offset of the announcement record.
        offset: Offset,
        /// What was wrong with it.
        cause: String,
    },

    /// A channel announcement record is malformed.
    #[error("E404: Malformed channel announcement at offset {offset}: {cause}")]
    ChannelAnnouncement {
        /// Offset of the announcement record.
        offset: Offset,
        /// What was wrong with it.
        cause: String,
    },

    // =========================================================================
    // I/O and configuration errors (E900-E999)
    // =========================================================================
    /// Generic I/O error on the backing file.
    #[error("E901: I/O error on {path}: {cause}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Invalid configuration value.
    #[error("E902: Invalid configuration for '{field}': {cause}")]
    Config {
        /// The configuration field.
        field: &'static str,
        /// Why the value was rejected.
        cause: String,
    },
}

/// Coarse classification of a [`YamalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad format, corrupted offset or unexpected EOF. Fatal to the handle.
    Structural,
    /// Out of memory or size limits. The caller may retry.
    Resource,
    /// Usage errors such as writing through a read-only handle.
    Policy,
    /// Announcement-layer errors.
    Protocol,
    /// Operating-system or configuration errors.
    Environment,
}

impl YamalError {
    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => "E001",
            Self::Eof { .. } => "E002",
            Self::InvalidOffset { .. } => "E003",
            Self::InvalidList { .. } => "E004",
            Self::InvalidSize { .. } => "E201",
            Self::Memory { .. } => "E202",
            Self::ReadOnly { .. } => "E301",
            Self::HandleClosed => "E302",
            Self::ListClosed { .. } => "E303",
            Self::NotClosable => "E304",
            Self::ClosableMismatch { .. } => "E305",
            Self::PeerNotFound { .. } => "E401",
            Self::ChannelNotFound { .. } => "E402",
            Self::PeerAnnouncement { .. } => "E403",
            Self::ChannelAnnouncement { .. } => "E404",
            Self::Io { .. } => "E901",
            Self::Config { .. } => "E902",
        }
    }

    /// Classify the error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidFormat { .. }
            | Self::Eof { .. }
            | Self::InvalidOffset { .. }
            | Self::InvalidList { .. } => ErrorCategory::Structural,
            Self::InvalidSize { .. } | Self::Memory { .. } => ErrorCategory::Resource,
            Self::ReadOnly { .. }
            | Self::HandleClosed
            | Self::ListClosed { .. }
            | Self::NotClosable
            | Self::ClosableMismatch { .. } => ErrorCategory::Policy,
            Self::PeerNotFound { .. }
            | Self::ChannelNotFound { .. }
            | Self::PeerAnnouncement { .. }
            | Self::ChannelAnnouncement { .. } => ErrorCategory::Protocol,
            Self::Io { .. } | Self::Config { .. } => ErrorCategory::Environment,
        }
    }

    /// Check if this error is retriable.
    ///
    /// Only growth failures qualify: the file and mapping stay valid and a
    /// later reserve may succeed once resources are freed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Memory { .. })
    }

    /// Check if the error indicates the file content cannot be trusted.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        self.category() == ErrorCategory::Structural
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            cause: err.to_string(),
        }
    }
}

/// Result type alias using `YamalError`.
pub type Result<T> = std::result::Result<T, YamalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_correct() {
        let err = YamalError::InvalidFormat {
            path: PathBuf::from("/tmp/test.ytp"),
            cause: "bad magic".to_string(),
        };
        assert_eq!(err.code(), "E001");
        assert_eq!(YamalError::HandleClosed.code(), "E302");
        assert_eq!(
            YamalError::ReadOnly {
                operation: "reserve"
            }
            .code(),
            "E301"
        );
    }

    #[test]
    fn error_display() {
        let err = YamalError::InvalidSize {
            requested: 0,
            max: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("E201"));
        assert!(msg.contains("1024"));

        let err = YamalError::InvalidOffset {
            offset: Offset::new(0x40),
            cause: "not aligned".to_string(),
        };
        assert!(err.to_string().contains("0x00000040"));
    }

    #[test]
    fn categories() {
        assert!(
            YamalError::Eof {
                offset: Offset::new(0),
                file_size: 0
            }
            .is_structural()
        );
        assert_eq!(
            YamalError::PeerNotFound {
                peer: "p".to_string()
            }
            .category(),
            ErrorCategory::Protocol
        );
        assert_eq!(YamalError::NotClosable.category(), ErrorCategory::Policy);
    }

    #[test]
    fn retriable_errors() {
        assert!(
            YamalError::Memory {
                offset: Offset::new(0),
                len: 8,
                cause: "ENOSPC".to_string()
            }
            .is_retriable()
        );
        assert!(
            !YamalError::ReadOnly {
                operation: "commit"
            }
            .is_retriable()
        );
    }
}
