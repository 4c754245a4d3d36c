//! Error types for archive inspection and extraction.

use crate::format::ArchiveFormat;

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Error type for archive operations.
///
/// Password protection and unsupported codecs are terminal for the owning
/// ingestion run; plain I/O errors may be retried by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// I/O error during archive operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive (or at least one member) is password protected.
    #[error("{} archive is password protected", .format.name())]
    PasswordProtected { format: ArchiveFormat },

    /// Content is not an archive at all.
    #[error("not an archive: {detail}")]
    NotAnArchive { detail: String },

    /// Recognized as archive-like, but the codec or feature is unsupported.
    #[error("unsupported {} archive: {reason}", .format.name())]
    Unsupported {
        format: ArchiveFormat,
        reason: String,
    },

    /// Archive structure is recognized but unreadable.
    #[error("corrupt {} archive: {message}", .format.name())]
    Corrupt {
        format: ArchiveFormat,
        message: String,
    },

    /// `extract_single` on an archive that does not hold exactly one member.
    #[error("expected exactly one member, archive has {count}")]
    NotSingleMember { count: usize },

    /// Requested member is not present in the archive.
    #[error("no such member: {name}")]
    MemberNotFound { name: String },

    /// A safety limit was exceeded while listing or extracting.
    #[error("archive {what} limit exceeded: {observed} > {limit}")]
    LimitExceeded {
        what: &'static str,
        limit: u64,
        observed: u64,
    },
}

impl ArchiveError {
    /// Create a new not-an-archive error.
    pub fn not_an_archive(detail: impl Into<String>) -> Self {
        Self::NotAnArchive {
            detail: detail.into(),
        }
    }

    /// Create a new unsupported-archive error.
    pub fn unsupported(format: ArchiveFormat, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            format,
            reason: reason.into(),
        }
    }

    /// Create a new corrupt-archive error.
    pub fn corrupt(format: ArchiveFormat, message: impl Into<String>) -> Self {
        Self::Corrupt {
            format,
            message: message.into(),
        }
    }

    /// Terminal errors must not be retried: rerunning reproduces them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
