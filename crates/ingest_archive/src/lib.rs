//! A unified archive inspection and extraction layer for the ingestion
//! pipeline.
//!
//! This crate presents one abstraction over zip, 7z, rar and tar-based
//! archives, and guarantees that password-protected content is detected
//! *before* any extraction happens.
//!
//! # Examples
//!
//! ```no_run
//! use ingest_archive::{ArchiveReader, ArchiveError};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), ArchiveError> {
//! let reader = ArchiveReader::new();
//! match reader.open_path(Path::new("upload.zip")) {
//!     Ok(handle) => {
//!         for member in handle.members() {
//!             println!("{} ({} bytes)", member.name, member.size);
//!         }
//!     }
//!     Err(ArchiveError::PasswordProtected { .. }) => {
//!         // terminal: never retried, never extracted
//!     }
//!     Err(err) => return Err(err),
//! }
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod encryption;
pub mod error;
pub mod format;
pub mod handle;
pub mod limits;

pub use bundle::{is_geo_bundle, is_reserved_bundle_extension};
pub use error::{ArchiveError, Result};
pub use format::ArchiveFormat;
pub use handle::{ArchiveHandle, ArchiveMember, ArchiveReader};
pub use limits::ArchiveLimits;

/// Check if a filename has a known archive extension.
pub fn is_archive_filename(filename: &str) -> bool {
    ArchiveFormat::detect_from_filename(filename).is_some()
}

/// Check if a byte buffer starts like a known archive format.
pub fn is_archive_content(header: &[u8]) -> bool {
    ArchiveFormat::sniff_from_bytes(header).is_some()
}
