//! Safety limits applied while listing and extracting archives.
//!
//! Declared sizes in archive metadata are untrusted; the extraction path
//! re-checks actual output against the same limits so a lying header cannot
//! bypass them.

use crate::error::{ArchiveError, Result};

/// Limits applied to a single archive.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    /// Maximum number of members an archive may declare.
    pub max_members: u64,
    /// Maximum total uncompressed output in bytes.
    pub max_total_uncompressed: u64,
    /// Maximum ratio of uncompressed output to archive size.
    pub max_inflation_ratio: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_members: 10_000,
            max_total_uncompressed: 1 << 30,
            max_inflation_ratio: 200,
        }
    }
}

impl ArchiveLimits {
    /// Validate a declared member count.
    pub fn check_member_count(&self, count: u64) -> Result<()> {
        if count > self.max_members {
            return Err(ArchiveError::LimitExceeded {
                what: "member count",
                limit: self.max_members,
                observed: count,
            });
        }
        Ok(())
    }

    /// Validate a running total of uncompressed bytes against the archive's
    /// own compressed size.
    pub fn check_output(&self, total_uncompressed: u64, archive_size: u64) -> Result<()> {
        if total_uncompressed > self.max_total_uncompressed {
            return Err(ArchiveError::LimitExceeded {
                what: "output size",
                limit: self.max_total_uncompressed,
                observed: total_uncompressed,
            });
        }
        // Tiny archives get a flat allowance before the ratio kicks in.
        let allowance = archive_size.max(4096).saturating_mul(self.max_inflation_ratio);
        if total_uncompressed > allowance {
            return Err(ArchiveError::LimitExceeded {
                what: "inflation ratio",
                limit: allowance,
                observed: total_uncompressed,
            });
        }
        Ok(())
    }
}
