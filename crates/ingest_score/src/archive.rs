//! Archive score calculator.
//!
//! A single-member archive is unwrapped and scored as its inner file; a
//! multi-member archive only earns the floor unless its members jointly
//! form a geo bundle, which is scored as the bundle's format without
//! unwrapping. Password-protected archives are rejected outright.

use ingest_archive::{is_reserved_bundle_extension, ArchiveError};
use ingest_sniff::{FileFormat, SniffError};

use crate::{baseline, OpennessScore, ScoreRegistry};

/// Unwrap at most this many nested single-member archives before giving up.
pub(crate) const MAX_UNWRAP_DEPTH: u8 = 2;

pub(crate) fn score_archive(
    registry: &ScoreRegistry,
    bytes: &[u8],
    hint_ext: Option<&str>,
    depth: u8,
) -> OpennessScore {
    let mut handle = match registry.reader().open_bytes(bytes, None) {
        Ok(handle) => handle,
        Err(ArchiveError::PasswordProtected { .. }) => return OpennessScore::REJECTED,
        Err(err) => {
            tracing::debug!(%err, "archive tier failed");
            return OpennessScore::FLOOR;
        }
    };

    if handle.is_geo_bundle() {
        let format = if handle
            .members()
            .iter()
            .any(|m| m.extension().as_deref() == Some("shp"))
        {
            FileFormat::Shapefile
        } else {
            FileFormat::GeoTiff
        };
        return baseline(format);
    }

    // A declared extension from the reserved multi-file-format set means
    // the archive is one component of a bundle; score it as that format
    // without unwrapping.
    if let Some(ext) = hint_ext.filter(|e| is_reserved_bundle_extension(e)) {
        let format = FileFormat::from_extension(ext).unwrap_or(FileFormat::Unknown);
        return baseline(format);
    }

    if handle.members().len() != 1 || depth == 0 {
        return OpennessScore::FLOOR;
    }

    let hint = handle.members()[0].extension();
    let inner_path = match handle.extract_single() {
        Ok(path) => path,
        Err(err) => {
            tracing::debug!(%err, "unwrap failed");
            return OpennessScore::FLOOR;
        }
    };
    let inner = match fs_err::read(&inner_path) {
        Ok(inner) => inner,
        Err(err) => {
            tracing::debug!(%err, "unwrap read failed");
            return OpennessScore::FLOOR;
        }
    };

    let inner_format = match registry.sniffer().sniff(&inner, hint.as_deref()) {
        Ok(format) => format,
        // A nested encrypted archive is as rejected as an outer one.
        Err(SniffError::Archive(ArchiveError::PasswordProtected { .. })) => {
            return OpennessScore::REJECTED
        }
        Err(err) => {
            tracing::debug!(%err, "inner sniff failed");
            return OpennessScore::FLOOR;
        }
    };
    registry.score_at_depth(&inner, inner_format, hint.as_deref(), depth - 1)
}
