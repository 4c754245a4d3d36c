//! Openness scoring for catalog resources.
//!
//! Maps a sniffed [`FileFormat`] plus the resource bytes to an
//! [`OpennessScore`] in `[0, 5]`. Most formats get a fixed baseline; XML,
//! the RDF family, and archives run specialized calculators that promote
//! the score when the content earns it. A calculator failure degrades to
//! the best score already earned and never propagates an error.
//!
//! # Examples
//!
//! ```
//! use ingest_score::{OpennessScore, ScoreRegistry};
//! use ingest_sniff::FileFormat;
//!
//! let registry = ScoreRegistry::new();
//! let score = registry.score(b"a,b\n1,2\n", FileFormat::Csv);
//! assert_eq!(score, OpennessScore::new(3).unwrap());
//! ```

use std::fmt;

use ingest_archive::{ArchiveLimits, ArchiveReader};
use ingest_sniff::{FileFormat, FormatSniffer};

mod archive;
mod rdf;
mod xml;

/// How machine-processable and semantically linked a resource is.
///
/// `0` is reserved for rejected content (encrypted archives); `1` is the
/// floor for anything readable at all; `5` means linked data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct OpennessScore(u8);

impl OpennessScore {
    /// Rejected content, e.g. a password-protected archive.
    pub const REJECTED: Self = Self(0);
    /// The floor for any readable content.
    pub const FLOOR: Self = Self(1);
    pub const MAX: Self = Self(5);

    pub fn new(value: u8) -> Option<Self> {
        (value <= 5).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for OpennessScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Baseline score for a format, used whenever no specialized calculator
/// applies. Exhaustive so a new format variant forces a scoring decision.
pub fn baseline(format: FileFormat) -> OpennessScore {
    use FileFormat::*;
    let value = match format {
        Unknown | Html => 1,
        Xls | Xlsx | Dbf => 2,
        Csv | Json | JsonStat | JsonApi | Xml | Shapefile | GeoTiff => 3,
        JsonLd | RdfXml | Turtle | N3 | NTriples | NQuads | TriG | TriX => 4,
        // The archive calculator decides; a bare container earns the floor.
        Archive(_) => 1,
    };
    OpennessScore(value)
}

/// Dispatch table for score computation, built once and shared.
pub struct ScoreRegistry {
    reader: ArchiveReader,
    sniffer: FormatSniffer,
}

impl Default for ScoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreRegistry {
    pub fn new() -> Self {
        Self {
            reader: ArchiveReader::new(),
            sniffer: FormatSniffer::new(),
        }
    }

    /// Apply the given extraction limits to archive scoring.
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.reader = ArchiveReader::new().with_limits(limits);
        self.sniffer = FormatSniffer::new().with_archive_reader(ArchiveReader::new().with_limits(limits));
        self
    }

    /// Score the resource bytes for their sniffed format.
    ///
    /// Never fails: any calculator error degrades to the score already
    /// earned by the tiers that did pass.
    pub fn score(&self, bytes: &[u8], format: FileFormat) -> OpennessScore {
        self.score_with_hint(bytes, format, None)
    }

    /// Like [`score`](Self::score), but carrying the declared extension of
    /// the resource. An archive whose declared extension names a reserved
    /// multi-file-format component (shapefile parts, GeoTIFF) is scored as
    /// that format and never unwrapped.
    pub fn score_with_hint(
        &self,
        bytes: &[u8],
        format: FileFormat,
        hint_ext: Option<&str>,
    ) -> OpennessScore {
        self.score_at_depth(bytes, format, hint_ext, archive::MAX_UNWRAP_DEPTH)
    }

    fn score_at_depth(
        &self,
        bytes: &[u8],
        format: FileFormat,
        hint_ext: Option<&str>,
        depth: u8,
    ) -> OpennessScore {
        let score = match format {
            FileFormat::Archive(_) => archive::score_archive(self, bytes, hint_ext, depth),
            FileFormat::Xml => xml::score_xml(bytes),
            f if f.is_rdf_family() => rdf::score_rdf(bytes, f),
            f => baseline(f),
        };
        tracing::debug!(?format, score = score.value(), "scored resource");
        score
    }

    pub(crate) fn reader(&self) -> &ArchiveReader {
        &self.reader
    }

    pub(crate) fn sniffer(&self) -> &FormatSniffer {
        &self.sniffer
    }
}
