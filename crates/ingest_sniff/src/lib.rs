//! Content-based format detection for the ingestion pipeline.
//!
//! Takes a byte buffer plus a declared (and possibly wrong) extension and
//! returns a tag from a closed format vocabulary, via a fixed cascade of
//! full-buffer probes. Character-encoding detection rides along as a
//! side-channel.
//!
//! # Examples
//!
//! ```
//! use ingest_sniff::{FormatSniffer, FileFormat};
//!
//! let sniffer = FormatSniffer::new();
//! let format = sniffer.sniff(b"a,b\n1,2\n", Some("csv")).unwrap();
//! assert_eq!(format, FileFormat::Csv);
//! ```

pub mod encoding;
pub mod format;
pub mod rdf;
pub mod sniff;

pub use encoding::{detect_encoding, DetectedEncoding};
pub use format::{FileFormat, RdfSyntax};
pub use rdf::{parse_graph, GraphSummary, RdfParseError};
pub use sniff::{FormatSniffer, SniffError};
