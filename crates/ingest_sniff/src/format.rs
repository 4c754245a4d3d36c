//! The closed vocabulary of detectable file formats.

use ingest_archive::ArchiveFormat;

/// Concrete content format of a resource file.
///
/// This is a closed vocabulary: the sniffing cascade can only ever produce
/// one of these tags, and downstream scoring matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Delimiter-separated tabular text
    Csv,
    /// Plain JSON document
    Json,
    /// JSON-stat statistical dataset
    JsonStat,
    /// JSON:API response envelope
    JsonApi,
    /// JSON-LD linked-data document
    JsonLd,
    /// Well-formed XML without RDF semantics
    Xml,
    /// HTML page (loose heuristic, see the sniffing cascade)
    Html,
    /// RDF/XML graph
    RdfXml,
    /// Turtle graph
    Turtle,
    /// Notation3 graph
    N3,
    /// N-Triples graph
    NTriples,
    /// N-Quads dataset
    NQuads,
    /// TriG dataset
    TriG,
    /// TriX dataset (XML envelope)
    TriX,
    /// OOXML spreadsheet
    Xlsx,
    /// Legacy binary spreadsheet
    Xls,
    /// Esri shapefile main file
    Shapefile,
    /// GeoTIFF raster
    GeoTiff,
    /// dBase table
    Dbf,
    /// Container archive; inspect members for the payload format
    Archive(ArchiveFormat),
    /// Readable but unclassifiable content
    Unknown,
}

/// Parser dispatch key for the RDF syntaxes with a real parser.
///
/// JSON-LD and TriX are validated structurally and have no entry here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdfSyntax {
    RdfXml,
    Turtle,
    N3,
    NTriples,
    NQuads,
    TriG,
}

impl FileFormat {
    /// Canonical extension used when persisting derived files.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::JsonStat => "json",
            Self::JsonApi => "json",
            Self::JsonLd => "jsonld",
            Self::Xml => "xml",
            Self::Html => "html",
            Self::RdfXml => "rdf",
            Self::Turtle => "ttl",
            Self::N3 => "n3",
            Self::NTriples => "nt",
            Self::NQuads => "nq",
            Self::TriG => "trig",
            Self::TriX => "trix",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Shapefile => "shp",
            Self::GeoTiff => "tif",
            Self::Dbf => "dbf",
            Self::Archive(ArchiveFormat::Zip) => "zip",
            Self::Archive(ArchiveFormat::SevenZip) => "7z",
            Self::Archive(ArchiveFormat::Rar) => "rar",
            Self::Archive(ArchiveFormat::Tar) => "tar",
            Self::Archive(ArchiveFormat::TarGz) => "tar.gz",
            Self::Archive(ArchiveFormat::TarBz2) => "tar.bz2",
            Self::Unknown => "bin",
        }
    }

    /// Mimetype written back to the resource file record.
    pub fn mimetype(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json | Self::JsonStat | Self::JsonApi => "application/json",
            Self::JsonLd => "application/ld+json",
            Self::Xml => "application/xml",
            Self::Html => "text/html",
            Self::RdfXml => "application/rdf+xml",
            Self::Turtle => "text/turtle",
            Self::N3 => "text/n3",
            Self::NTriples => "application/n-triples",
            Self::NQuads => "application/n-quads",
            Self::TriG => "application/trig",
            Self::TriX => "application/trix",
            Self::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            Self::Xls => "application/vnd.ms-excel",
            Self::Shapefile => "application/x-shapefile",
            Self::GeoTiff => "image/tiff",
            Self::Dbf => "application/x-dbf",
            Self::Archive(ArchiveFormat::Zip) => "application/zip",
            Self::Archive(ArchiveFormat::SevenZip) => "application/x-7z-compressed",
            Self::Archive(ArchiveFormat::Rar) => "application/vnd.rar",
            Self::Archive(_) => "application/x-tar",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Map a declared extension onto a format hint.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Some(match ext.as_str() {
            "csv" | "tsv" => Self::Csv,
            "json" => Self::Json,
            "jsonld" => Self::JsonLd,
            "xml" => Self::Xml,
            "html" | "htm" => Self::Html,
            "rdf" | "owl" => Self::RdfXml,
            "ttl" => Self::Turtle,
            "n3" => Self::N3,
            "nt" => Self::NTriples,
            "nq" => Self::NQuads,
            "trig" => Self::TriG,
            "trix" => Self::TriX,
            "xlsx" => Self::Xlsx,
            "xls" => Self::Xls,
            "shp" => Self::Shapefile,
            "tif" | "tiff" => Self::GeoTiff,
            "dbf" => Self::Dbf,
            _ => return ArchiveFormat::detect_from_filename(&format!("f.{ext}"))
                .map(Self::Archive),
        })
    }

    /// Whether the tag belongs to the RDF family.
    pub fn is_rdf_family(&self) -> bool {
        matches!(
            self,
            Self::RdfXml
                | Self::Turtle
                | Self::N3
                | Self::NTriples
                | Self::NQuads
                | Self::TriG
                | Self::TriX
                | Self::JsonLd
        )
    }

    /// Parser syntax for RDF members that have one.
    pub fn rdf_syntax(&self) -> Option<RdfSyntax> {
        Some(match self {
            Self::RdfXml => RdfSyntax::RdfXml,
            Self::Turtle => RdfSyntax::Turtle,
            Self::N3 => RdfSyntax::N3,
            Self::NTriples => RdfSyntax::NTriples,
            Self::NQuads => RdfSyntax::NQuads,
            Self::TriG => RdfSyntax::TriG,
            _ => return None,
        })
    }
}

impl RdfSyntax {
    /// The format tag produced when a probe with this syntax succeeds.
    pub fn format(&self) -> FileFormat {
        match self {
            Self::RdfXml => FileFormat::RdfXml,
            Self::Turtle => FileFormat::Turtle,
            Self::N3 => FileFormat::N3,
            Self::NTriples => FileFormat::NTriples,
            Self::NQuads => FileFormat::NQuads,
            Self::TriG => FileFormat::TriG,
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}
