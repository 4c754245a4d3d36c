//! The format-sniffing cascade.
//!
//! Probes run in a fixed priority order and the first full-buffer success
//! wins, so identical bytes always produce the identical tag. Every probe
//! returns a `Result` and the cascade is an explicit loop; no probe is
//! allowed to partially accept malformed input.
//!
//! Known false-positive surface, kept deliberately: any document containing
//! an `<html>` tag or an `<iframe>` is HTML, even though minimal valid XML
//! can be valid near-empty HTML. The RDF/XML probe is keyed on the declared
//! extension for the same reason; resolving these ambiguities for real
//! would need a product decision, not a cleverer parser.

use ingest_archive::{ArchiveError, ArchiveReader};

use crate::format::{FileFormat, RdfSyntax};
use crate::rdf::parse_graph;

/// Sniffing failure.
///
/// Only security-policy failures escape the cascade; everything else
/// degrades to [`FileFormat::Unknown`].
#[derive(Debug, thiserror::Error)]
pub enum SniffError {
    /// Archive is password protected; terminal, propagated unchanged.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Content-based format detection.
pub struct FormatSniffer {
    archive_reader: ArchiveReader,
    /// Records sampled by the CSV probe.
    csv_sample_records: usize,
}

impl Default for FormatSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatSniffer {
    pub fn new() -> Self {
        Self {
            archive_reader: ArchiveReader::new(),
            csv_sample_records: 100,
        }
    }

    /// Replace the archive reader (to share configured limits).
    pub fn with_archive_reader(mut self, reader: ArchiveReader) -> Self {
        self.archive_reader = reader;
        self
    }

    /// Determine the content format of `bytes`.
    ///
    /// `hint_ext` is the declared extension; it is validated against
    /// content, never trusted. Password-protected archives propagate as
    /// [`SniffError::Archive`] instead of falling through to other probes.
    pub fn sniff(&self, bytes: &[u8], hint_ext: Option<&str>) -> Result<FileFormat, SniffError> {
        if bytes.is_empty() {
            return Ok(FileFormat::Unknown);
        }
        let hint = hint_ext.and_then(FileFormat::from_extension);

        // 1. Containers. Password protection is terminal here.
        if let Some(format) = self.probe_archive(bytes, hint_ext)? {
            return Ok(format);
        }

        // 2. Binary magics.
        if let Some(format) = probe_binary_magic(bytes) {
            return Ok(format);
        }

        // 3. JSON family, most specific envelope first.
        if let Some(format) = probe_json(bytes) {
            return Ok(format);
        }

        // 4. RDF text syntaxes, declared subformat first.
        if let Some(format) = self.probe_rdf(bytes, hint) {
            return Ok(format);
        }

        // 5. XML (excluding documents the HTML heuristic claims).
        if let Some(format) = probe_xml(bytes) {
            return Ok(format);
        }

        // 6. HTML, loose by design.
        if probe_html(bytes) {
            return Ok(FileFormat::Html);
        }

        // 7. CSV last: a lone column must never shadow a structured parse.
        if let Some(format) = self.probe_csv(bytes) {
            return Ok(format);
        }

        Ok(FileFormat::Unknown)
    }

    fn probe_archive(
        &self,
        bytes: &[u8],
        hint_ext: Option<&str>,
    ) -> Result<Option<FileFormat>, SniffError> {
        if ingest_archive::ArchiveFormat::sniff_from_bytes(bytes).is_none() {
            return Ok(None);
        }
        let hint_name = hint_ext.map(|e| format!("file.{e}"));
        match self.archive_reader.open_bytes(bytes, hint_name.as_deref()) {
            Ok(handle) => {
                // OOXML spreadsheets are zip containers with a fixed layout.
                let names: Vec<&str> =
                    handle.members().iter().map(|m| m.name.as_str()).collect();
                if names.contains(&"[Content_Types].xml")
                    && names.iter().any(|n| n.starts_with("xl/"))
                {
                    return Ok(Some(FileFormat::Xlsx));
                }
                Ok(Some(FileFormat::Archive(handle.format())))
            }
            Err(err @ ArchiveError::PasswordProtected { .. }) => Err(err.into()),
            Err(err) => {
                // Magic matched but the container is unreadable; fall
                // through to the remaining probes.
                tracing::debug!(error = %err, "archive probe missed");
                Ok(None)
            }
        }
    }

    fn probe_rdf(&self, bytes: &[u8], hint: Option<FileFormat>) -> Option<FileFormat> {
        // Declared subformat first: an N3 file that also parses as the
        // Turtle superset keeps its more specific declared tag.
        let mut order: Vec<RdfSyntax> = Vec::with_capacity(6);
        if let Some(syntax) = hint.and_then(|h| h.rdf_syntax()) {
            order.push(syntax);
        }
        for syntax in [
            RdfSyntax::NTriples,
            RdfSyntax::NQuads,
            RdfSyntax::Turtle,
            RdfSyntax::TriG,
            RdfSyntax::N3,
        ] {
            if !order.contains(&syntax) {
                order.push(syntax);
            }
        }

        for syntax in order {
            // RDF/XML is only attempted when declared: the parser accepts
            // too much generic XML to run it blind.
            if syntax == RdfSyntax::RdfXml && hint != Some(FileFormat::RdfXml) {
                continue;
            }
            match parse_graph(bytes, syntax) {
                Ok(summary) if summary.triples > 0 => return Some(syntax.format()),
                _ => {}
            }
        }

        // TriX: XML envelope with a fixed root element.
        if hint == Some(FileFormat::TriX) {
            if let Ok(doc) = roxmltree::Document::parse(&String::from_utf8_lossy(bytes)) {
                if doc.root_element().tag_name().name().eq_ignore_ascii_case("trix") {
                    return Some(FileFormat::TriX);
                }
            }
        }
        None
    }

    fn probe_csv(&self, bytes: &[u8]) -> Option<FileFormat> {
        // Fixed delimiter order keeps the cascade deterministic.
        for delimiter in [b',', b';', b'\t', b'|'] {
            if !bytes.contains(&delimiter) {
                continue;
            }
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .has_headers(false)
                .flexible(false)
                .from_reader(bytes);
            let mut fields = None;
            let mut records = 0usize;
            let mut ok = true;
            for record in reader.byte_records().take(self.csv_sample_records) {
                match record {
                    Ok(record) => {
                        let count = record.len();
                        if count < 2 || *fields.get_or_insert(count) != count {
                            ok = false;
                            break;
                        }
                        records += 1;
                    }
                    Err(_) => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok && records > 0 {
                return Some(FileFormat::Csv);
            }
        }
        None
    }
}

fn probe_binary_magic(bytes: &[u8]) -> Option<FileFormat> {
    // OLE compound file: legacy Excel.
    if bytes.starts_with(&[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1]) {
        return Some(FileFormat::Xls);
    }
    // Shapefile: file code 9994 big-endian.
    if bytes.len() >= 100 && bytes[..4] == [0x00, 0x00, 0x27, 0x0a] {
        return Some(FileFormat::Shapefile);
    }
    // TIFF, either byte order.
    if bytes.starts_with(b"II*\x00") || bytes.starts_with(b"MM\x00*") {
        return Some(FileFormat::GeoTiff);
    }
    // dBase: version byte plus a header length that fits the buffer.
    if bytes.len() >= 32 {
        let version = bytes[0];
        if matches!(version, 0x02 | 0x03 | 0x04 | 0x05 | 0x30 | 0x31 | 0x83 | 0x8b | 0xf5) {
            let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
            if header_len >= 32 && header_len % 32 == 1 {
                return Some(FileFormat::Dbf);
            }
        }
    }
    None
}

fn probe_json(bytes: &[u8]) -> Option<FileFormat> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    if let Some(object) = value.as_object() {
        if object.contains_key("@context") || object.contains_key("@graph") {
            return Some(FileFormat::JsonLd);
        }
        // JSON-stat 2.0 carries version + class; 1.x nests datasets.
        if (object.contains_key("version") && object.contains_key("class"))
            || object.contains_key("dataset")
        {
            return Some(FileFormat::JsonStat);
        }
        // JSON:API envelope.
        if object.contains_key("jsonapi")
            || (object.contains_key("data")
                && (object.contains_key("links") || object.contains_key("meta")))
        {
            return Some(FileFormat::JsonApi);
        }
    }
    Some(FileFormat::Json)
}

fn probe_xml(bytes: &[u8]) -> Option<FileFormat> {
    let text = std::str::from_utf8(bytes).ok()?;
    let doc = roxmltree::Document::parse(text).ok()?;
    // Leave <html> roots for the HTML heuristic.
    if doc
        .root_element()
        .tag_name()
        .name()
        .eq_ignore_ascii_case("html")
    {
        return None;
    }
    Some(FileFormat::Xml)
}

fn probe_html(bytes: &[u8]) -> bool {
    let lower = bytes.to_ascii_lowercase();
    memfind(&lower, b"<html").is_some() || memfind(&lower, b"<iframe").is_some()
}

fn memfind(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ingest_archive::ArchiveFormat;
    use rstest::rstest;
    use std::io::Write;
    use zip::unstable::write::FileOptionsExt;

    fn sniff(bytes: &[u8], hint: Option<&str>) -> FileFormat {
        FormatSniffer::new().sniff(bytes, hint).unwrap()
    }

    #[rstest]
    #[case(b"a,b,c\n1,2,3\n4,5,6\n".as_slice(), FileFormat::Csv)]
    #[case(b"a;b\n1;2\n".as_slice(), FileFormat::Csv)]
    #[case(b"{\"key\": [1, 2, 3]}".as_slice(), FileFormat::Json)]
    #[case(b"<root><child/></root>".as_slice(), FileFormat::Xml)]
    #[case(b"<!doctype html><html><body>x</body></html>".as_slice(), FileFormat::Html)]
    #[case(b"\x00\x01\x02\x03binary".as_slice(), FileFormat::Unknown)]
    fn sniff_basic(#[case] bytes: &[u8], #[case] expected: FileFormat) {
        assert_eq!(sniff(bytes, None), expected);
    }

    #[test]
    fn test_jsonstat_envelope() {
        let body = br#"{"version": "2.0", "class": "dataset", "value": []}"#;
        assert_eq!(sniff(body, Some("json")), FileFormat::JsonStat);
    }

    #[test]
    fn test_jsonapi_envelope() {
        let body = br#"{"data": [], "meta": {"count": 0}}"#;
        assert_eq!(sniff(body, Some("json")), FileFormat::JsonApi);
    }

    #[test]
    fn test_jsonld_keywords() {
        let body = br#"{"@context": "http://schema.org/", "@id": "x"}"#;
        assert_eq!(sniff(body, None), FileFormat::JsonLd);
    }

    #[test]
    fn test_turtle_with_and_without_hint() {
        let ttl = b"@prefix ex: <http://example.com/> .\nex:a ex:p ex:b .\n";
        assert_eq!(sniff(ttl, Some("ttl")), FileFormat::Turtle);
        assert_eq!(sniff(ttl, None), FileFormat::Turtle);
    }

    #[test]
    fn test_declared_subformat_wins_over_superset() {
        // Valid N-Triples is also valid Turtle; the declared extension
        // keeps the more specific tag either way.
        let nt = b"<http://example.com/a> <http://example.com/p> <http://example.com/b> .\n";
        assert_eq!(sniff(nt, Some("nt")), FileFormat::NTriples);
        assert_eq!(sniff(nt, None), FileFormat::NTriples);
    }

    #[test]
    fn test_rdfxml_requires_declared_extension() {
        let rdf = br#"<?xml version="1.0"?>
            <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                     xmlns:ex="http://example.com/">
              <rdf:Description rdf:about="http://example.com/a">
                <ex:knows rdf:resource="http://example.com/b"/>
              </rdf:Description>
            </rdf:RDF>"#;
        assert_eq!(sniff(rdf, Some("rdf")), FileFormat::RdfXml);
        // Without the hint it stays XML; documented ambiguity.
        assert_eq!(sniff(rdf, Some("xml")), FileFormat::Xml);
    }

    #[test]
    fn test_single_column_does_not_sniff_as_csv() {
        assert_eq!(sniff(b"just\nwords\nhere\n", None), FileFormat::Unknown);
    }

    #[test]
    fn test_zip_content_beats_csv_extension() {
        let mut buf = Vec::new();
        {
            let mut zw = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = zip::write::SimpleFileOptions::default();
            zw.start_file("inner.csv", opts).unwrap();
            zw.write_all(b"a,b\n1,2\n").unwrap();
            zw.finish().unwrap();
        }
        assert_eq!(
            sniff(&buf, Some("csv")),
            FileFormat::Archive(ArchiveFormat::Zip)
        );
    }

    #[test]
    fn test_xlsx_layout_detected_inside_zip() {
        let mut buf = Vec::new();
        {
            let mut zw = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = zip::write::SimpleFileOptions::default();
            zw.start_file("[Content_Types].xml", opts).unwrap();
            zw.write_all(b"<Types/>").unwrap();
            zw.start_file("xl/workbook.xml", opts).unwrap();
            zw.write_all(b"<workbook/>").unwrap();
            zw.finish().unwrap();
        }
        assert_eq!(sniff(&buf, Some("xlsx")), FileFormat::Xlsx);
    }

    #[test]
    fn test_encrypted_archive_propagates() {
        let mut buf = Vec::new();
        {
            let mut zw = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            #[allow(deprecated)]
            let opts =
                zip::write::SimpleFileOptions::default().with_deprecated_encryption(b"pw");
            zw.start_file("secret.csv", opts).unwrap();
            zw.write_all(b"a,b\n").unwrap();
            zw.finish().unwrap();
        }
        let err = FormatSniffer::new().sniff(&buf, Some("zip")).unwrap_err();
        assert_matches!(
            err,
            SniffError::Archive(ArchiveError::PasswordProtected { .. })
        );
    }

    #[test]
    fn test_cascade_is_deterministic() {
        let samples: [&[u8]; 4] = [
            b"a,b\n1,2\n",
            b"{\"data\": [], \"meta\": {}}",
            b"<root/>",
            b"@prefix ex: <http://e.com/> . ex:a ex:p ex:b .",
        ];
        for bytes in samples {
            let first = sniff(bytes, None);
            for _ in 0..5 {
                assert_eq!(sniff(bytes, None), first);
            }
        }
    }

    #[test]
    fn test_xls_magic() {
        let mut bytes = vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
        bytes.extend_from_slice(&[0u8; 64]);
        assert_eq!(sniff(&bytes, Some("xls")), FileFormat::Xls);
    }

    #[test]
    fn test_shapefile_magic() {
        let mut bytes = vec![0x00, 0x00, 0x27, 0x0a];
        bytes.extend_from_slice(&[0u8; 96]);
        assert_eq!(sniff(&bytes, None), FileFormat::Shapefile);
    }
}
