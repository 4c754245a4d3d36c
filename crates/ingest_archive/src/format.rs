//! Archive format detection from filenames and content.
//!
//! Extensions lie in both directions: archives arrive with no recognizable
//! suffix, and `.zip` uploads turn out to be HTML error pages. Callers are
//! expected to sniff content via [`ArchiveFormat::sniff_from_bytes`] and only
//! fall back to the declared name when the bytes are inconclusive.

use std::ffi::OsStr;
use std::path::Path;

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// ZIP archive
    Zip,
    /// 7-Zip archive
    SevenZip,
    /// RAR archive (read-only)
    Rar,
    /// Plain tar archive
    Tar,
    /// Gzip-compressed tar archive (.tar.gz, .tgz)
    TarGz,
    /// Bzip2-compressed tar archive (.tar.bz2, .tbz2)
    TarBz2,
}

/// Magic prefix of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// Magic prefix of a 7z archive.
const SEVENZ_MAGIC: [u8; 6] = [b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c];
/// Shared magic prefix of RAR4 and RAR5 archives.
const RAR_MAGIC: [u8; 6] = [b'R', b'a', b'r', b'!', 0x1a, 0x07];

impl ArchiveFormat {
    /// Detect archive format from a filename, most specific suffix first.
    pub fn detect_from_filename(filename: &str) -> Option<Self> {
        let filename = filename.to_lowercase();

        if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
            return Some(Self::TarGz);
        }
        if filename.ends_with(".tar.bz2")
            || filename.ends_with(".tbz")
            || filename.ends_with(".tbz2")
        {
            return Some(Self::TarBz2);
        }
        if filename.ends_with(".tar") {
            return Some(Self::Tar);
        }
        if filename.ends_with(".zip") {
            return Some(Self::Zip);
        }
        if filename.ends_with(".7z") {
            return Some(Self::SevenZip);
        }
        if filename.ends_with(".rar") {
            return Some(Self::Rar);
        }
        None
    }

    /// Detect archive format from a file path.
    pub fn detect_from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .file_name()
            .and_then(OsStr::to_str)
            .and_then(Self::detect_from_filename)
    }

    /// Sniff the archive format from leading bytes.
    ///
    /// Gzip and bzip2 magic alone cannot distinguish `.tar.gz` from a bare
    /// compressed file; this layer treats both as the tar-chain kind and the
    /// tar reader discovers the truth when listing. A ustar header at offset
    /// 257 identifies an uncompressed tar.
    pub fn sniff_from_bytes(header: &[u8]) -> Option<Self> {
        if header.len() >= 4 && is_zip_magic(header) {
            return Some(Self::Zip);
        }
        if header.starts_with(&SEVENZ_MAGIC) {
            return Some(Self::SevenZip);
        }
        if header.starts_with(&RAR_MAGIC) {
            return Some(Self::Rar);
        }
        if header.starts_with(&GZIP_MAGIC) {
            return Some(Self::TarGz);
        }
        if header.len() >= 4 && header.starts_with(b"BZh") && header[3].is_ascii_digit() {
            return Some(Self::TarBz2);
        }
        if is_ustar_header(header) {
            return Some(Self::Tar);
        }
        None
    }

    /// Combined detection: content first, declared name as fallback.
    pub fn detect(header: &[u8], filename: Option<&str>) -> Option<Self> {
        Self::sniff_from_bytes(header).or_else(|| filename.and_then(Self::detect_from_filename))
    }

    /// Human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "ZIP",
            Self::SevenZip => "7Z",
            Self::Rar => "RAR",
            Self::Tar => "TAR",
            Self::TarGz => "TAR.GZ",
            Self::TarBz2 => "TAR.BZ2",
        }
    }

    /// Check if this is a tar-based format.
    pub fn is_tar_based(&self) -> bool {
        matches!(self, Self::Tar | Self::TarGz | Self::TarBz2)
    }

    /// Formats that can carry password protection.
    ///
    /// Tar chains have no encryption concept, so the password probe is a
    /// no-op for them.
    pub fn supports_encryption(&self) -> bool {
        matches!(self, Self::Zip | Self::SevenZip | Self::Rar)
    }
}

/// ZIP signatures are `PK..`: local header, central directory, end of
/// central directory, or data descriptor.
pub(crate) fn is_zip_magic(header: &[u8]) -> bool {
    if header.len() < 4 || header[0] != b'P' || header[1] != b'K' {
        return false;
    }
    matches!((header[2], header[3]), (1, 2) | (3, 4) | (5, 6) | (7, 8))
}

/// A ustar tar header carries "ustar" at offset 257.
pub(crate) fn is_ustar_header(header: &[u8]) -> bool {
    header.len() >= 262 && &header[257..262] == b"ustar"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_filename() {
        assert_eq!(
            ArchiveFormat::detect_from_filename("file.tar.gz"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::detect_from_filename("file.tgz"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::detect_from_filename("file.tar.bz2"),
            Some(ArchiveFormat::TarBz2)
        );
        assert_eq!(
            ArchiveFormat::detect_from_filename("file.tar"),
            Some(ArchiveFormat::Tar)
        );
        assert_eq!(
            ArchiveFormat::detect_from_filename("file.zip"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::detect_from_filename("file.7z"),
            Some(ArchiveFormat::SevenZip)
        );
        assert_eq!(
            ArchiveFormat::detect_from_filename("file.rar"),
            Some(ArchiveFormat::Rar)
        );
        assert_eq!(ArchiveFormat::detect_from_filename("file.csv"), None);
    }

    #[test]
    fn test_detect_case_insensitive() {
        assert_eq!(
            ArchiveFormat::detect_from_filename("FILE.TAR.GZ"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::detect_from_filename("File.Zip"),
            Some(ArchiveFormat::Zip)
        );
    }

    #[test]
    fn test_sniff_magic() {
        assert_eq!(
            ArchiveFormat::sniff_from_bytes(b"PK\x03\x04rest"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::sniff_from_bytes(&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0, 0]),
            Some(ArchiveFormat::SevenZip)
        );
        assert_eq!(
            ArchiveFormat::sniff_from_bytes(b"Rar!\x1a\x07\x01\x00"),
            Some(ArchiveFormat::Rar)
        );
        assert_eq!(
            ArchiveFormat::sniff_from_bytes(&[0x1f, 0x8b, 0x08, 0x00]),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::sniff_from_bytes(b"BZh9data"),
            Some(ArchiveFormat::TarBz2)
        );
        assert_eq!(ArchiveFormat::sniff_from_bytes(b"<html>"), None);
        assert_eq!(ArchiveFormat::sniff_from_bytes(b"PK"), None);
    }

    #[test]
    fn test_content_wins_over_extension() {
        // A ".zip" that is actually gzip content is treated as a tar chain.
        assert_eq!(
            ArchiveFormat::detect(&[0x1f, 0x8b, 0x08, 0x00], Some("lies.zip")),
            Some(ArchiveFormat::TarGz)
        );
        // No recognizable magic: fall back to the declared name.
        assert_eq!(
            ArchiveFormat::detect(b"\x00\x00\x00\x00", Some("data.tar")),
            Some(ArchiveFormat::Tar)
        );
        assert_eq!(ArchiveFormat::detect(b"plain text", Some("notes.txt")), None);
    }

    #[test]
    fn test_ustar_sniff() {
        let mut header = vec![0u8; 512];
        header[257..262].copy_from_slice(b"ustar");
        assert_eq!(
            ArchiveFormat::sniff_from_bytes(&header),
            Some(ArchiveFormat::Tar)
        );
    }
}
