//! Archive handles: member listing and temp-dir-scoped extraction.
//!
//! # Invariants
//! - Password probes run before the extraction scratch directory exists, so
//!   a rejected archive leaves nothing on disk.
//! - The scratch directory and everything extracted into it are removed when
//!   the handle is dropped, on every exit path.
//! - Member listing is collected eagerly; `members()` is re-iterable without
//!   reopening the archive.

use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use crate::bundle;
use crate::encryption::{rar_is_encrypted, zip_has_encrypted_member};
use crate::error::{ArchiveError, Result};
use crate::format::ArchiveFormat;
use crate::limits::ArchiveLimits;

/// Opens archives with a configured set of limits.
pub struct ArchiveReader {
    limits: ArchiveLimits,
}

impl ArchiveReader {
    /// Create a reader with default limits.
    pub fn new() -> Self {
        Self {
            limits: ArchiveLimits::default(),
        }
    }

    /// Override the safety limits.
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Open an archive on disk.
    ///
    /// Detects the real format from content (the declared extension is only
    /// a fallback), runs the password probes, and lists members. Fails
    /// closed with [`ArchiveError::PasswordProtected`] before any extraction
    /// when the archive or any member is encrypted.
    pub fn open_path(&self, path: &Path) -> Result<ArchiveHandle> {
        let filename = path.file_name().and_then(|n| n.to_str());
        let header = read_header(path)?;
        let format = ArchiveFormat::detect(&header, filename)
            .ok_or_else(|| ArchiveError::not_an_archive(path.display().to_string()))?;
        ArchiveHandle::open(format, path.to_path_buf(), None, self.limits)
    }

    /// Open an archive from an in-memory buffer.
    ///
    /// The buffer is spooled to a named temporary file so that all codecs go
    /// through the same path-based machinery; the spool is removed when the
    /// handle drops.
    pub fn open_bytes(&self, bytes: &[u8], hint_name: Option<&str>) -> Result<ArchiveHandle> {
        let format = ArchiveFormat::detect(bytes, hint_name)
            .ok_or_else(|| ArchiveError::not_an_archive("no recognizable archive signature"))?;
        let mut spool = NamedTempFile::new()?;
        std::io::Write::write_all(&mut spool, bytes)?;
        spool.flush()?;
        let path = spool.path().to_path_buf();
        ArchiveHandle::open(format, path, Some(spool), self.limits)
    }
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}

/// One member of an opened archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Path of the member inside the archive, as declared.
    pub name: String,
    /// Declared uncompressed size in bytes.
    pub size: u64,
}

impl ArchiveMember {
    /// Lowercased extension of the member name, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.name.rsplit('/').next().unwrap_or(&self.name);
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// An opened, password-checked archive with a private scratch directory.
#[derive(Debug)]
pub struct ArchiveHandle {
    format: ArchiveFormat,
    archive_path: PathBuf,
    // Keeps an `open_bytes` spool alive (and removed on drop).
    _spool: Option<NamedTempFile>,
    scratch: TempDir,
    members: Vec<ArchiveMember>,
    limits: ArchiveLimits,
    archive_size: u64,
    // 7z and rar unpack the whole archive on first extraction.
    unpacked_all: bool,
    bytes_extracted: u64,
}

impl ArchiveHandle {
    fn open(
        format: ArchiveFormat,
        archive_path: PathBuf,
        spool: Option<NamedTempFile>,
        limits: ArchiveLimits,
    ) -> Result<Self> {
        let archive_size = fs_err::metadata(&archive_path)?.len();

        check_password(format, &archive_path)?;

        let members = list_members(format, &archive_path)?;
        limits.check_member_count(members.len() as u64)?;
        let declared_total: u64 = members.iter().map(|m| m.size).sum();
        limits.check_output(declared_total, archive_size)?;

        tracing::debug!(
            format = format.name(),
            members = members.len(),
            declared_total,
            "opened archive"
        );

        // Only now that the archive passed every probe do we touch disk.
        let scratch = TempDir::new()?;

        Ok(Self {
            format,
            archive_path,
            _spool: spool,
            scratch,
            members,
            limits,
            archive_size,
            unpacked_all: false,
            bytes_extracted: 0,
        })
    }

    /// The detected archive format.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Ordered member list; re-iterable without reopening the archive.
    pub fn members(&self) -> &[ArchiveMember] {
        &self.members
    }

    /// Whether the member set jointly forms a geo bundle.
    pub fn is_geo_bundle(&self) -> bool {
        bundle::is_geo_bundle(self.members.iter().map(|m| m.name.as_str()))
    }

    /// Extract one member into the scratch directory and return its path.
    pub fn extract(&mut self, member_name: &str) -> Result<PathBuf> {
        if !self.members.iter().any(|m| m.name == member_name) {
            return Err(ArchiveError::MemberNotFound {
                name: member_name.to_string(),
            });
        }
        let target = self.scratch.path().join(sanitized_relative(member_name)?);
        if let Some(parent) = target.parent() {
            fs_err::create_dir_all(parent)?;
        }

        match self.format {
            ArchiveFormat::Zip => self.extract_zip_member(member_name, &target)?,
            ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 => {
                self.extract_tar_member(member_name)?
            }
            ArchiveFormat::SevenZip | ArchiveFormat::Rar => {
                self.unpack_all()?;
                let unpacked = self.scratch.path().join(sanitized_relative(member_name)?);
                if !unpacked.is_file() {
                    return Err(ArchiveError::MemberNotFound {
                        name: member_name.to_string(),
                    });
                }
                return Ok(unpacked);
            }
        }

        self.limits
            .check_output(self.bytes_extracted, self.archive_size)?;
        Ok(target)
    }

    /// Extract the archive's only member.
    ///
    /// Fails with [`ArchiveError::NotSingleMember`] unless the archive holds
    /// exactly one file.
    pub fn extract_single(&mut self) -> Result<PathBuf> {
        if self.members.len() != 1 {
            return Err(ArchiveError::NotSingleMember {
                count: self.members.len(),
            });
        }
        let name = self.members[0].name.clone();
        self.extract(&name)
    }

    /// Lazily extract every member with the given extension.
    ///
    /// Finite; each `next()` materializes one extraction.
    pub fn extract_by_extension<'a>(&'a mut self, ext: &str) -> ExtractByExtension<'a> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        let matching: Vec<String> = self
            .members
            .iter()
            .filter(|m| m.extension().as_deref() == Some(ext.as_str()))
            .map(|m| m.name.clone())
            .collect();
        ExtractByExtension {
            handle: self,
            names: matching.into_iter(),
        }
    }

    fn extract_zip_member(&mut self, member_name: &str, target: &Path) -> Result<()> {
        let file = fs_err::File::open(&self.archive_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ArchiveError::corrupt(ArchiveFormat::Zip, e.to_string()))?;
        let mut entry = archive
            .by_name(member_name)
            .map_err(|e| ArchiveError::corrupt(ArchiveFormat::Zip, e.to_string()))?;
        if entry.encrypted() {
            return Err(ArchiveError::PasswordProtected {
                format: ArchiveFormat::Zip,
            });
        }
        let mut out = fs_err::File::create(target)?;
        let written = std::io::copy(&mut entry, &mut out)?;
        self.bytes_extracted = self.bytes_extracted.saturating_add(written);
        Ok(())
    }

    fn extract_tar_member(&mut self, member_name: &str) -> Result<()> {
        let reader = open_tar_reader(self.format, &self.archive_path)?;
        let mut archive = tar::Archive::new(reader);
        for entry in archive
            .entries()
            .map_err(|e| ArchiveError::corrupt(self.format, e.to_string()))?
        {
            let mut entry =
                entry.map_err(|e| ArchiveError::corrupt(self.format, e.to_string()))?;
            let path = entry
                .path()
                .map_err(|e| ArchiveError::corrupt(self.format, e.to_string()))?;
            if path.to_string_lossy() == member_name {
                let size = entry.header().size().unwrap_or(0);
                // unpack_in refuses paths escaping the scratch directory.
                let ok = entry
                    .unpack_in(self.scratch.path())
                    .map_err(|e| ArchiveError::corrupt(self.format, e.to_string()))?;
                if !ok {
                    return Err(ArchiveError::corrupt(
                        self.format,
                        format!("member path escapes extraction root: {member_name}"),
                    ));
                }
                self.bytes_extracted = self.bytes_extracted.saturating_add(size);
                return Ok(());
            }
        }
        Err(ArchiveError::MemberNotFound {
            name: member_name.to_string(),
        })
    }

    fn unpack_all(&mut self) -> Result<()> {
        if self.unpacked_all {
            return Ok(());
        }
        match self.format {
            ArchiveFormat::SevenZip => {
                let file = fs_err::File::open(&self.archive_path)?;
                sevenz_rust2::decompress(file.into_parts().0, self.scratch.path()).map_err(
                    |e| match e {
                        sevenz_rust2::Error::PasswordRequired => ArchiveError::PasswordProtected {
                            format: ArchiveFormat::SevenZip,
                        },
                        other => ArchiveError::corrupt(ArchiveFormat::SevenZip, other.to_string()),
                    },
                )?;
            }
            ArchiveFormat::Rar => {
                let mut archive = unrar::Archive::new(&self.archive_path)
                    .open_for_processing()
                    .map_err(map_rar_error)?;
                while let Some(header) = archive.read_header().map_err(map_rar_error)? {
                    archive = if header.entry().is_file() {
                        header
                            .extract_with_base(self.scratch.path())
                            .map_err(map_rar_error)?
                    } else {
                        header.skip().map_err(map_rar_error)?
                    };
                }
            }
            _ => {}
        }
        // Declared sizes were checked at open; the codecs above write the
        // whole archive in one go, so re-check what actually landed on disk.
        let actual = dir_size(self.scratch.path())?;
        self.bytes_extracted = self.bytes_extracted.saturating_add(actual);
        self.unpacked_all = true;
        self.limits
            .check_output(self.bytes_extracted, self.archive_size)?;
        Ok(())
    }
}

/// Iterator driving [`ArchiveHandle::extract_by_extension`].
pub struct ExtractByExtension<'a> {
    handle: &'a mut ArchiveHandle,
    names: std::vec::IntoIter<String>,
}

impl Iterator for ExtractByExtension<'_> {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.next()?;
        Some(self.handle.extract(&name))
    }
}

/// Total size in bytes of every regular file under `root`.
fn dir_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs_err::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                total = total.saturating_add(metadata.len());
            }
        }
    }
    Ok(total)
}

/// Read up to 4 KiB of leading bytes for format sniffing.
fn read_header(path: &Path) -> Result<Vec<u8>> {
    let mut file = fs_err::File::open(path)?;
    let mut buf = vec![0u8; 4096];
    let mut off = 0;
    loop {
        match file.read(&mut buf[off..]) {
            Ok(0) => break,
            Ok(n) => {
                off += n;
                if off == buf.len() {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    buf.truncate(off);
    Ok(buf)
}

/// Run the byte-level password probe for the format, failing closed.
fn check_password(format: ArchiveFormat, path: &Path) -> Result<()> {
    if !format.supports_encryption() {
        return Ok(());
    }
    match format {
        ArchiveFormat::Zip => {
            let mut file = fs_err::File::open(path)?;
            match zip_has_encrypted_member(&mut file)? {
                Some(true) => Err(ArchiveError::PasswordProtected { format }),
                Some(false) => Ok(()),
                // Inconclusive (Zip64 etc.): ask the codec's metadata.
                None => {
                    file.seek(SeekFrom::Start(0))?;
                    let mut archive = zip::ZipArchive::new(file.into_parts().0)
                        .map_err(|e| ArchiveError::corrupt(format, e.to_string()))?;
                    for i in 0..archive.len() {
                        let entry = archive
                            .by_index_raw(i)
                            .map_err(|e| ArchiveError::corrupt(format, e.to_string()))?;
                        if entry.encrypted() {
                            return Err(ArchiveError::PasswordProtected { format });
                        }
                    }
                    Ok(())
                }
            }
        }
        ArchiveFormat::SevenZip => {
            // Header decodability with an empty password is the probe.
            let file = fs_err::File::open(path)?;
            let len = file.metadata()?.len();
            let mut reader = BufReader::new(file.into_parts().0);
            match sevenz_rust2::Archive::read(&mut reader, len, &[]) {
                Ok(_) => Ok(()),
                Err(sevenz_rust2::Error::PasswordRequired) => {
                    Err(ArchiveError::PasswordProtected { format })
                }
                Err(e) => Err(ArchiveError::corrupt(format, e.to_string())),
            }
        }
        ArchiveFormat::Rar => {
            let mut file = fs_err::File::open(path)?;
            match rar_is_encrypted(&mut file)? {
                Some(true) => Err(ArchiveError::PasswordProtected { format }),
                // Inconclusive structures surface as missing-password errors
                // from the codec during listing.
                Some(false) | None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

fn list_members(format: ArchiveFormat, path: &Path) -> Result<Vec<ArchiveMember>> {
    match format {
        ArchiveFormat::Zip => {
            let file = fs_err::File::open(path)?;
            let mut archive = zip::ZipArchive::new(file.into_parts().0)
                .map_err(|e| ArchiveError::corrupt(format, e.to_string()))?;
            let mut members = Vec::new();
            for i in 0..archive.len() {
                let entry = archive
                    .by_index_raw(i)
                    .map_err(|e| ArchiveError::corrupt(format, e.to_string()))?;
                if entry.is_dir() {
                    continue;
                }
                members.push(ArchiveMember {
                    name: entry.name().to_string(),
                    size: entry.size(),
                });
            }
            Ok(members)
        }
        ArchiveFormat::SevenZip => {
            let file = fs_err::File::open(path)?;
            let len = file.metadata()?.len();
            let mut reader = BufReader::new(file.into_parts().0);
            let archive = sevenz_rust2::Archive::read(&mut reader, len, &[]).map_err(|e| {
                match e {
                    sevenz_rust2::Error::PasswordRequired => {
                        ArchiveError::PasswordProtected { format }
                    }
                    other => ArchiveError::corrupt(format, other.to_string()),
                }
            })?;
            Ok(archive
                .files
                .iter()
                .filter(|f| !f.is_directory())
                .map(|f| ArchiveMember {
                    name: f.name().to_string(),
                    size: f.size(),
                })
                .collect())
        }
        ArchiveFormat::Rar => {
            let archive = unrar::Archive::new(path)
                .open_for_listing()
                .map_err(map_rar_error)?;
            let mut members = Vec::new();
            for entry in archive {
                let header = entry.map_err(map_rar_error)?;
                if !header.is_file() {
                    continue;
                }
                members.push(ArchiveMember {
                    name: header.filename.to_string_lossy().replace('\\', "/"),
                    size: header.unpacked_size,
                });
            }
            Ok(members)
        }
        ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 => {
            let reader = open_tar_reader(format, path)?;
            let mut archive = tar::Archive::new(reader);
            let mut members = Vec::new();
            for entry in archive
                .entries()
                .map_err(|e| ArchiveError::corrupt(format, e.to_string()))?
            {
                let entry =
                    entry.map_err(|e| ArchiveError::corrupt(format, e.to_string()))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = entry
                    .path()
                    .map_err(|e| ArchiveError::corrupt(format, e.to_string()))?
                    .to_string_lossy()
                    .into_owned();
                members.push(ArchiveMember {
                    name,
                    size: entry.header().size().unwrap_or(0),
                });
            }
            Ok(members)
        }
    }
}

fn open_tar_reader(format: ArchiveFormat, path: &Path) -> Result<Box<dyn Read>> {
    let file = fs_err::File::open(path)?;
    let buf_reader = BufReader::new(file.into_parts().0);
    Ok(match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(buf_reader)),
        ArchiveFormat::TarBz2 => Box::new(bzip2::read::BzDecoder::new(buf_reader)),
        _ => Box::new(buf_reader),
    })
}

fn map_rar_error(err: unrar::error::UnrarError) -> ArchiveError {
    match err.code {
        unrar::error::Code::MissingPassword => ArchiveError::PasswordProtected {
            format: ArchiveFormat::Rar,
        },
        _ => ArchiveError::corrupt(ArchiveFormat::Rar, format!("{err:?}")),
    }
}

/// Reject absolute paths and parent traversal in member names.
fn sanitized_relative(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ArchiveError::not_an_archive(format!(
                    "unsafe member path: {name}"
                )))
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ArchiveError::not_an_archive("empty member path"));
    }
    Ok(out)
}
