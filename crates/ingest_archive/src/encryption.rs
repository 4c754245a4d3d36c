//! Byte-level password-protection probes.
//!
//! These run *before* any member listing or extraction. The probes parse the
//! container metadata themselves instead of trusting codec behavior, so an
//! encrypted archive is rejected without a single byte of payload being
//! decoded.
//!
//! # Invariants
//! - All sizes and offsets read from archive headers are untrusted and
//!   validated against the file length.
//! - Probes never write to disk.

use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;

/// End-of-central-directory signature.
const ZIP_SIG_EOCD: u32 = 0x0605_4b50;
/// Central directory file header signature.
const ZIP_SIG_CDFH: u32 = 0x0201_4b50;
/// EOCD fixed-field length.
const ZIP_EOCD_MIN_LEN: usize = 22;
/// 64 KiB max comment plus header margin.
const ZIP_EOCD_SEARCH_MAX: u64 = 66 * 1024;
/// Central directory fixed header length.
const ZIP_CDFH_LEN: usize = 46;
/// Upper bound on the central directory region we are willing to walk.
const ZIP_CD_MAX: u64 = 16 << 20;

/// Check the general-purpose encryption bit of every zip member.
///
/// Walks the central directory found via the EOCD record. Returns
/// `Ok(None)` when the directory cannot be located or carries Zip64
/// sentinels; the caller then falls back to codec-level metadata.
pub fn zip_has_encrypted_member<R: Read + Seek>(reader: &mut R) -> Result<Option<bool>> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < ZIP_EOCD_MIN_LEN as u64 {
        return Ok(None);
    }

    let win_len = file_len.min(ZIP_EOCD_SEARCH_MAX) as usize;
    let win_off = file_len - win_len as u64;
    reader.seek(SeekFrom::Start(win_off))?;
    let mut win = vec![0u8; win_len];
    reader.read_exact(&mut win)?;

    let eocd_rel = match rfind_sig(&win, ZIP_SIG_EOCD) {
        Some(i) if i + ZIP_EOCD_MIN_LEN <= win.len() => i,
        _ => return Ok(None),
    };
    let eocd = &win[eocd_rel..];
    let entries_total = le_u16(&eocd[10..12]);
    let cd_size = le_u32(&eocd[12..16]) as u64;
    let cd_off = le_u32(&eocd[16..20]) as u64;

    // Zip64 sentinels: defer to the zip codec.
    if entries_total == 0xFFFF || cd_size == 0xFFFF_FFFF as u64 || cd_off == 0xFFFF_FFFF as u64 {
        return Ok(None);
    }
    if cd_off > file_len || cd_off.saturating_add(cd_size) > file_len || cd_size > ZIP_CD_MAX {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(cd_off))?;
    let mut cd = vec![0u8; cd_size as usize];
    reader.read_exact(&mut cd)?;

    let mut pos = 0usize;
    let mut seen = 0u16;
    while seen < entries_total && pos + ZIP_CDFH_LEN <= cd.len() {
        if le_u32(&cd[pos..pos + 4]) != ZIP_SIG_CDFH {
            return Ok(None);
        }
        let flags = le_u16(&cd[pos + 8..pos + 10]);
        if flags & 0x0001 != 0 {
            return Ok(Some(true));
        }
        let name_len = le_u16(&cd[pos + 28..pos + 30]) as usize;
        let extra_len = le_u16(&cd[pos + 30..pos + 32]) as usize;
        let comment_len = le_u16(&cd[pos + 32..pos + 34]) as usize;
        pos += ZIP_CDFH_LEN + name_len + extra_len + comment_len;
        seen += 1;
    }
    if seen < entries_total {
        return Ok(None);
    }
    Ok(Some(false))
}

/// RAR4 signature (7 bytes) vs RAR5 signature (8 bytes).
const RAR4_SIG: &[u8] = b"Rar!\x1a\x07\x00";
const RAR5_SIG: &[u8] = b"Rar!\x1a\x07\x01\x00";

/// Check whether a RAR archive has encrypted headers or any encrypted
/// member, by walking its block structure.
///
/// Returns `Ok(None)` when the structure is not recognizably RAR4 or RAR5;
/// the caller then relies on the codec's missing-password errors.
pub fn rar_is_encrypted<R: Read + Seek>(reader: &mut R) -> Result<Option<bool>> {
    let mut sig = [0u8; 8];
    reader.seek(SeekFrom::Start(0))?;
    let n = read_up_to(reader, &mut sig)?;
    if n >= 8 && sig == RAR5_SIG[..8] {
        return rar5_is_encrypted(reader);
    }
    if n >= 7 && sig[..7] == RAR4_SIG[..7] {
        reader.seek(SeekFrom::Start(7))?;
        return rar4_is_encrypted(reader);
    }
    Ok(None)
}

/// RAR4 block walk: main-header password flag (0x0080) means encrypted
/// headers; file-header flag 0x04 means an encrypted member.
fn rar4_is_encrypted<R: Read + Seek>(reader: &mut R) -> Result<Option<bool>> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    let mut pos = 7u64;
    let mut blocks = 0u32;

    while pos + 7 <= file_len && blocks < 100_000 {
        reader.seek(SeekFrom::Start(pos))?;
        let mut base = [0u8; 7];
        reader.read_exact(&mut base)?;
        let head_type = base[2];
        let head_flags = le_u16(&base[3..5]);
        let head_size = le_u16(&base[5..7]) as u64;
        if head_size < 7 {
            return Ok(None);
        }

        match head_type {
            // MAIN_HEAD: MHD_PASSWORD
            0x73 if head_flags & 0x0080 != 0 => return Ok(Some(true)),
            // FILE_HEAD: LHD_PASSWORD
            0x74 if head_flags & 0x0004 != 0 => return Ok(Some(true)),
            // Archive end.
            0x7b => return Ok(Some(false)),
            _ => {}
        }

        // LONG_BLOCK: a u32 data size follows the fixed fields.
        let data_size = if head_flags & 0x8000 != 0 {
            let mut add = [0u8; 4];
            reader.read_exact(&mut add)?;
            le_u32(&add) as u64
        } else {
            0
        };
        pos = pos.saturating_add(head_size).saturating_add(data_size);
        blocks += 1;
    }
    Ok(Some(false))
}

/// RAR5 block walk: a leading block of type 4 is an archive encryption
/// header (encrypted headers); a file block (type 2) whose extra area holds
/// a file-encryption record (type 0x01) is an encrypted member.
fn rar5_is_encrypted<R: Read + Seek>(reader: &mut R) -> Result<Option<bool>> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    let mut pos = 8u64;
    let mut blocks = 0u32;

    while pos + 7 <= file_len && blocks < 100_000 {
        reader.seek(SeekFrom::Start(pos))?;
        // CRC32 then enough bytes for the size vint and the header body.
        let mut buf = [0u8; 64];
        let got = read_up_to(reader, &mut buf)?;
        if got < 7 {
            return Ok(None);
        }
        let mut cur = Cursor::new(&buf[4..got]);
        let header_size = match cur.vint() {
            Some(v) => v,
            None => return Ok(None),
        };
        let size_vint_len = cur.pos;
        let header_start = pos + 4 + size_vint_len as u64;

        let mut header = vec![0u8; header_size as usize];
        reader.seek(SeekFrom::Start(header_start))?;
        if reader.read_exact(&mut header).is_err() {
            return Ok(None);
        }
        let mut h = Cursor::new(&header);
        let block_type = match h.vint() {
            Some(v) => v,
            None => return Ok(None),
        };
        let block_flags = match h.vint() {
            Some(v) => v,
            None => return Ok(None),
        };

        // Encryption header: everything after it is undecodable.
        if block_type == 4 {
            return Ok(Some(true));
        }
        // End-of-archive block.
        if block_type == 5 {
            return Ok(Some(false));
        }

        let extra_size = if block_flags & 0x0001 != 0 {
            h.vint().unwrap_or(0)
        } else {
            0
        };
        let data_size = if block_flags & 0x0002 != 0 {
            h.vint().unwrap_or(0)
        } else {
            0
        };

        // File/service blocks keep their extra records at the end of the
        // header; record type 0x01 is file encryption.
        if (block_type == 2 || block_type == 3) && extra_size > 0 {
            let extra_off = header.len().saturating_sub(extra_size as usize);
            let mut e = Cursor::new(&header[extra_off..]);
            while e.remaining() > 0 {
                let rec_size = match e.vint() {
                    Some(v) => v,
                    None => break,
                };
                let rec_start = e.pos;
                let rec_type = match e.vint() {
                    Some(v) => v,
                    None => break,
                };
                if block_type == 2 && rec_type == 0x01 {
                    return Ok(Some(true));
                }
                let next = rec_start.saturating_add(rec_size as usize);
                if next <= e.pos || next > e.len() {
                    break;
                }
                e.pos = next;
            }
        }

        pos = header_start
            .saturating_add(header_size)
            .saturating_add(data_size);
        blocks += 1;
    }
    Ok(Some(false))
}

/// Minimal byte cursor with RAR5 variable-length integer decoding.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Little-endian base-128 with continuation in the high bit, 10 bytes max.
    fn vint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for shift in 0..10 {
            let byte = *self.buf.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (shift * 7);
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }
}

fn rfind_sig(hay: &[u8], sig: u32) -> Option<usize> {
    if hay.len() < 4 {
        return None;
    }
    (0..=hay.len() - 4).rev().find(|&i| le_u32(&hay[i..i + 4]) == sig)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut off = 0;
    while off < buf.len() {
        match reader.read(&mut buf[off..]) {
            Ok(0) => break,
            Ok(n) => off += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(off)
}

#[inline]
fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

#[inline]
fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with_flags(flags: u16) -> Vec<u8> {
        // Hand-assembled single-entry zip: local header, central directory,
        // EOCD. Payload "hi" stored uncompressed.
        let name = b"a.txt";
        let data = b"hi";
        let mut out = Vec::new();
        // Local file header.
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&[0u8; 4]); // time/date
        out.extend_from_slice(&0u32.to_le_bytes()); // crc (unchecked here)
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(data);
        let cd_off = out.len() as u32;
        // Central directory.
        out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version made by
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra
        out.extend_from_slice(&0u16.to_le_bytes()); // comment
        out.extend_from_slice(&0u16.to_le_bytes()); // disk
        out.extend_from_slice(&0u16.to_le_bytes()); // int attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // ext attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // lfh offset
        out.extend_from_slice(name);
        let cd_size = out.len() as u32 - cd_off;
        // EOCD.
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_off.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_zip_plain_member() {
        let bytes = zip_with_flags(0);
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(zip_has_encrypted_member(&mut cur).unwrap(), Some(false));
    }

    #[test]
    fn test_zip_encrypted_member_flag() {
        let bytes = zip_with_flags(0x0001);
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(zip_has_encrypted_member(&mut cur).unwrap(), Some(true));
    }

    #[test]
    fn test_zip_garbage_is_inconclusive() {
        let mut cur = std::io::Cursor::new(vec![0u8; 128]);
        assert_eq!(zip_has_encrypted_member(&mut cur).unwrap(), None);
    }

    #[test]
    fn test_rar4_password_flag() {
        // Signature + main header with MHD_PASSWORD set.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(RAR4_SIG);
        bytes.extend_from_slice(&0u16.to_le_bytes()); // head_crc
        bytes.push(0x73); // MAIN_HEAD
        bytes.extend_from_slice(&0x0080u16.to_le_bytes());
        bytes.extend_from_slice(&13u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 6]);
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(rar_is_encrypted(&mut cur).unwrap(), Some(true));
    }

    #[test]
    fn test_rar5_encryption_header() {
        // Signature + a block of type 4 (archive encryption header).
        let mut bytes = Vec::new();
        bytes.extend_from_slice(RAR5_SIG);
        bytes.extend_from_slice(&0u32.to_le_bytes()); // crc
        bytes.push(0x02); // header_size = 2
        bytes.push(0x04); // type = encryption
        bytes.push(0x00); // flags
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(rar_is_encrypted(&mut cur).unwrap(), Some(true));
    }

    #[test]
    fn test_rar_unrecognized() {
        let mut cur = std::io::Cursor::new(b"not a rar file at all".to_vec());
        assert_eq!(rar_is_encrypted(&mut cur).unwrap(), None);
    }

    #[test]
    fn test_real_zip_writer_roundtrip() {
        // A zip produced by the zip crate must pass the plain probe.
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        {
            let mut zw = zip::ZipWriter::new(tmp.as_file_mut());
            let opts = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            zw.start_file("data.csv", opts).unwrap();
            zw.write_all(b"a,b\n1,2\n").unwrap();
            zw.finish().unwrap();
        }
        tmp.flush().unwrap();
        let mut file = tmp.reopen().unwrap();
        assert_eq!(zip_has_encrypted_member(&mut file).unwrap(), Some(false));
    }
}
