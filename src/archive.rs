//! Embedded `ar` archive header parsing (§6).
//!
//! Grounded on §6's BSD-style `ar` layout; the kernel image concatenates
//! one of these after itself to carry Xentium `.xen` kernel images and
//! other build artifacts. Out of scope per §1 ("the embedded-archive (ar)
//! symbol loader... the userland libc"): this module parses headers and
//! resolves the long-name/symbol tables to byte offsets, nothing more — no
//! relocation, no loading, no binary compatibility with a host linker.

use alloc::string::String;
use alloc::vec::Vec;
use core::str;

use crate::{KernelError, Result};

/// `"!<arch>\n"`, the fixed magic string opening every `ar` archive.
pub const ARCHIVE_MAGIC: &[u8; 8] = b"!<arch>\n";

const HEADER_SIZE: usize = 60;
const HEADER_MAGIC: &[u8; 2] = b"\x60\x0a";

/// One parsed `ar` file header, with its long name already resolved against
/// the `//` table if it used one, and the payload's offset/size within the
/// archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub date: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub size: usize,
    /// Byte offset of the entry's payload within the archive buffer.
    pub data_offset: usize,
}

impl ArchiveEntry {
    pub fn is_xentium_kernel(&self) -> bool {
        self.name.ends_with(".xen")
    }
}

fn parse_ascii_field(field: &[u8], radix: u32) -> Result<u64> {
    let text = str::from_utf8(field).map_err(|_| KernelError::InvalidArgument)?.trim_end();
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, radix).map_err(|_| KernelError::InvalidArgument)
}

/// Parses every file header in `archive`, resolving GNU long names via the
/// `//` table when present. `archive` must begin with [`ARCHIVE_MAGIC`].
pub fn parse(archive: &[u8]) -> Result<Vec<ArchiveEntry>> {
    if archive.len() < ARCHIVE_MAGIC.len() || &archive[..ARCHIVE_MAGIC.len()] != ARCHIVE_MAGIC {
        return Err(KernelError::InvalidArgument);
    }

    let mut long_names: Option<&[u8]> = None;
    let mut entries = Vec::new();
    let mut pos = ARCHIVE_MAGIC.len();

    while pos + HEADER_SIZE <= archive.len() {
        let header = &archive[pos..pos + HEADER_SIZE];
        if &header[58..60] != HEADER_MAGIC {
            return Err(KernelError::InvalidArgument);
        }

        let raw_name = &header[0..16];
        let size = parse_ascii_field(&header[48..58], 10)? as usize;
        let data_offset = pos + HEADER_SIZE;
        if data_offset + size > archive.len() {
            return Err(KernelError::InvalidArgument);
        }

        if raw_name.starts_with(b"//") {
            long_names = Some(&archive[data_offset..data_offset + size]);
            pos = data_offset + size + (size % 2);
            continue;
        }

        // The `/ ` symbol table maps symbol names to file offsets; this
        // module only walks headers for payload discovery, so it is
        // skipped rather than indexed.
        if raw_name.starts_with(b"/ ") {
            pos = data_offset + size + (size % 2);
            continue;
        }

        let name = if raw_name[0] == b'/' && raw_name[1].is_ascii_digit() {
            let offset = parse_ascii_field(&raw_name[1..16], 10)? as usize;
            let table = long_names.ok_or(KernelError::InvalidArgument)?;
            let rest = table.get(offset..).ok_or(KernelError::InvalidArgument)?;
            let end = rest.iter().position(|&b| b == b'/' || b == b'\n').unwrap_or(rest.len());
            String::from_utf8(rest[..end].to_vec()).map_err(|_| KernelError::InvalidArgument)?
        } else {
            let end = raw_name.iter().position(|&b| b == b'/' || b == 0).unwrap_or(raw_name.len());
            String::from_utf8(raw_name[..end].to_vec()).map_err(|_| KernelError::InvalidArgument)?
        };

        let date = parse_ascii_field(&header[16..28], 10)?;
        let uid = parse_ascii_field(&header[28..34], 10)? as u32;
        let gid = parse_ascii_field(&header[34..40], 10)? as u32;
        let mode = parse_ascii_field(&header[40..48], 8)? as u32;

        entries.push(ArchiveEntry { name, date, uid, gid, mode, size, data_offset });
        pos = data_offset + size + (size % 2);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn header(name: &[u8; 16], size: usize) -> Vec<u8> {
        let mut h = Vec::with_capacity(HEADER_SIZE);
        h.extend_from_slice(name);
        h.extend_from_slice(b"0           "); // date, 12 bytes
        h.extend_from_slice(b"0     "); // uid, 6 bytes
        h.extend_from_slice(b"0     "); // gid, 6 bytes
        h.extend_from_slice(b"100644  "); // mode, 8 bytes
        let size_field = alloc::format!("{:<10}", size);
        h.extend_from_slice(size_field.as_bytes());
        h.extend_from_slice(HEADER_MAGIC);
        assert_eq!(h.len(), HEADER_SIZE);
        h
    }

    fn pad(payload: &[u8]) -> Vec<u8> {
        let mut v = payload.to_vec();
        if v.len() % 2 != 0 {
            v.push(b'\n');
        }
        v
    }

    #[test]
    fn rejects_missing_magic() {
        assert_eq!(parse(b"not an archive"), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn parses_a_single_short_named_entry() {
        let mut archive = ARCHIVE_MAGIC.to_vec();
        archive.extend(header(b"add.xen/        ", 4));
        archive.extend(pad(b"data"));

        let entries = parse(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "add.xen");
        assert_eq!(entries[0].size, 4);
        assert!(entries[0].is_xentium_kernel());
    }

    #[test]
    fn resolves_gnu_long_names_via_the_table() {
        let mut archive = ARCHIVE_MAGIC.to_vec();
        let long_name = b"a_very_long_xentium_kernel_name.xen/\n";
        archive.extend(header(b"//              ", long_name.len()));
        archive.extend(pad(long_name));
        archive.extend(header(b"/0              ", 2));
        archive.extend(pad(b"hi"));

        let entries = parse(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a_very_long_xentium_kernel_name.xen");
    }

    #[test]
    fn skips_the_symbol_table() {
        let mut archive = ARCHIVE_MAGIC.to_vec();
        archive.extend(header(b"/               ", 4));
        archive.extend(pad(b"xxxx"));
        archive.extend(header(b"b.o/            ", 1));
        archive.extend(pad(b"a"));

        let entries = parse(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b.o");
    }
}
