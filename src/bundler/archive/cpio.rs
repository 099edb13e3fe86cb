//! cpio payload reading.
//!
//! Installer payloads are cpio archives, normally in the portable ASCII
//! (`070707`, "odc") layout; the new ASCII layouts (`070701` / `070702`) are
//! accepted too. Header parsing is left to `cpio_archive`; this module turns
//! its headers into [`EntryMeta`] values and bounds each entry's content.

use super::{EntryKind, EntryMeta, SourceFormat};
use crate::bundler::error::{Error, Result};
use cpio_archive::{CpioHeader, CpioReader};
use std::{
    io::{self, Read},
    ops::ControlFlow,
};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Largest symlink body read into memory.
const MAX_LINK_TARGET: u64 = 64 * 1024;

/// Streams every cpio entry from `stream` to `visit`, stopping at the
/// trailer.
pub(super) fn walk<R, F>(stream: R, visit: &mut F) -> Result<()>
where
    R: Read + 'static,
    F: FnMut(&EntryMeta, &mut dyn Read) -> Result<ControlFlow<()>>,
{
    let mut archive = cpio_archive::reader(stream).map_err(cpio_error)?;

    while let Some(header) = archive.read_next().map_err(cpio_error)? {
        let name = header.name().to_string();
        let mode = header.mode();
        let file_size = header.file_size();

        let kind = match mode & S_IFMT {
            S_IFDIR => EntryKind::Directory,
            S_IFLNK => EntryKind::Symlink,
            _ => EntryKind::File,
        };

        let mut body = Read::take(&mut archive, file_size);

        let link_target = if kind == EntryKind::Symlink {
            if file_size > MAX_LINK_TARGET {
                return Err(Error::format(
                    "cpio",
                    format!("symlink {name} has an oversized target ({file_size} bytes)"),
                ));
            }
            let mut target = Vec::with_capacity(file_size as usize);
            body.read_to_end(&mut target).map_err(read_error)?;
            Some(String::from_utf8_lossy(&target).into_owned())
        } else {
            None
        };

        let meta = EntryMeta {
            path: name,
            kind,
            link_target,
            unix_mode: Some(mode & 0o7777),
            modified: i64::from(header.mtime()),
            size: if kind == EntryKind::File { file_size } else { 0 },
            source: SourceFormat::Cpio,
        };

        let flow = if kind == EntryKind::Symlink {
            visit(&meta, &mut io::empty())?
        } else {
            visit(&meta, &mut body)?
        };
        if flow.is_break() {
            return Ok(());
        }

        // Drain whatever the visitor left unread.
        io::copy(&mut body, &mut io::sink()).map_err(read_error)?;
        if body.limit() != 0 {
            return Err(Error::format(
                "cpio",
                format!("truncated content for {}", meta.path),
            ));
        }
    }

    Ok(())
}

fn cpio_error(error: cpio_archive::Error) -> Error {
    Error::format("cpio", error.to_string())
}

fn read_error(error: io::Error) -> Error {
    match error.kind() {
        // Raised by the compression layer underneath.
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            Error::format("cpio", error.to_string())
        }
        _ => Error::IoError(error),
    }
}
