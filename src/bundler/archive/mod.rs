//! Archive reading and entry metadata.
//!
//! The packaging engine only ever reads archives as a forward stream of
//! `(metadata, content)` pairs. [`ArchiveReader`] hides which container is
//! underneath:
//!
//! | Input | Layers (outermost first) |
//! |-------|--------------------------|
//! | zip | zip central directory |
//! | tar | tar |
//! | tar.gz | gzip → tar |
//! | installer (.pkg) | xar → `Payload` section → gzip → cpio |
//!
//! A reader is consumed by [`ArchiveReader::walk`]. Callers needing a second
//! pass must open the source again.

mod cpio;
pub(crate) mod entry;
pub(crate) mod sink;
mod xar;

pub use entry::{EntryFormat, OutputEntry};
pub use sink::{ArchiveSink, DirectorySink, EntrySink};

use crate::bundler::error::{Error, ErrorExt, Result};
use flate2::read::GzDecoder;
use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read},
    ops::ControlFlow,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Default permission bits for directories when the source carries no mode.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Default permission bits for files when the source carries no mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Permission bits forced onto launcher and native helper paths.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Archive framing format, independent of compression.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Zip container. Cannot carry unix permissions.
    Zip,
    /// Tar container. Written gzip-compressed.
    Tar,
}

impl ContainerKind {
    /// File name extension of an output archive of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerKind::Zip => "zip",
            ContainerKind::Tar => "tar.gz",
        }
    }

    /// Output file name for `output_name`.
    pub fn file_name(&self, output_name: &str) -> String {
        format!("{}.{}", output_name, self.extension())
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Zip => write!(f, "zip"),
            ContainerKind::Tar => write!(f, "tar"),
        }
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(ContainerKind::Zip),
            "tar" | "tar.gz" | "tgz" => Ok(ContainerKind::Tar),
            other => Err(format!("unknown archive kind '{other}' (expected zip or tar)")),
        }
    }
}

/// Compression layered under a tar container.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    /// Plain tar.
    None,
    /// gzip-compressed tar.
    Gzip,
}

/// How an input file is to be unwrapped.
///
/// Selected by the caller, never by sniffing content.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputFormat {
    /// Zip archive.
    Zip,
    /// Tar archive with the given compression.
    Tar(Compression),
    /// Installer container: xar whose `Payload` sections are gzip'd cpio.
    Installer,
}

impl InputFormat {
    /// Picks the input format from a file name suffix.
    ///
    /// `.zip` and `.pkg` are recognised, `.tar` is plain tar and everything
    /// else is treated as tar+gzip.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            InputFormat::Zip
        } else if lower.ends_with(".pkg") {
            InputFormat::Installer
        } else if lower.ends_with(".tar") {
            InputFormat::Tar(Compression::None)
        } else {
            InputFormat::Tar(Compression::Gzip)
        }
    }
}

/// Format an [`EntryMeta`] was read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceFormat {
    /// Zip entry: no unix mode, no links.
    Zip,
    /// Tar entry: unix mode, symlinks and hard links.
    Tar,
    /// cpio entry: unix mode and symlinks.
    Cpio,
}

/// Classification of an entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory. Carries no content.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Hard link to an earlier entry (tar only).
    HardLink,
}

/// Metadata of one input archive entry.
///
/// Lives for a single iteration step of [`ArchiveReader::walk`].
#[derive(Clone, Debug)]
pub struct EntryMeta {
    /// Entry path exactly as stored, forward-slash separated.
    pub path: String,
    /// File, directory or link.
    pub kind: EntryKind,
    /// Link target. Set exactly when `kind` is a link.
    pub link_target: Option<String>,
    /// Unix permission bits, when the source format carries them.
    pub unix_mode: Option<u32>,
    /// Modification time in seconds since the unix epoch.
    pub modified: i64,
    /// Content length as declared by the header.
    pub size: u64,
    /// Format the entry came from.
    pub source: SourceFormat,
}

impl EntryMeta {
    /// Returns true for directory entries.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns true for symbolic links.
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    /// Returns true for symbolic and hard links.
    pub fn is_link(&self) -> bool {
        matches!(self.kind, EntryKind::Symlink | EntryKind::HardLink)
    }
}

/// Permission bits for an output entry copied from `meta`.
///
/// The source's unix mode when it has one, else the directory or file default.
pub fn extract_mode(meta: &EntryMeta) -> u32 {
    match meta.unix_mode {
        Some(mode) => mode & 0o7777,
        None if meta.is_dir() => DEFAULT_DIR_MODE,
        None => DEFAULT_FILE_MODE,
    }
}

/// Strips a single leading `./` from an entry name.
pub fn strip_current_dir(name: &str) -> &str {
    name.strip_prefix("./").unwrap_or(name)
}

/// Forward-only reader over one archive file.
///
/// Opening only acquires the file handle; a mismatched format is reported by
/// [`walk`](Self::walk) at the first header it cannot parse.
#[derive(Debug)]
pub struct ArchiveReader {
    path: PathBuf,
    format: InputFormat,
    file: File,
}

impl ArchiveReader {
    /// Opens `path` to be read as `format`.
    pub fn open(path: impl AsRef<Path>, format: InputFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).fs_context("opening archive", &path)?;
        Ok(Self { path, format, file })
    }

    /// Path this reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format this reader unwraps.
    pub fn format(&self) -> InputFormat {
        self.format
    }

    /// Streams every entry to `visit` until it returns `ControlFlow::Break`
    /// or the archive is exhausted.
    ///
    /// `visit` may read the content reader partially or not at all.
    pub fn walk<F>(self, mut visit: F) -> Result<()>
    where
        F: FnMut(&EntryMeta, &mut dyn Read) -> Result<ControlFlow<()>>,
    {
        log::debug!("Reading {} as {:?}", self.path.display(), self.format);
        match self.format {
            InputFormat::Zip => walk_zip(self.file, &mut visit),
            InputFormat::Tar(Compression::None) => walk_tar(BufReader::new(self.file), &mut visit),
            InputFormat::Tar(Compression::Gzip) => {
                walk_tar(GzDecoder::new(BufReader::new(self.file)), &mut visit)
            }
            InputFormat::Installer => xar::walk_payloads(self.file, &mut visit),
        }
    }
}

fn walk_zip<F>(file: File, visit: &mut F) -> Result<()>
where
    F: FnMut(&EntryMeta, &mut dyn Read) -> Result<ControlFlow<()>>,
{
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_error)?;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(zip_error)?;
        let meta = EntryMeta {
            path: file.name().to_string(),
            kind: if file.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            link_target: None,
            unix_mode: None,
            modified: file.last_modified().and_then(zip_time_to_unix).unwrap_or(0),
            size: file.size(),
            source: SourceFormat::Zip,
        };

        if visit(&meta, &mut file)?.is_break() {
            break;
        }
    }

    Ok(())
}

fn walk_tar<R, F>(reader: R, visit: &mut F) -> Result<()>
where
    R: Read,
    F: FnMut(&EntryMeta, &mut dyn Read) -> Result<ControlFlow<()>>,
{
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries().map_err(tar_error)? {
        let mut entry = entry.map_err(tar_error)?;
        let header = entry.header();
        let entry_type = header.entry_type();

        if entry_type.is_pax_global_extensions() {
            continue;
        }

        let kind = if entry_type.is_dir() {
            EntryKind::Directory
        } else if entry_type.is_symlink() {
            EntryKind::Symlink
        } else if entry_type.is_hard_link() {
            EntryKind::HardLink
        } else {
            EntryKind::File
        };

        let link_target = match kind {
            EntryKind::Symlink | EntryKind::HardLink => Some(
                entry
                    .link_name_bytes()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_default(),
            ),
            _ => None,
        };

        let meta = EntryMeta {
            path: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
            kind,
            link_target,
            unix_mode: Some(header.mode().map_err(tar_error)?),
            modified: header.mtime().map_err(tar_error)? as i64,
            size: entry.size(),
            source: SourceFormat::Tar,
        };

        if visit(&meta, &mut entry)?.is_break() {
            break;
        }
    }

    Ok(())
}

/// Maps tar/gzip read failures onto format or I/O errors.
///
/// Malformed headers and gzip framing surface from the tar crate as
/// `io::Error`s of these kinds.
fn tar_error(error: io::Error) -> Error {
    match error.kind() {
        io::ErrorKind::InvalidData
        | io::ErrorKind::InvalidInput
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::Other => Error::format("tar", error.to_string()),
        _ => Error::IoError(error),
    }
}

fn zip_error(error: zip::result::ZipError) -> Error {
    match error {
        zip::result::ZipError::Io(error) => Error::IoError(error),
        other => Error::format("zip", other.to_string()),
    }
}

fn zip_time_to_unix(time: zip::DateTime) -> Option<i64> {
    chrono::NaiveDate::from_ymd_opt(time.year().into(), time.month().into(), time.day().into())
        .and_then(|date| {
            date.and_hms_opt(time.hour().into(), time.minute().into(), time.second().into())
        })
        .map(|datetime| datetime.and_utc().timestamp())
}
