//! Output entry wrapper.
//!
//! [`OutputEntry`] is one entry on its way into an output sink. The variant
//! is fixed by the sink's [`EntryFormat`], and every variant answers the same
//! `set_mode` / `set_time` / `set_size` / `is_directory` calls, so the copy
//! loops never care which container they feed.
//!
//! Entries are consumed by [`EntrySink::put_entry`](super::EntrySink::put_entry),
//! so a finalized entry cannot be touched again.

use super::{EntryKind, EntryMeta, SourceFormat, extract_mode};

/// Entry layout an output sink accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryFormat {
    /// Tar member: unix mode, symlinks and hard links.
    Tar,
    /// Zip member: no unix mode, no links.
    Zip,
    /// Real file or directory under a staging root.
    Directory,
}

/// One entry bound for an output sink.
#[derive(Debug)]
pub enum OutputEntry {
    /// Tar member. The header carries type, mode, mtime and size.
    Tar {
        /// Target path inside the archive
        path: String,
        /// GNU header; its name field is filled in by the sink
        header: tar::Header,
        /// Link target for symlinks and hard links
        link_name: Option<String>,
    },
    /// Zip member.
    Zip {
        /// Target path inside the archive
        path: String,
        /// Whether this is a directory entry
        directory: bool,
        /// Modification time, seconds since the unix epoch
        modified: i64,
        /// Content length
        size: u64,
    },
    /// Filesystem entry under a staging root.
    File {
        /// Path relative to the staging root
        path: String,
        /// File, directory or link
        kind: EntryKind,
        /// Link target for links
        link_target: Option<String>,
        /// Permission bits
        mode: u32,
        /// Modification time, seconds since the unix epoch
        modified: i64,
        /// Content length
        size: u64,
    },
}

impl OutputEntry {
    /// Creates an entry of `format` at `path`.
    ///
    /// With a source entry, the directory flag, modification time and mode
    /// (via [`extract_mode`]) come from it, and tar entries keep the
    /// symlink/hard link classification of tar and cpio sources. Without one,
    /// a trailing `/` marks a directory and the mode is the default.
    pub fn create(format: EntryFormat, path: &str, source: Option<&EntryMeta>) -> Self {
        let kind = match source {
            Some(meta) => meta.kind,
            None if path.ends_with('/') => EntryKind::Directory,
            None => EntryKind::File,
        };
        let keeps_links = source.is_some_and(|meta| {
            matches!(meta.source, SourceFormat::Tar | SourceFormat::Cpio) && meta.is_link()
        });
        let link_target = if keeps_links {
            source.and_then(|meta| meta.link_target.clone())
        } else {
            None
        };
        let mode = match source {
            Some(meta) => extract_mode(meta),
            None if kind == EntryKind::Directory => super::DEFAULT_DIR_MODE,
            None => super::DEFAULT_FILE_MODE,
        };
        let modified = source.map_or(0, |meta| meta.modified);

        let mut entry = match format {
            EntryFormat::Tar => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(match kind {
                    EntryKind::Directory => tar::EntryType::Directory,
                    EntryKind::Symlink if keeps_links => tar::EntryType::Symlink,
                    EntryKind::HardLink if keeps_links => tar::EntryType::Link,
                    _ => tar::EntryType::Regular,
                });
                header.set_size(0);
                OutputEntry::Tar {
                    path: path.to_string(),
                    header,
                    link_name: link_target,
                }
            }
            EntryFormat::Zip => OutputEntry::Zip {
                path: path.to_string(),
                directory: kind == EntryKind::Directory,
                modified: 0,
                size: 0,
            },
            EntryFormat::Directory => OutputEntry::File {
                path: path.to_string(),
                kind: match kind {
                    EntryKind::Symlink | EntryKind::HardLink if !keeps_links => EntryKind::File,
                    other => other,
                },
                link_target,
                mode: 0,
                modified: 0,
                size: 0,
            },
        };

        entry.set_mode(mode);
        entry.set_time(modified);
        entry
    }

    /// Target path of the entry.
    pub fn path(&self) -> &str {
        match self {
            OutputEntry::Tar { path, .. }
            | OutputEntry::Zip { path, .. }
            | OutputEntry::File { path, .. } => path,
        }
    }

    /// Returns true for directory entries.
    pub fn is_directory(&self) -> bool {
        match self {
            OutputEntry::Tar { header, .. } => header.entry_type().is_dir(),
            OutputEntry::Zip { directory, .. } => *directory,
            OutputEntry::File { kind, .. } => *kind == EntryKind::Directory,
        }
    }

    /// Returns true for symbolic and hard links.
    pub fn is_link(&self) -> bool {
        match self {
            OutputEntry::Tar { link_name, .. } | OutputEntry::File { link_target: link_name, .. } => {
                link_name.is_some()
            }
            OutputEntry::Zip { .. } => false,
        }
    }

    /// Link target, for link entries.
    pub fn link_target(&self) -> Option<&str> {
        match self {
            OutputEntry::Tar { link_name, .. } | OutputEntry::File { link_target: link_name, .. } => {
                link_name.as_deref()
            }
            OutputEntry::Zip { .. } => None,
        }
    }

    /// Sets the permission bits. Zip entries cannot carry them, so this is a
    /// no-op there.
    pub fn set_mode(&mut self, mode: u32) {
        let mode = mode & 0o7777;
        match self {
            OutputEntry::Tar { header, .. } => header.set_mode(mode),
            OutputEntry::Zip { .. } => {}
            OutputEntry::File { mode: current, .. } => *current = mode,
        }
    }

    /// Permission bits, `None` for zip entries.
    pub fn mode(&self) -> Option<u32> {
        match self {
            OutputEntry::Tar { header, .. } => header.mode().ok(),
            OutputEntry::Zip { .. } => None,
            OutputEntry::File { mode, .. } => Some(*mode),
        }
    }

    /// Sets the modification time, seconds since the unix epoch.
    pub fn set_time(&mut self, seconds: i64) {
        match self {
            OutputEntry::Tar { header, .. } => header.set_mtime(seconds.max(0) as u64),
            OutputEntry::Zip { modified, .. } | OutputEntry::File { modified, .. } => {
                *modified = seconds
            }
        }
    }

    /// Modification time, seconds since the unix epoch.
    pub fn time(&self) -> i64 {
        match self {
            OutputEntry::Tar { header, .. } => header.mtime().map_or(0, |t| t as i64),
            OutputEntry::Zip { modified, .. } | OutputEntry::File { modified, .. } => *modified,
        }
    }

    /// Sets the content length written after the header.
    pub fn set_size(&mut self, size: u64) {
        match self {
            OutputEntry::Tar { header, .. } => header.set_size(size),
            OutputEntry::Zip { size: current, .. } | OutputEntry::File { size: current, .. } => {
                *current = size
            }
        }
    }

    /// Content length.
    pub fn size(&self) -> u64 {
        match self {
            OutputEntry::Tar { header, .. } => header.size().unwrap_or(0),
            OutputEntry::Zip { size, .. } | OutputEntry::File { size, .. } => *size,
        }
    }
}
