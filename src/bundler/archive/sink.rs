//! Output sinks.
//!
//! An [`EntrySink`] accepts finished [`OutputEntry`] values together with
//! their content. [`ArchiveSink`] writes a zip or gzip'd tar archive through a
//! temporary file that only takes the final name in [`ArchiveSink::finish`];
//! [`DirectorySink`] materializes entries as real files under a staging root.

use super::{ContainerKind, EntryFormat, EntryKind, EntryMeta, OutputEntry};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    transform,
    utils::fs,
};
use chrono::{Datelike, Timelike};
use flate2::{Compression, write::GzEncoder};
use std::{
    borrow::Cow,
    io::{BufWriter, IntoInnerError, Read, Write},
    path::{Component, Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};
use tempfile::NamedTempFile;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Destination for output entries.
pub trait EntrySink {
    /// Entry layout this sink accepts.
    fn format(&self) -> EntryFormat;

    /// Creates an entry for this sink at `path`.
    fn create_entry(&self, path: &str, source: Option<&EntryMeta>) -> OutputEntry {
        OutputEntry::create(self.format(), path, source)
    }

    /// Writes `entry` followed by `data`, whose length must equal the
    /// entry's size. The entry is finalized and consumed.
    fn put_entry(&mut self, entry: OutputEntry, data: &[u8]) -> Result<()>;

    /// Reads `content` fully, normalizes its line endings, sets the entry size
    /// and writes it.
    ///
    /// Directories and links carry no data. A link the sink cannot represent
    /// becomes an empty regular file.
    fn copy_entry(
        &mut self,
        mut entry: OutputEntry,
        source: &EntryMeta,
        content: &mut dyn Read,
    ) -> Result<()> {
        if entry.is_directory() || source.is_link() {
            if source.is_link() && !entry.is_link() {
                log::warn!(
                    "Link {} -> {} can't be represented, writing an empty file",
                    entry.path(),
                    source.link_target.as_deref().unwrap_or_default()
                );
            }
            entry.set_size(0);
            return self.put_entry(entry, &[]);
        }

        let mut raw = Vec::new();
        content.read_to_end(&mut raw)?;
        let data = transform::normalize_line_endings(&raw);
        if matches!(data, Cow::Borrowed(_)) && raw.contains(&b'\r') {
            log::debug!("Keeping binary payload {} verbatim", entry.path());
        }

        entry.set_size(data.len() as u64);
        self.put_entry(entry, &data)
    }
}

enum ArchiveWriter {
    Zip(ZipWriter<BufWriter<NamedTempFile>>),
    Tar(tar::Builder<GzEncoder<BufWriter<NamedTempFile>>>),
}

/// Archive output written to a temporary file next to its final name.
///
/// Dropping the sink without calling [`finish`](Self::finish) deletes the
/// temporary file, so a failed build never leaves a file at the final name.
pub struct ArchiveSink {
    writer: ArchiveWriter,
    final_path: PathBuf,
    entries: usize,
}

impl ArchiveSink {
    /// Starts `<target_dir>/<output_name>.zip` or `.tar.gz`.
    pub fn create(target_dir: &Path, output_name: &str, kind: ContainerKind) -> Result<Self> {
        std::fs::create_dir_all(target_dir).fs_context("creating target directory", target_dir)?;

        let file_name = kind.file_name(output_name);
        let final_path = target_dir.join(&file_name);
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".part")
            .tempfile_in(target_dir)
            .fs_context("creating temporary archive in", target_dir)?;
        let buffered = BufWriter::new(temp);

        let writer = match kind {
            ContainerKind::Zip => ArchiveWriter::Zip(ZipWriter::new(buffered)),
            ContainerKind::Tar => {
                let mut builder =
                    tar::Builder::new(GzEncoder::new(buffered, Compression::default()));
                builder.mode(tar::HeaderMode::Complete);
                ArchiveWriter::Tar(builder)
            }
        };

        log::debug!("Writing {} archive {}", kind, final_path.display());
        Ok(Self {
            writer,
            final_path,
            entries: 0,
        })
    }

    /// Final path the archive is renamed to.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Writes the archive trailer and renames the file to its final name.
    pub fn finish(self) -> Result<PathBuf> {
        let temp = match self.writer {
            ArchiveWriter::Zip(zip) => zip.finish()?.into_inner().map_err(IntoInnerError::into_error)?,
            ArchiveWriter::Tar(builder) => builder
                .into_inner()?
                .finish()?
                .into_inner()
                .map_err(IntoInnerError::into_error)?,
        };

        temp.persist(&self.final_path)
            .map_err(|e| e.error)
            .fs_context("renaming finished archive to", &self.final_path)?;

        log::debug!(
            "Finished {} ({} entries)",
            self.final_path.display(),
            self.entries
        );
        Ok(self.final_path)
    }
}

impl EntrySink for ArchiveSink {
    fn format(&self) -> EntryFormat {
        match self.writer {
            ArchiveWriter::Zip(_) => EntryFormat::Zip,
            ArchiveWriter::Tar(_) => EntryFormat::Tar,
        }
    }

    fn put_entry(&mut self, entry: OutputEntry, data: &[u8]) -> Result<()> {
        check_size(&entry, data)?;
        let format = self.format();

        match (&mut self.writer, entry) {
            (
                ArchiveWriter::Tar(builder),
                OutputEntry::Tar {
                    path,
                    mut header,
                    link_name,
                },
            ) => match link_name {
                Some(target) => builder.append_link(&mut header, &path, &target)?,
                None => builder.append_data(&mut header, &path, data)?,
            },
            (
                ArchiveWriter::Zip(zip),
                OutputEntry::Zip {
                    path,
                    directory,
                    modified,
                    ..
                },
            ) => {
                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .last_modified_time(zip_datetime(modified))
                    .large_file(data.len() as u64 >= u64::from(u32::MAX));
                if directory {
                    zip.add_directory(path, options)?;
                } else {
                    zip.start_file(path, options)?;
                    zip.write_all(data)?;
                }
            }
            (_, entry) => {
                return Err(Error::GenericError(format!(
                    "entry {} does not belong to a {:?} sink",
                    entry.path(),
                    format
                )));
            }
        }

        self.entries += 1;
        Ok(())
    }
}

/// Permission bits every staged directory keeps for its owner.
const STAGED_DIR_OWNER_BITS: u32 = 0o700;

/// Writes entries as real files and directories under a root directory.
///
/// Directories always stay owner-writable; files get their exact mode.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    entries: usize,
}

impl DirectorySink {
    /// Creates `root` if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).fs_context("creating staging directory", &root)?;
        Ok(Self { root, entries: 0 })
    }

    /// Staging root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::GenericError(format!(
                "refusing to stage entry outside the staging root: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl EntrySink for DirectorySink {
    fn format(&self) -> EntryFormat {
        EntryFormat::Directory
    }

    fn put_entry(&mut self, entry: OutputEntry, data: &[u8]) -> Result<()> {
        check_size(&entry, data)?;

        let OutputEntry::File {
            path,
            kind,
            link_target,
            mode,
            modified,
            ..
        } = entry
        else {
            return Err(Error::GenericError(format!(
                "entry {} does not belong to a directory sink",
                entry.path()
            )));
        };

        let dest = self.resolve(&path)?;
        if kind == EntryKind::Directory {
            std::fs::create_dir_all(&dest).fs_context("creating directory", &dest)?;
            // Owner keeps rwx so later entries and cleanup can write into it.
            fs::set_mode(&dest, mode | STAGED_DIR_OWNER_BITS)?;
            self.entries += 1;
            return Ok(());
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
        }
        if dest.symlink_metadata().is_ok_and(|meta| !meta.is_dir()) {
            std::fs::remove_file(&dest).fs_context("replacing", &dest)?;
        }

        match (kind, link_target) {
            (EntryKind::Symlink, Some(target)) => fs::symlink_file(Path::new(&target), &dest)?,
            (EntryKind::HardLink, Some(target)) => {
                let original = self.resolve(&target)?;
                std::fs::hard_link(&original, &dest).fs_context("linking", &dest)?;
            }
            _ => {
                let mut file = std::fs::File::create(&dest).fs_context("writing", &dest)?;
                file.write_all(data).fs_context("writing", &dest)?;
                let modified = UNIX_EPOCH + Duration::from_secs(modified.max(0) as u64);
                file.set_modified(modified)
                    .fs_context("setting modification time of", &dest)?;
                drop(file);
                // Read-only modes go on last.
                fs::set_mode(&dest, mode)?;
            }
        }

        self.entries += 1;
        Ok(())
    }
}

fn check_size(entry: &OutputEntry, data: &[u8]) -> Result<()> {
    if entry.size() != data.len() as u64 {
        return Err(Error::GenericError(format!(
            "entry {} declares {} bytes but {} were supplied",
            entry.path(),
            entry.size(),
            data.len()
        )));
    }
    Ok(())
}

/// Zip timestamps cover 1980..=2107; anything outside falls back to the
/// zip epoch.
fn zip_datetime(seconds: i64) -> zip::DateTime {
    chrono::DateTime::from_timestamp(seconds, 0)
        .and_then(|time| {
            zip::DateTime::from_date_and_time(
                u16::try_from(time.year()).ok()?,
                time.month() as u8,
                time.day() as u8,
                time.hour() as u8,
                time.minute() as u8,
                time.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::archive::{ArchiveReader, InputFormat, SourceFormat};
    use std::{ops::ControlFlow, time::SystemTime};
    use tempfile::TempDir;

    fn system_time_seconds(time: SystemTime) -> i64 {
        time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs() as i64)
    }

    fn meta(path: &str, kind: EntryKind, mode: Option<u32>, source: SourceFormat) -> EntryMeta {
        EntryMeta {
            path: path.to_string(),
            kind,
            link_target: (kind == EntryKind::Symlink).then(|| "java".to_string()),
            unix_mode: mode,
            modified: 1_600_000_000,
            size: 0,
            source,
        }
    }

    fn read_back(path: &Path, format: InputFormat) -> Vec<(EntryMeta, Vec<u8>)> {
        let mut seen = Vec::new();
        ArchiveReader::open(path, format)
            .unwrap()
            .walk(|meta, content| {
                let mut data = Vec::new();
                content.read_to_end(&mut data)?;
                seen.push((meta.clone(), data));
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        seen
    }

    #[test]
    fn test_tar_sink_writes_modes_links_and_renames_on_finish() {
        let temp = TempDir::new().unwrap();
        let mut sink = ArchiveSink::create(temp.path(), "consulo-linux", ContainerKind::Tar).unwrap();
        let final_path = sink.final_path().to_path_buf();
        assert!(!final_path.exists());

        let dir = meta("jdk/bin", EntryKind::Directory, Some(0o755), SourceFormat::Tar);
        let entry = sink.create_entry("Consulo/jre/bin", Some(&dir));
        sink.copy_entry(entry, &dir, &mut std::io::empty()).unwrap();

        let java = meta("jdk/bin/java", EntryKind::File, Some(0o755), SourceFormat::Tar);
        let entry = sink.create_entry("Consulo/jre/bin/java", Some(&java));
        sink.copy_entry(entry, &java, &mut &b"\x7FELF\x00\x01"[..]).unwrap();

        let link = meta("jdk/bin/java2", EntryKind::Symlink, Some(0o777), SourceFormat::Tar);
        let entry = sink.create_entry("Consulo/jre/bin/java2", Some(&link));
        sink.copy_entry(entry, &link, &mut std::io::empty()).unwrap();

        let mut text = sink.create_entry("Consulo/readme.txt", None);
        text.set_size(4);
        sink.put_entry(text, b"a\nb\n").unwrap();

        assert_eq!(sink.entry_count(), 4);
        assert_eq!(sink.finish().unwrap(), final_path);
        assert!(final_path.ends_with("consulo-linux.tar.gz"));

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);

        let seen = read_back(&final_path, InputFormat::from_file_name("x.tar.gz"));
        assert_eq!(seen.len(), 4);
        assert!(seen[0].0.is_dir());
        assert_eq!(seen[1].0.path, "Consulo/jre/bin/java");
        assert_eq!(seen[1].0.unix_mode, Some(0o755));
        assert_eq!(seen[1].1, b"\x7FELF\x00\x01");
        assert!(seen[2].0.is_symlink());
        assert_eq!(seen[2].0.link_target.as_deref(), Some("java"));
        assert_eq!(seen[3].0.unix_mode, Some(0o644));
    }

    #[test]
    fn test_zip_sink_normalizes_text_and_flattens_links() {
        let temp = TempDir::new().unwrap();
        let mut sink = ArchiveSink::create(temp.path(), "consulo-win", ContainerKind::Zip).unwrap();

        let readme = meta("A/readme.txt", EntryKind::File, None, SourceFormat::Zip);
        let entry = sink.create_entry("A/readme.txt", Some(&readme));
        sink.copy_entry(entry, &readme, &mut &b"line1\r\nline2\r\n"[..]).unwrap();

        let link = meta("jdk/lib/link", EntryKind::Symlink, Some(0o777), SourceFormat::Tar);
        let entry = sink.create_entry("A/jre/lib/link", Some(&link));
        sink.copy_entry(entry, &link, &mut std::io::empty()).unwrap();

        let path = sink.finish().unwrap();
        let seen = read_back(&path, InputFormat::Zip);
        assert_eq!(seen[0].1, b"line1\nline2\n");
        assert_eq!(seen[0].0.modified, 1_600_000_000);
        assert_eq!(seen[1].0.path, "A/jre/lib/link");
        assert!(!seen[1].0.is_link());
        assert!(seen[1].1.is_empty());
    }

    #[test]
    fn test_dropped_sink_leaves_no_output() {
        let temp = TempDir::new().unwrap();
        let sink = ArchiveSink::create(temp.path(), "broken", ContainerKind::Zip).unwrap();
        let final_path = sink.final_path().to_path_buf();
        drop(sink);

        assert!(!final_path.exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut sink = ArchiveSink::create(temp.path(), "bad", ContainerKind::Tar).unwrap();
        let mut entry = sink.create_entry("a.txt", None);
        entry.set_size(10);
        assert!(sink.put_entry(entry, b"short").is_err());
    }

    #[test]
    fn test_directory_sink_materializes_entries() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::create(temp.path().join("stage")).unwrap();

        let script = meta("A/launcher.sh", EntryKind::File, Some(0o755), SourceFormat::Tar);
        let entry = sink.create_entry("Consulo/launcher.sh", Some(&script));
        sink.copy_entry(entry, &script, &mut &b"#!/bin/sh\r\n"[..]).unwrap();

        let written = temp.path().join("stage/Consulo/launcher.sh");
        assert_eq!(std::fs::read(&written).unwrap(), b"#!/bin/sh\n");
        let modified = std::fs::metadata(&written).unwrap().modified().unwrap();
        assert_eq!(system_time_seconds(modified), 1_600_000_000);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&written).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);

            let link = meta("A/java", EntryKind::Symlink, Some(0o777), SourceFormat::Tar);
            let entry = sink.create_entry("Consulo/java", Some(&link));
            sink.copy_entry(entry, &link, &mut std::io::empty()).unwrap();
            let target = std::fs::read_link(temp.path().join("stage/Consulo/java")).unwrap();
            assert_eq!(target, Path::new("java"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_sink_stages_read_only_entries() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::create(temp.path().join("stage")).unwrap();

        let legal = meta("jdk/legal/", EntryKind::Directory, Some(0o555), SourceFormat::Tar);
        let entry = sink.create_entry("Consulo/jre/legal", Some(&legal));
        sink.copy_entry(entry, &legal, &mut std::io::empty()).unwrap();

        let license = meta("jdk/legal/LICENSE", EntryKind::File, Some(0o444), SourceFormat::Tar);
        let entry = sink.create_entry("Consulo/jre/legal/LICENSE", Some(&license));
        sink.copy_entry(entry, &license, &mut &b"GPLv2\n"[..]).unwrap();

        // Rewriting a read-only file replaces it.
        let entry = sink.create_entry("Consulo/jre/legal/LICENSE", Some(&license));
        sink.copy_entry(entry, &license, &mut &b"GPLv2 + CE\n"[..]).unwrap();

        let dir = temp.path().join("stage/Consulo/jre/legal");
        let written = dir.join("LICENSE");
        assert_eq!(std::fs::read(&written).unwrap(), b"GPLv2 + CE\n");

        let metadata = std::fs::metadata(&written).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o444);
        assert_eq!(system_time_seconds(metadata.modified().unwrap()), 1_600_000_000);

        let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o755);
        assert_eq!(sink.entry_count(), 3);
    }

    #[test]
    fn test_tar_sink_keeps_long_paths_and_link_targets() {
        let temp = TempDir::new().unwrap();
        let mut sink = ArchiveSink::create(temp.path(), "long", ContainerKind::Tar).unwrap();

        let deep = format!("Consulo/platform/build42/jre/{}/module-info.class", "nested".repeat(25));
        assert!(deep.len() > 150);
        let file = meta("jdk/x", EntryKind::File, Some(0o644), SourceFormat::Tar);
        let entry = sink.create_entry(&deep, Some(&file));
        sink.copy_entry(entry, &file, &mut &b"\xCA\xFE\xBA\xBE"[..]).unwrap();

        let target = format!("../{}/libjvm.so", "server-variant".repeat(10));
        assert!(target.len() > 100);
        let link = EntryMeta {
            link_target: Some(target.clone()),
            ..meta("jdk/lib/libjvm.so", EntryKind::Symlink, Some(0o777), SourceFormat::Tar)
        };
        let entry = sink.create_entry("Consulo/platform/build42/jre/lib/libjvm.so", Some(&link));
        sink.copy_entry(entry, &link, &mut std::io::empty()).unwrap();

        let path = sink.finish().unwrap();
        let seen = read_back(&path, InputFormat::from_file_name("long.tar.gz"));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.path, deep);
        assert_eq!(seen[0].1, b"\xCA\xFE\xBA\xBE");
        assert!(seen[1].0.is_symlink());
        assert_eq!(seen[1].0.link_target.as_deref(), Some(target.as_str()));
    }

    #[test]
    fn test_directory_sink_rejects_escaping_paths() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::create(temp.path().join("stage")).unwrap();

        let mut entry = sink.create_entry("../escape.txt", None);
        entry.set_size(1);
        assert!(sink.put_entry(entry, b"x").is_err());
        assert!(!temp.path().join("escape.txt").exists());
    }
}
