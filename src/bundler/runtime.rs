//! Runtime bundle import.
//!
//! A runtime bundle (a JDK/JRE archive) is merged into a distribution in two
//! passes over the same file:
//!
//! 1. **Root discovery** finds the bundle's top-level directory: the first
//!    directory entry whose name, after dropping a leading `./`, is not empty.
//! 2. **Stream and remap** reopens the bundle and forwards every entry below
//!    that root to the output sink, dropping useless files and the platform's
//!    skip-list and moving the root to the platform's runtime location.
//!
//! Knowing the root before the second pass keeps memory bounded: no entry is
//! buffered beyond its own content.
//!
//! Installer payloads often have no top-level directory; their first
//! directory is `.` itself. Such a bundle is *rootless* and all of its
//! entries count as being below the root.

use crate::bundler::{
    archive::{ArchiveReader, EntryKind, EntryMeta, EntrySink, InputFormat, strip_current_dir},
    error::{Error, Result},
    policy::{PackagingPolicy, Platform},
};
use std::{
    borrow::Cow,
    ops::ControlFlow,
    path::{Path, PathBuf},
};

/// A runtime bundle file and the format it is read as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSource {
    path: PathBuf,
    format: InputFormat,
}

impl RuntimeSource {
    /// Runtime bundle at `path`, its format picked from the file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = InputFormat::from_file_name(&name);
        Self { path, format }
    }

    /// Runtime bundle at `path` read as `format`.
    pub fn with_format(path: impl Into<PathBuf>, format: InputFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Path of the bundle.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format the bundle is read as.
    pub fn format(&self) -> InputFormat {
        self.format
    }

    /// Opens a fresh reader over the bundle.
    pub fn open(&self) -> Result<ArchiveReader> {
        ArchiveReader::open(&self.path, self.format)
    }
}

/// Top-level directory of a runtime bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeRoot {
    name: String,
    original: String,
    prefix: String,
}

impl RuntimeRoot {
    const ROOTLESS: &'static str = ".";

    /// Root from the directory entry name as stored in the archive.
    pub fn new(original: &str) -> Self {
        let stripped = strip_current_dir(original);
        let name = if stripped == Self::ROOTLESS {
            stripped
        } else {
            stripped.trim_end_matches('/')
        };
        Self {
            name: name.to_string(),
            original: original.to_string(),
            prefix: format!("{name}/"),
        }
    }

    /// Root name without `./` and trailing slash, e.g. `jdk-17.0.1`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root entry name exactly as stored, e.g. `./jdk-17.0.1/`.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Returns true when the bundle has no top-level directory.
    pub fn is_rootless(&self) -> bool {
        self.name == Self::ROOTLESS
    }

    /// Path of `name` relative to the root, `None` when it lies outside.
    ///
    /// `name` must already have its leading `./` removed. The root itself
    /// maps to the empty string.
    pub fn relative<'a>(&self, name: &'a str) -> Option<&'a str> {
        if self.is_rootless() {
            Some(name)
        } else if name == self.name {
            Some("")
        } else {
            name.strip_prefix(self.prefix.as_str())
        }
    }
}

/// Maps a runtime entry to its path inside the distribution.
///
/// `raw_path` is the entry name as stored. Returns `None` for useless files,
/// entries outside `root`, and entries under one of the platform's skip
/// suffixes. The result still contains the build placeholder of the layout.
pub fn remap_runtime_path(
    policy: &PackagingPolicy,
    platform: Platform,
    root: &RuntimeRoot,
    raw_path: &str,
) -> Option<String> {
    let name = strip_current_dir(raw_path);
    if policy.is_useless(name) {
        return None;
    }

    let relative = root.relative(name)?;
    if policy
        .skip_suffixes(platform)
        .iter()
        .any(|suffix| relative.starts_with(suffix.as_str()))
    {
        return None;
    }

    Some(policy.layout(platform).target(relative))
}

/// Finds the top-level directory of `source`.
///
/// Reads until the first directory entry with a non-empty name after
/// dropping `./`. Fails with [`Error::RootNotFound`] when there is none.
pub fn discover_root(source: &RuntimeSource) -> Result<RuntimeRoot> {
    let mut found = None;
    source.open()?.walk(|meta, _| {
        if meta.is_dir() && !strip_current_dir(&meta.path).is_empty() {
            found = Some(RuntimeRoot::new(&meta.path));
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    })?;

    found.ok_or_else(|| Error::RootNotFound {
        path: source.path().to_path_buf(),
    })
}

/// Entry counts of one import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Entries forwarded to the sink.
    pub written: usize,
    /// Entries dropped by the remap rule.
    pub skipped: usize,
}

/// Merges one runtime bundle into an output sink.
#[derive(Debug)]
pub struct RuntimeBundleImporter<'a> {
    source: RuntimeSource,
    platform: Platform,
    policy: &'a PackagingPolicy,
    build_number: u32,
}

impl<'a> RuntimeBundleImporter<'a> {
    /// Creates an importer for `source` laid out for `platform`.
    pub fn new(
        source: RuntimeSource,
        platform: Platform,
        policy: &'a PackagingPolicy,
        build_number: u32,
    ) -> Self {
        Self {
            source,
            platform,
            policy,
            build_number,
        }
    }

    /// Runs both passes, writing every kept entry to `sink`.
    pub fn import(&self, sink: &mut dyn EntrySink) -> Result<ImportStats> {
        let root = discover_root(&self.source)?;
        log::info!(
            "Merging runtime bundle {} (root {}) for {}",
            self.source.path().display(),
            root.original(),
            self.platform
        );

        let mut stats = ImportStats::default();
        self.source.open()?.walk(|meta, content| {
            let Some(target) = self.target_path(&root, &meta.path) else {
                log::debug!("Skipping runtime entry {}", meta.path);
                stats.skipped += 1;
                return Ok(ControlFlow::Continue(()));
            };

            let source = match self.hard_link_source(&root, meta) {
                Some(source) => source,
                None => {
                    log::warn!(
                        "Dropping hard link {} to {}: target is not part of the distribution",
                        meta.path,
                        meta.link_target.as_deref().unwrap_or_default()
                    );
                    stats.skipped += 1;
                    return Ok(ControlFlow::Continue(()));
                }
            };

            log::trace!("{} -> {}", meta.path, target);
            let entry = sink.create_entry(&target, Some(&*source));
            sink.copy_entry(entry, &source, content)?;
            stats.written += 1;
            Ok(ControlFlow::Continue(()))
        })?;

        log::debug!(
            "Runtime merge wrote {} entries, skipped {}",
            stats.written,
            stats.skipped
        );
        Ok(stats)
    }

    fn target_path(&self, root: &RuntimeRoot, raw_path: &str) -> Option<String> {
        remap_runtime_path(self.policy, self.platform, root, raw_path).map(|target| {
            self.policy
                .replace_build_placeholder(&target, self.build_number)
                .into_owned()
        })
    }

    /// Hard links name another archive member, which moves too. Returns the
    /// metadata with the link target remapped, `None` when the target is
    /// dropped. Other entries pass through.
    fn hard_link_source<'m>(
        &self,
        root: &RuntimeRoot,
        meta: &'m EntryMeta,
    ) -> Option<Cow<'m, EntryMeta>> {
        if meta.kind != EntryKind::HardLink {
            return Some(Cow::Borrowed(meta));
        }

        let target = self.target_path(root, meta.link_target.as_deref()?)?;
        let mut remapped = meta.clone();
        remapped.link_target = Some(target);
        Some(Cow::Owned(remapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::archive::{
        ArchiveSink, ContainerKind, DirectorySink,
        tests::{write_pkg, write_tar_gz, write_zip},
    };
    use std::io::Read;
    use tempfile::TempDir;

    fn root(name: &str) -> RuntimeRoot {
        RuntimeRoot::new(name)
    }

    #[test]
    fn test_discovers_first_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime.tar.gz");
        write_tar_gz(
            &path,
            &[("pkgroot/", b"", 0o755), ("pkgroot/bin/java", b"", 0o755)],
        );

        let root = discover_root(&RuntimeSource::from_path(&path)).unwrap();
        assert_eq!(root.name(), "pkgroot");
        assert!(!root.is_rootless());
    }

    #[test]
    fn test_discovery_skips_leading_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime.zip");
        write_zip(
            &path,
            &[("NOTICE", b"n"), ("jdk-17.0.1/", b""), ("jdk-17.0.1/release", b"")],
        );

        let root = discover_root(&RuntimeSource::from_path(&path)).unwrap();
        assert_eq!(root.name(), "jdk-17.0.1");
        assert_eq!(root.original(), "jdk-17.0.1/");
    }

    #[test]
    fn test_discovery_without_directory_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime.zip");
        write_zip(&path, &[("java", b"x"), ("release", b"y")]);

        let err = discover_root(&RuntimeSource::from_path(&path)).unwrap_err();
        assert!(matches!(err, Error::RootNotFound { .. }));
    }

    #[test]
    fn test_root_normalization() {
        assert_eq!(root("./jdk-17/").name(), "jdk-17");
        assert_eq!(root("jdk-17").relative("jdk-17/bin/java"), Some("bin/java"));
        assert_eq!(root("jdk-17/").relative("jdk-17"), Some(""));
        assert_eq!(root("jdk-17/").relative("jdk-17/"), Some(""));
        assert_eq!(root("jdk").relative("jdk-17/bin/java"), None);
        assert!(root("./.").is_rootless());
        assert!(root(".").is_rootless());
        assert_eq!(root(".").relative("Contents/Home"), Some("Contents/Home"));
    }

    #[test]
    fn test_remap_non_mac_skip_list() {
        let policy = PackagingPolicy::default();
        let root = root("jdk-9/");

        assert_eq!(
            remap_runtime_path(&policy, Platform::Other, &root, "jdk-9/jmods/foo.jmod"),
            None
        );
        assert_eq!(
            remap_runtime_path(&policy, Platform::Other, &root, "jdk-9/lib/src.zip"),
            None
        );
        assert_eq!(
            remap_runtime_path(&policy, Platform::Other, &root, "./jdk-9/bin/java").as_deref(),
            Some("Consulo/platform/buildSNAPSHOT/jre/bin/java")
        );
        assert_eq!(
            remap_runtime_path(&policy, Platform::Other, &root, "jdk-9/").as_deref(),
            Some("Consulo/platform/buildSNAPSHOT/jre/")
        );
        assert_eq!(
            remap_runtime_path(&policy, Platform::Other, &root, "other/bin/java"),
            None
        );
        assert_eq!(
            remap_runtime_path(&policy, Platform::Other, &root, "jdk-9/bin/java.pdb"),
            None
        );
    }

    #[test]
    fn test_remap_mac_rooted() {
        let policy = PackagingPolicy::default();
        let root = root("jdk-17.0.1.jdk/");

        assert_eq!(
            remap_runtime_path(
                &policy,
                Platform::Mac,
                &root,
                "jdk-17.0.1.jdk/Contents/Home/bin/java"
            )
            .as_deref(),
            Some("Consulo.app/Contents/platform/buildSNAPSHOT/jre/jdk/Contents/Home/bin/java")
        );
        assert_eq!(
            remap_runtime_path(
                &policy,
                Platform::Mac,
                &root,
                "jdk-17.0.1.jdk/Contents/Home/jmods/java.base.jmod"
            ),
            None
        );
        assert_eq!(
            remap_runtime_path(&policy, Platform::Mac, &root, "jdk-17.0.1.jdk/Contents/.DS_Store"),
            None
        );
    }

    #[test]
    fn test_remap_mac_rootless() {
        let policy = PackagingPolicy::default();
        let root = root(".");

        assert_eq!(remap_runtime_path(&policy, Platform::Mac, &root, "."), None);
        assert_eq!(
            remap_runtime_path(&policy, Platform::Mac, &root, "./Contents/Home/bin/java")
                .as_deref(),
            Some("Consulo.app/Contents/platform/buildSNAPSHOT/jre/jdk/Contents/Home/bin/java")
        );
        assert_eq!(
            remap_runtime_path(&policy, Platform::Mac, &root, "./Contents/Home/lib/src.zip"),
            None
        );
    }

    #[test]
    fn test_import_tar_runtime_into_tar_archive() {
        let temp = TempDir::new().unwrap();
        let runtime = temp.path().join("jdk-9-linux.tar.gz");
        write_tar_gz(
            &runtime,
            &[
                ("jdk-9/", b"", 0o755),
                ("jdk-9/bin/java", b"\x7FELF\x02\x01", 0o755),
                ("jdk-9/lib/src.zip", b"PK\x03\x04", 0o644),
                ("jdk-9/release", b"JAVA_VERSION=\"9\"\r\n", 0o644),
            ],
        );

        let policy = PackagingPolicy::default();
        let mut sink = ArchiveSink::create(temp.path(), "out", ContainerKind::Tar).unwrap();
        let stats = RuntimeBundleImporter::new(
            RuntimeSource::from_path(&runtime),
            Platform::Other,
            &policy,
            42,
        )
        .import(&mut sink)
        .unwrap();
        assert_eq!(stats, ImportStats { written: 3, skipped: 1 });

        let out = sink.finish().unwrap();
        let mut entries = Vec::new();
        ArchiveReader::open(&out, InputFormat::from_file_name("out.tar.gz"))
            .unwrap()
            .walk(|meta, content| {
                let mut data = Vec::new();
                content.read_to_end(&mut data)?;
                entries.push((meta.path.clone(), meta.unix_mode, data));
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();

        let names: Vec<_> = entries
            .iter()
            .map(|(path, _, _)| path.trim_end_matches('/'))
            .collect();
        assert_eq!(
            names,
            [
                "Consulo/platform/build42/jre",
                "Consulo/platform/build42/jre/bin/java",
                "Consulo/platform/build42/jre/release",
            ]
        );
        assert_eq!(entries[1].1, Some(0o755));
        assert_eq!(entries[1].2, b"\x7FELF\x02\x01");
        assert_eq!(entries[2].2, b"JAVA_VERSION=\"9\"\n");
    }

    #[test]
    fn test_hard_links_follow_their_target() {
        let temp = TempDir::new().unwrap();
        let runtime = temp.path().join("jdk-9-linux.tar.gz");

        let file = std::fs::File::create(&runtime).unwrap();
        let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
            file,
            flate2::Compression::default(),
        ));
        for (name, data, kind) in [
            ("jdk-9/", &b""[..], tar::EntryType::Directory),
            ("jdk-9/bin/java", &b"\x7FELF"[..], tar::EntryType::Regular),
            ("jdk-9/lib/src.zip", &b"PK"[..], tar::EntryType::Regular),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(kind);
            header.set_mode(0o755);
            header.set_mtime(1_600_000_000);
            header.set_size(data.len() as u64);
            builder.append_data(&mut header, name, data).unwrap();
        }
        for (name, target) in [
            ("jdk-9/bin/javaw", "jdk-9/bin/java"),
            ("jdk-9/lib/sources.zip", "jdk-9/lib/src.zip"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Link);
            header.set_mode(0o755);
            header.set_mtime(1_600_000_000);
            header.set_size(0);
            builder.append_link(&mut header, name, target).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();

        let policy = PackagingPolicy::default();
        let mut sink = ArchiveSink::create(temp.path(), "out", ContainerKind::Tar).unwrap();
        let stats = RuntimeBundleImporter::new(
            RuntimeSource::from_path(&runtime),
            Platform::Other,
            &policy,
            42,
        )
        .import(&mut sink)
        .unwrap();
        assert_eq!(stats, ImportStats { written: 3, skipped: 2 });

        let out = sink.finish().unwrap();
        let mut entries = Vec::new();
        ArchiveReader::open(&out, InputFormat::from_file_name("out.tar.gz"))
            .unwrap()
            .walk(|meta, _| {
                entries.push(meta.clone());
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();

        let link = entries
            .iter()
            .find(|meta| meta.path == "Consulo/platform/build42/jre/bin/javaw")
            .unwrap();
        assert_eq!(link.kind, EntryKind::HardLink);
        assert_eq!(
            link.link_target.as_deref(),
            Some("Consulo/platform/build42/jre/bin/java")
        );
        assert!(!entries.iter().any(|meta| meta.path.ends_with("sources.zip")));
    }

    #[test]
    fn test_import_zip_runtime_requires_root() {
        let temp = TempDir::new().unwrap();
        let runtime = temp.path().join("flat.zip");
        write_zip(&runtime, &[("java", b"x")]);

        let policy = PackagingPolicy::default();
        let mut sink = DirectorySink::create(temp.path().join("stage")).unwrap();
        let err = RuntimeBundleImporter::new(
            RuntimeSource::from_path(&runtime),
            Platform::Other,
            &policy,
            1,
        )
        .import(&mut sink)
        .unwrap_err();
        assert!(matches!(err, Error::RootNotFound { .. }));
        assert_eq!(sink.entry_count(), 0);
    }

    #[test]
    fn test_import_rootless_installer_payload_into_directory() {
        let temp = TempDir::new().unwrap();
        let runtime = temp.path().join("jdk-17_macos-x64_bin.pkg");
        write_pkg(
            &runtime,
            &[
                (".", 0o040755, b""),
                ("./Contents", 0o040755, b""),
                ("./Contents/Home/bin/java", 0o100755, b"\xCF\xFA\xED\xFE\x07\x00"),
                ("./Contents/Home/jmods/java.base.jmod", 0o100644, b"JM"),
                ("./Contents/Info.plist", 0o100644, b"<plist>\r\n</plist>\r\n"),
            ],
        );

        let policy = PackagingPolicy::default();
        let stage = temp.path().join("stage");
        let mut sink = DirectorySink::create(&stage).unwrap();
        let stats = RuntimeBundleImporter::new(
            RuntimeSource::from_path(&runtime),
            Platform::Mac,
            &policy,
            3,
        )
        .import(&mut sink)
        .unwrap();
        assert_eq!(stats, ImportStats { written: 3, skipped: 2 });

        let jdk = stage.join("Consulo.app/Contents/platform/build3/jre/jdk");
        assert!(jdk.join("Contents").is_dir());
        assert_eq!(
            std::fs::read(jdk.join("Contents/Home/bin/java")).unwrap(),
            b"\xCF\xFA\xED\xFE\x07\x00"
        );
        assert_eq!(
            std::fs::read(jdk.join("Contents/Info.plist")).unwrap(),
            b"<plist>\n</plist>\n"
        );
        assert!(!jdk.join("Contents/Home/jmods").exists());
    }

    #[test]
    fn test_runtime_source_format_from_name() {
        assert_eq!(
            RuntimeSource::from_path("/tmp/jdk.pkg").format(),
            InputFormat::Installer
        );
        assert_eq!(RuntimeSource::from_path("/tmp/jdk.zip").format(), InputFormat::Zip);
    }
}
