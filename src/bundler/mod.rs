//! Distribution packaging engine.
//!
//! Repackages a platform-neutral base archive into per-platform distributions
//! and merges an optional runtime bundle (JDK/JRE) into them.
//!
//! # Pipeline
//!
//! | Stage | Type | Notes |
//! |-------|------|-------|
//! | Read | [`ArchiveReader`] | zip, tar, tar.gz, installer `.pkg` |
//! | Copy base | [`copy_base_entries`] | placeholder rewrite, executable bits, line endings |
//! | Merge runtime | [`RuntimeBundleImporter`] | root discovery, skip-list, remapping |
//! | Write | [`ArchiveSink`] / [`DirectorySink`] | zip, tar.gz, staging directory |
//!
//! [`DistributionGenerator`] drives the archive variant, [`InstallerStager`]
//! the staging-directory variant followed by the installer compiler.
//!
//! # Integration
//!
//! ```no_run
//! use kodegen_bundler_dist::bundler::{
//!     ContainerKind, DistributionGenerator, DistributionRequest, SettingsBuilder,
//! };
//!
//! # async fn example() -> kodegen_bundler_dist::bundler::Result<()> {
//! let settings = SettingsBuilder::new()
//!     .dist_directory("out/dist")
//!     .target_directory("out/artifacts")
//!     .build_number(1234)
//!     .build()?;
//!
//! let generator = DistributionGenerator::new(settings)?;
//! let request = DistributionRequest::new("consulo-win64.zip", "consulo-win64", ContainerKind::Zip);
//! let artifact = generator.build_distribution(&request).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod archive;
mod error;
mod generator;
mod installer;
mod policy;
mod runtime;
mod settings;
mod transform;
mod utils;

// Public re-exports
pub use archive::{
    ArchiveReader, ArchiveSink, Compression, ContainerKind, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
    DirectorySink, EXECUTABLE_MODE, EntryFormat, EntryKind, EntryMeta, EntrySink, InputFormat,
    OutputEntry, SourceFormat, extract_mode, strip_current_dir,
};
pub use error::{Context, Error, ErrorExt, Result};
pub use generator::{
    DistributionGenerator, DistributionRequest, RuntimeLocator, copy_base_entries, package,
};
pub use installer::{
    INSTALLER_EXTENSION, INSTALLER_SCRIPT_EXTENSION, InstallerRequest, InstallerStager,
    find_installer_script, stage,
};
pub use policy::{PackagingPolicy, Platform, RuntimeLayout, UselessFiles};
pub use runtime::{
    ImportStats, RuntimeBundleImporter, RuntimeRoot, RuntimeSource, discover_root,
    remap_runtime_path,
};
pub use settings::{Settings, SettingsBuilder};
pub use transform::{is_binary, normalize_line_endings};
pub use utils::http::{file_name_from_content_disposition, file_name_from_url};

use std::path::PathBuf;

/// A produced distribution archive or installer.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_dist::bundler::{
///     ContainerKind, DistributionGenerator, DistributionRequest, SettingsBuilder,
/// };
///
/// # async fn example() -> kodegen_bundler_dist::bundler::Result<()> {
/// # let settings = SettingsBuilder::new()
/// #     .dist_directory("out/dist")
/// #     .target_directory("out/artifacts")
/// #     .build()?;
/// let generator = DistributionGenerator::new(settings)?;
/// let request = DistributionRequest::new("consulo-linux64.zip", "consulo-linux64", ContainerKind::Tar);
/// let artifact = generator.build_distribution(&request).await?;
///
/// println!("Created {}: {} bytes", artifact.path.display(), artifact.size);
/// println!("SHA256: {}", artifact.checksum);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DistributionArtifact {
    /// Output name the artifact was requested under.
    pub name: String,

    /// Final path of the artifact.
    pub path: PathBuf,

    /// Size of the artifact in bytes.
    pub size: u64,

    /// SHA-256 checksum of the artifact, lowercase hex.
    ///
    /// This can be published alongside the artifact for users to verify downloads.
    pub checksum: String,
}

impl DistributionArtifact {
    /// Describes the finished file at `path`.
    pub(crate) async fn from_file(name: &str, path: PathBuf) -> Result<Self> {
        let size = tokio::fs::metadata(&path)
            .await
            .fs_context("reading metadata of", &path)?
            .len();
        let checksum = generator::calculate_sha256(&path).await?;
        Ok(Self {
            name: name.to_string(),
            path,
            size,
            checksum,
        })
    }
}
