//! Distribution orchestration.
//!
//! [`DistributionGenerator`] turns one platform-neutral base archive into one
//! distributable archive:
//!
//! 1. Resolves the runtime bundle locator, downloading remote bundles into
//!    the staging directory
//! 2. Opens an [`ArchiveSink`] for `<output>.zip` or `<output>.tar.gz`
//! 3. Copies every base entry, rewriting the build placeholder, forcing
//!    executable bits for allow-listed paths and normalizing line endings
//! 4. Merges the runtime bundle with a [`RuntimeBundleImporter`]
//! 5. Finishes the archive and reports a [`DistributionArtifact`]
//!
//! Steps 2 to 5 are blocking file I/O and run on the blocking thread pool.
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundler_dist::bundler::{
//!     ContainerKind, DistributionGenerator, DistributionRequest, RuntimeLocator, SettingsBuilder,
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
//! let request = DistributionRequest::new("consulo-linux64.zip", "consulo-linux64", ContainerKind::Tar)
//!     .with_runtime(RuntimeLocator::parse("https://cdn.example.com/jdk-17_linux-x64_bin.tar.gz")?);
//!
//! let artifact = generator.build_distribution(&request).await?;
//! println!("Created {} ({} bytes)", artifact.path.display(), artifact.size);
//! println!("SHA256: {}", artifact.checksum);
//! # Ok(())
//! # }
//! ```

use crate::bundler::{
    DistributionArtifact,
    archive::{
        ArchiveReader, ArchiveSink, ContainerKind, EXECUTABLE_MODE, EntrySink, InputFormat,
        extract_mode,
    },
    error::{Context, Error, ErrorExt, Result},
    policy::{PackagingPolicy, Platform},
    runtime::{RuntimeBundleImporter, RuntimeSource},
    settings::Settings,
    utils::http,
};
use std::{
    fmt,
    ops::ControlFlow,
    path::{Path, PathBuf},
};
use url::Url;

/// Where a runtime bundle comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeLocator {
    /// Archive on the local filesystem.
    Local(PathBuf),
    /// Archive downloaded before use.
    Remote(Url),
}

impl RuntimeLocator {
    /// Parses a locator: `http://` and `https://` values are URLs, anything
    /// else is a local path.
    pub fn parse(value: &str) -> Result<Self> {
        if value.starts_with("https://") || value.starts_with("http://") {
            Ok(RuntimeLocator::Remote(Url::parse(value)?))
        } else {
            Ok(RuntimeLocator::Local(PathBuf::from(value)))
        }
    }

    /// Returns a local path to the bundle, downloading it into `staging`
    /// when remote.
    pub async fn resolve(&self, client: &reqwest::Client, staging: &Path) -> Result<PathBuf> {
        match self {
            RuntimeLocator::Local(path) => Ok(path.clone()),
            RuntimeLocator::Remote(url) => http::download_to(client, url, staging).await,
        }
    }
}

impl fmt::Display for RuntimeLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeLocator::Local(path) => write!(f, "{}", path.display()),
            RuntimeLocator::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// One distribution to build.
#[derive(Clone, Debug)]
pub struct DistributionRequest {
    /// Base archive, relative to the dist directory or absolute.
    pub base_archive: PathBuf,
    /// Runtime bundle to merge, if any.
    pub runtime: Option<RuntimeLocator>,
    /// Output file name without extension.
    pub output_name: String,
    /// Output container kind.
    pub kind: ContainerKind,
    /// Target platform. Inferred from the base archive name when unset.
    pub platform: Option<Platform>,
}

impl DistributionRequest {
    /// Request without a runtime bundle.
    pub fn new(
        base_archive: impl Into<PathBuf>,
        output_name: impl Into<String>,
        kind: ContainerKind,
    ) -> Self {
        Self {
            base_archive: base_archive.into(),
            runtime: None,
            output_name: output_name.into(),
            kind,
            platform: None,
        }
    }

    /// Sets the runtime bundle.
    pub fn with_runtime(mut self, runtime: RuntimeLocator) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Overrides the inferred platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Target platform: the override, else inferred from the base archive
    /// file name.
    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(|| {
            Platform::detect(
                &self
                    .base_archive
                    .file_name()
                    .map(|name| name.to_string_lossy())
                    .unwrap_or_default(),
            )
        })
    }
}

/// Builds distribution archives.
#[derive(Debug)]
pub struct DistributionGenerator {
    settings: Settings,
    client: reqwest::Client,
}

impl DistributionGenerator {
    /// Creates a generator with the given settings.
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            settings,
            client: http::client()?,
        })
    }

    /// Returns a reference to the generator settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Builds one distribution archive.
    ///
    /// Any failure aborts this artifact and leaves no file at its final name.
    pub async fn build_distribution(
        &self,
        request: &DistributionRequest,
    ) -> Result<DistributionArtifact> {
        log::info!("Build: {}", request.output_name);

        let runtime = match &request.runtime {
            Some(locator) => Some(
                locator
                    .resolve(&self.client, self.settings.staging_directory())
                    .await?,
            ),
            None => None,
        };

        let settings = self.settings.clone();
        let owned_request = request.clone();
        let path = tokio::task::spawn_blocking(move || {
            package(&settings, &owned_request, runtime.as_deref())
        })
        .await
        .map_err(|e| Error::GenericError(format!("packaging task failed: {e}")))??;

        let artifact = DistributionArtifact::from_file(&request.output_name, path).await?;
        log::info!(
            "Finished {} ({} bytes, sha256 {})",
            artifact.path.display(),
            artifact.size,
            artifact.checksum
        );
        Ok(artifact)
    }
}

/// Builds one distribution archive on the current thread.
///
/// `runtime` is a local runtime bundle path, already resolved. Returns the
/// final archive path.
pub fn package(
    settings: &Settings,
    request: &DistributionRequest,
    runtime: Option<&Path>,
) -> Result<PathBuf> {
    let base = settings.base_archive(&request.base_archive);
    let platform = request.platform();
    log::debug!(
        "Packaging {} as {} for {}",
        base.display(),
        request.kind.file_name(&request.output_name),
        platform
    );

    let mut sink = ArchiveSink::create(
        settings.target_directory(),
        &request.output_name,
        request.kind,
    )?;

    copy_base_entries(&base, settings.policy(), settings.build_number(), &mut sink)?;

    if let Some(runtime) = runtime {
        RuntimeBundleImporter::new(
            RuntimeSource::from_path(runtime),
            platform,
            settings.policy(),
            settings.build_number(),
        )
        .import(&mut sink)
        .with_context(|| format!("merging runtime bundle {}", runtime.display()))?;
    }

    sink.finish()
}

/// Copies every entry of the zip `base` archive into `sink`.
///
/// Paths get the build placeholder replaced, modes come from the source
/// (or the directory/file default), and allow-listed paths are forced to
/// mode 0755. Returns the number of entries copied.
pub fn copy_base_entries(
    base: &Path,
    policy: &PackagingPolicy,
    build_number: u32,
    sink: &mut dyn EntrySink,
) -> Result<usize> {
    let mut copied = 0;

    ArchiveReader::open(base, InputFormat::Zip)?
        .walk(|meta, content| {
            let path = policy.replace_build_placeholder(&meta.path, build_number);

            let mut entry = sink.create_entry(&path, Some(meta));
            entry.set_mode(extract_mode(meta));
            entry.set_time(meta.modified);
            if policy.is_executable(&path, build_number) {
                log::debug!("Marking {} executable", path);
                entry.set_mode(EXECUTABLE_MODE);
            }

            sink.copy_entry(entry, meta, content)?;
            copied += 1;
            Ok(ControlFlow::Continue(()))
        })
        .with_context(|| format!("copying base archive {}", base.display()))?;

    log::debug!("Copied {} base entries from {}", copied, base.display());
    Ok(copied)
}

/// Calculates the SHA-256 checksum of a file.
///
/// Reads in 8KB chunks.
pub(crate) async fn calculate_sha256(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening artifact", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading artifact", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
