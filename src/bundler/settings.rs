//! Configuration for packaging operations.
//!
//! [`Settings`] holds everything one packaging run shares across the
//! artifacts it produces: where base archives are read from, where output
//! lands, the build number and the [`PackagingPolicy`]. It is constructed
//! with [`SettingsBuilder`].

use crate::bundler::policy::PackagingPolicy;
use std::path::{Path, PathBuf};

/// Directory name used under the user cache directory for downloads.
const CACHE_DIR_NAME: &str = "kodegen-dist";

/// Shared configuration of a packaging run.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_dist::bundler::SettingsBuilder;
///
/// let settings = SettingsBuilder::new()
///     .dist_directory("out/dist")
///     .target_directory("out/artifacts")
///     .build_number(42)
///     .build()?;
///
/// assert_eq!(settings.build_number(), 42);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory holding the platform base archives.
    dist_directory: PathBuf,

    /// Directory output archives and installers are written to.
    target_directory: PathBuf,

    /// Number substituted for the build placeholder.
    build_number: u32,

    /// Directory remote runtime bundles are downloaded into.
    staging_directory: PathBuf,

    /// Path rules.
    policy: PackagingPolicy,

    /// Installer compiler executable. Looked up on `PATH` when unset.
    installer_compiler: Option<PathBuf>,
}

impl Settings {
    /// Returns the directory holding base archives.
    pub fn dist_directory(&self) -> &Path {
        &self.dist_directory
    }

    /// Returns the output directory.
    pub fn target_directory(&self) -> &Path {
        &self.target_directory
    }

    /// Returns the build number.
    pub fn build_number(&self) -> u32 {
        self.build_number
    }

    /// Returns the download staging directory.
    pub fn staging_directory(&self) -> &Path {
        &self.staging_directory
    }

    /// Returns the packaging policy.
    pub fn policy(&self) -> &PackagingPolicy {
        &self.policy
    }

    /// Returns the configured installer compiler, if any.
    pub fn installer_compiler(&self) -> Option<&Path> {
        self.installer_compiler.as_deref()
    }

    /// Resolves a base archive name against the dist directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn base_archive(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dist_directory.join(name)
    }
}

/// Builder for [`Settings`].
///
/// # Required fields
///
/// - `dist_directory`
/// - `target_directory`
#[derive(Default, Debug)]
pub struct SettingsBuilder {
    dist_directory: Option<PathBuf>,
    target_directory: Option<PathBuf>,
    build_number: u32,
    staging_directory: Option<PathBuf>,
    policy: Option<PackagingPolicy>,
    installer_compiler: Option<PathBuf>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the directory holding base archives.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn dist_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.dist_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the output directory.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn target_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.target_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the build number.
    ///
    /// Default: 0
    pub fn build_number(mut self, build_number: u32) -> Self {
        self.build_number = build_number;
        self
    }

    /// Sets the download staging directory.
    ///
    /// Default: `<cache dir>/kodegen-dist`, or `<target>/.staging` when the
    /// platform has no cache directory.
    pub fn staging_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.staging_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the packaging policy.
    ///
    /// Default: [`PackagingPolicy::default`]
    pub fn policy(mut self, policy: PackagingPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the installer compiler executable.
    ///
    /// Default: `makensis` found on `PATH`
    pub fn installer_compiler<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.installer_compiler = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing:
    /// - `dist_directory`
    /// - `target_directory`
    pub fn build(self) -> crate::bundler::Result<Settings> {
        use crate::bundler::error::Context;

        let target_directory = self
            .target_directory
            .context("target_directory is required")?;
        let staging_directory = self.staging_directory.unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|cache| cache.join(CACHE_DIR_NAME))
                .unwrap_or_else(|| target_directory.join(".staging"))
        });

        Ok(Settings {
            dist_directory: self.dist_directory.context("dist_directory is required")?,
            target_directory,
            build_number: self.build_number,
            staging_directory,
            policy: self.policy.unwrap_or_default(),
            installer_compiler: self.installer_compiler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_fields() {
        let err = SettingsBuilder::new().target_directory("t").build().unwrap_err();
        assert!(err.to_string().contains("dist_directory is required"));

        let err = SettingsBuilder::new().dist_directory("d").build().unwrap_err();
        assert!(err.to_string().contains("target_directory is required"));
    }

    #[test]
    fn test_defaults() {
        let settings = SettingsBuilder::new()
            .dist_directory("d")
            .target_directory("t")
            .staging_directory("s")
            .build()
            .unwrap();
        assert_eq!(settings.build_number(), 0);
        assert_eq!(settings.staging_directory(), Path::new("s"));
        assert_eq!(settings.policy(), &PackagingPolicy::default());
        assert!(settings.installer_compiler().is_none());
        assert_eq!(
            settings.base_archive("consulo-win.zip"),
            Path::new("d/consulo-win.zip")
        );
    }
}
