//! Artifact matrix manifest (`dist.toml`).
//!
//! A manifest lists every distribution and installer one build produces:
//!
//! ```toml
//! dist_dir = "out/dist"
//! target_dir = "out/artifacts"
//! build_number = 1234
//!
//! [policy]
//! executables = ["Consulo/consulo.sh"]
//!
//! [[artifact]]
//! base = "consulo-linux64.zip"
//! runtime = "https://cdn.example.com/jdk-17_linux-x64_bin.tar.gz"
//! output = "consulo-linux64"
//! kind = "tar"
//!
//! [[installer]]
//! base = "consulo-win64.zip"
//! runtime = "runtimes/jdk-17_windows-x64_bin.zip"
//! script_dir = "nsis"
//! output = "consulo-win64-installer"
//! ```
//!
//! Relative directories and local runtime paths resolve against the
//! directory holding the manifest. Base archive names resolve against
//! `dist_dir`.

use crate::bundler::{
    self, ContainerKind, DistributionRequest, InstallerRequest, PackagingPolicy, Platform,
    RuntimeLocator, Settings, SettingsBuilder,
};
use crate::error::ManifestError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One `[[artifact]]` table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSpec {
    /// Base archive name.
    pub base: PathBuf,
    /// Runtime bundle path or URL.
    pub runtime: Option<String>,
    /// Output name without extension.
    pub output: String,
    /// Output container kind.
    pub kind: ContainerKind,
    /// Forces the mac layout on or off.
    pub mac: Option<bool>,
}

/// One `[[installer]]` table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstallerSpec {
    /// Base archive name.
    pub base: PathBuf,
    /// Runtime bundle path or URL.
    pub runtime: Option<String>,
    /// Directory holding the installer script.
    pub script_dir: PathBuf,
    /// Installer name without extension.
    pub output: String,
}

/// Parsed `dist.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistManifest {
    /// Directory holding the base archives.
    pub dist_dir: PathBuf,
    /// Output directory.
    pub target_dir: PathBuf,
    /// Build number, overridable from the command line.
    #[serde(default)]
    pub build_number: Option<u32>,
    /// Download staging directory.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Installer compiler executable.
    #[serde(default)]
    pub compiler: Option<PathBuf>,
    /// Packaging policy overrides.
    #[serde(default)]
    pub policy: PackagingPolicy,
    /// Distribution archives to build.
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactSpec>,
    /// Installers to build.
    #[serde(default, rename = "installer")]
    pub installers: Vec<InstallerSpec>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl DistManifest {
    /// Reads and validates the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::parse(&text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if manifest.artifacts.is_empty() && manifest.installers.is_empty() {
            return Err(ManifestError::Invalid {
                path: path.to_path_buf(),
                reason: "no [[artifact]] or [[installer]] tables".to_string(),
            });
        }
        Ok(manifest)
    }

    /// Parses manifest text. Relative paths stay relative to the current
    /// directory.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Settings for this manifest. `build_number` overrides the manifest's.
    pub fn settings(&self, build_number: Option<u32>) -> bundler::Result<Settings> {
        let mut builder = SettingsBuilder::new()
            .dist_directory(self.resolve(&self.dist_dir))
            .target_directory(self.resolve(&self.target_dir))
            .build_number(build_number.or(self.build_number).unwrap_or_default())
            .policy(self.policy.clone());
        if let Some(staging) = &self.staging_dir {
            builder = builder.staging_directory(self.resolve(staging));
        }
        if let Some(compiler) = &self.compiler {
            builder = builder.installer_compiler(compiler);
        }
        builder.build()
    }

    /// Distribution requests, in manifest order.
    pub fn distribution_requests(&self) -> bundler::Result<Vec<DistributionRequest>> {
        self.artifacts
            .iter()
            .map(|spec| {
                let mut request =
                    DistributionRequest::new(&spec.base, &spec.output, spec.kind);
                if let Some(runtime) = &spec.runtime {
                    request = request.with_runtime(self.locator(runtime)?);
                }
                if let Some(mac) = spec.mac {
                    request = request.with_platform(Platform::from_mac_flag(mac));
                }
                Ok(request)
            })
            .collect()
    }

    /// Installer requests, in manifest order.
    pub fn installer_requests(&self) -> bundler::Result<Vec<InstallerRequest>> {
        self.installers
            .iter()
            .map(|spec| {
                let mut request = InstallerRequest::new(
                    &spec.base,
                    self.resolve(&spec.script_dir),
                    &spec.output,
                );
                if let Some(runtime) = &spec.runtime {
                    request = request.with_runtime(self.locator(runtime)?);
                }
                Ok(request)
            })
            .collect()
    }

    fn locator(&self, value: &str) -> bundler::Result<RuntimeLocator> {
        Ok(match RuntimeLocator::parse(value)? {
            RuntimeLocator::Local(path) => RuntimeLocator::Local(self.resolve(&path)),
            remote => remote,
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}
