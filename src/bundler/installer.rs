//! Installer staging and compilation.
//!
//! The installer variant materializes a distribution as a real directory tree
//! (the staging root) instead of an archive, adds the installer scripts, and
//! runs the external installer compiler (NSIS `makensis`) against the single
//! `.nsi` script at the staging root. The installer executable it produces is
//! moved next to the other artifacts.
//!
//! The staging root is removed once the installer has been moved out. When
//! any step fails it is left in place for diagnosis.

use crate::bundler::{
    DistributionArtifact,
    archive::DirectorySink,
    error::{Error, ErrorExt, Result},
    generator::{RuntimeLocator, copy_base_entries},
    policy::Platform,
    runtime::{RuntimeBundleImporter, RuntimeSource},
    settings::Settings,
    utils::{fs, http},
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// Extension of installer scripts searched at the staging root.
pub const INSTALLER_SCRIPT_EXTENSION: &str = "nsi";

/// Extension of the installer executable the compiler produces.
pub const INSTALLER_EXTENSION: &str = "exe";

/// One installer to build.
#[derive(Clone, Debug)]
pub struct InstallerRequest {
    /// Base archive, relative to the dist directory or absolute.
    pub base_archive: PathBuf,
    /// Runtime bundle to merge, if any.
    pub runtime: Option<RuntimeLocator>,
    /// Directory whose contents (the installer script and its resources)
    /// are copied into the staging root.
    pub script_dir: PathBuf,
    /// Installer file name without extension.
    pub output_name: String,
}

impl InstallerRequest {
    /// Request without a runtime bundle.
    pub fn new(
        base_archive: impl Into<PathBuf>,
        script_dir: impl Into<PathBuf>,
        output_name: impl Into<String>,
    ) -> Self {
        Self {
            base_archive: base_archive.into(),
            runtime: None,
            script_dir: script_dir.into(),
            output_name: output_name.into(),
        }
    }

    /// Sets the runtime bundle.
    pub fn with_runtime(mut self, runtime: RuntimeLocator) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn platform(&self) -> Platform {
        Platform::detect(
            &self
                .base_archive
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default(),
        )
    }
}

/// Stages distributions on disk and compiles installers from them.
#[derive(Debug)]
pub struct InstallerStager {
    settings: Settings,
    client: reqwest::Client,
}

impl InstallerStager {
    /// Creates a stager with the given settings.
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            settings,
            client: http::client()?,
        })
    }

    /// Staging root used for `output_name`.
    pub fn staging_root(&self, output_name: &str) -> PathBuf {
        self.settings
            .target_directory()
            .join(format!(".staging-{output_name}"))
    }

    /// Stages the distribution, runs the installer compiler and moves the
    /// produced installer to `<target>/<output>.exe`.
    pub async fn build_installer(&self, request: &InstallerRequest) -> Result<DistributionArtifact> {
        log::info!("Build installer: {}", request.output_name);

        let runtime = match &request.runtime {
            Some(locator) => Some(
                locator
                    .resolve(&self.client, self.settings.staging_directory())
                    .await?,
            ),
            None => None,
        };

        let staging = self.staging_root(&request.output_name);
        fs::create_dir_all(&staging, true).await?;

        match self.compile(request, runtime, &staging).await {
            Ok(path) => {
                fs::remove_dir_all(&staging).await?;
                let artifact = DistributionArtifact::from_file(&request.output_name, path).await?;
                log::info!("Finished {}", artifact.path.display());
                Ok(artifact)
            }
            Err(e) => {
                log::warn!("Keeping staging root {} for inspection", staging.display());
                Err(e)
            }
        }
    }

    async fn compile(
        &self,
        request: &InstallerRequest,
        runtime: Option<PathBuf>,
        staging: &Path,
    ) -> Result<PathBuf> {
        let settings = self.settings.clone();
        let base = settings.base_archive(&request.base_archive);
        let platform = request.platform();
        let root = staging.to_path_buf();
        let staged = tokio::task::spawn_blocking(move || {
            stage(&settings, &base, runtime.as_deref(), platform, &root)
        })
        .await
        .map_err(|e| Error::GenericError(format!("staging task failed: {e}")))??;
        log::debug!("Staged {} entries into {}", staged, staging.display());

        fs::copy_dir(&request.script_dir, staging).await?;
        let script = find_installer_script(staging)?;
        let before = installer_files(staging)?;

        let compiler = match self.settings.installer_compiler() {
            Some(path) => path.to_path_buf(),
            None => which::which("makensis").map_err(|e| {
                Error::Configuration(format!("installer compiler makensis not found: {e}"))
            })?,
        };
        run_compiler(&compiler, &script, staging).await?;

        let produced: Vec<_> = installer_files(staging)?
            .difference(&before)
            .cloned()
            .collect();
        let [installer] = produced.as_slice() else {
            return Err(Error::Configuration(format!(
                "expected the installer compiler to produce one .{} file in {}, found {}",
                INSTALLER_EXTENSION,
                staging.display(),
                produced.len()
            )));
        };

        let dest = self.settings.target_directory().join(format!(
            "{}.{}",
            request.output_name, INSTALLER_EXTENSION
        ));
        tokio::fs::rename(installer, &dest)
            .await
            .fs_context("moving installer to", &dest)?;
        Ok(dest)
    }
}

/// Materializes the base archive and the runtime bundle under `root`.
///
/// Returns the number of entries staged.
pub fn stage(
    settings: &Settings,
    base: &Path,
    runtime: Option<&Path>,
    platform: Platform,
    root: &Path,
) -> Result<usize> {
    let mut sink = DirectorySink::create(root)?;
    copy_base_entries(base, settings.policy(), settings.build_number(), &mut sink)?;

    if let Some(runtime) = runtime {
        RuntimeBundleImporter::new(
            RuntimeSource::from_path(runtime),
            platform,
            settings.policy(),
            settings.build_number(),
        )
        .import(&mut sink)?;
    }

    Ok(sink.entry_count())
}

/// Returns the single installer script at the top of `root`.
///
/// Zero or several scripts is a [`Error::Configuration`].
pub fn find_installer_script(root: &Path) -> Result<PathBuf> {
    let scripts = top_level_files(root, INSTALLER_SCRIPT_EXTENSION)?;
    let mut iter = scripts.into_iter();
    match (iter.next(), iter.next()) {
        (Some(script), None) => Ok(script),
        (None, _) => Err(Error::Configuration(format!(
            "no .{} installer script in {}",
            INSTALLER_SCRIPT_EXTENSION,
            root.display()
        ))),
        (Some(first), Some(second)) => Err(Error::Configuration(format!(
            "more than one .{} installer script in {}: {}, {}{}",
            INSTALLER_SCRIPT_EXTENSION,
            root.display(),
            first.display(),
            second.display(),
            if iter.next().is_some() { ", ..." } else { "" }
        ))),
    }
}

fn installer_files(root: &Path) -> Result<BTreeSet<PathBuf>> {
    top_level_files(root, INSTALLER_EXTENSION)
}

fn top_level_files(root: &Path, extension: &str) -> Result<BTreeSet<PathBuf>> {
    let mut found = BTreeSet::new();
    for entry in std::fs::read_dir(root).fs_context("listing", root)? {
        let path = entry.fs_context("listing", root)?.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            found.insert(path);
        }
    }
    Ok(found)
}

async fn run_compiler(compiler: &Path, script: &Path, staging: &Path) -> Result<()> {
    let script_name = script.file_name().unwrap_or(script.as_os_str());
    let command = format!("{} {}", compiler.display(), script_name.to_string_lossy());
    log::info!("Running {} in {}", command, staging.display());

    let output = tokio::process::Command::new(compiler)
        .arg(script_name)
        .current_dir(staging)
        .output()
        .await
        .map_err(|error| Error::CommandFailed {
            command: command.clone(),
            error,
        })?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        log::debug!("{}", line);
    }
    if !output.status.success() {
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            log::warn!("{}", line);
        }
        return Err(Error::ExternalProcess {
            command,
            code: output.status.code(),
        });
    }
    Ok(())
}
