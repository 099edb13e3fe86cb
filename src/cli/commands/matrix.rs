//! `matrix`: every artifact of a `dist.toml` manifest.
//!
//! Artifacts are built one after another. The first failure aborts the run
//! unless `--keep-going` is given, in which case the remaining artifacts are
//! still built and the run fails at the end.

use crate::bundler::{DistributionGenerator, InstallerStager};
use crate::cli::{Args, Command, OutputManager, RuntimeConfig};
use crate::error::{CliError, DistError, Result};
use crate::manifest::DistManifest;

pub(super) async fn execute_matrix(args: &Args, config: &RuntimeConfig) -> Result<()> {
    let Command::Matrix {
        config: manifest_path,
        build_number,
        keep_going,
    } = &args.command
    else {
        return Ok(());
    };

    let manifest = DistManifest::load(manifest_path)?;
    let settings = manifest.settings(*build_number)?;
    let distributions = manifest.distribution_requests()?;
    let installers = manifest.installer_requests()?;

    let out = config.output();
    out.progress(&format!(
        "Building {} distributions and {} installers (build {})",
        distributions.len(),
        installers.len(),
        settings.build_number()
    ));

    let mut tally = Tally::new(*keep_going);

    if !distributions.is_empty() {
        let generator = DistributionGenerator::new(settings.clone())?;
        for request in &distributions {
            let result = generator.build_distribution(request).await;
            tally.record(out, &request.output_name, result.map_err(DistError::from))?;
        }
    }

    if !installers.is_empty() {
        let stager = InstallerStager::new(settings)?;
        for request in &installers {
            let result = stager.build_installer(request).await;
            tally.record(out, &request.output_name, result.map_err(DistError::from))?;
        }
    }

    tally.finish()
}

struct Tally {
    keep_going: bool,
    total: usize,
    failed: usize,
}

impl Tally {
    fn new(keep_going: bool) -> Self {
        Self {
            keep_going,
            total: 0,
            failed: 0,
        }
    }

    fn record(
        &mut self,
        out: &OutputManager,
        name: &str,
        result: Result<crate::bundler::DistributionArtifact>,
    ) -> Result<()> {
        self.total += 1;
        match result {
            Ok(artifact) => {
                out.artifact(&artifact);
                Ok(())
            }
            Err(e) if self.keep_going => {
                self.failed += 1;
                out.error(&format!("{name}: {e}"));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn finish(self) -> Result<()> {
        if self.failed > 0 {
            return Err(CliError::ArtifactsFailed {
                failed: self.failed,
                total: self.total,
            }
            .into());
        }
        Ok(())
    }
}
