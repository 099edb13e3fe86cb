//! `build`: one distribution archive.

use super::{runtime_locator, settings};
use crate::bundler::{DistributionGenerator, DistributionRequest, Platform};
use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::Result;

pub(super) async fn execute_build(args: &Args, config: &RuntimeConfig) -> Result<()> {
    let Command::Build {
        location,
        base,
        runtime,
        output,
        kind,
        mac,
    } = &args.command
    else {
        return Ok(());
    };

    let mut request = DistributionRequest::new(base, output, *kind);
    if let Some(locator) = runtime_locator(runtime.as_deref())? {
        request = request.with_runtime(locator);
    }
    if *mac {
        request = request.with_platform(Platform::Mac);
    }

    let out = config.output();
    out.progress(&format!(
        "Building {} for {}",
        kind.file_name(output),
        request.platform()
    ));
    if let Some(locator) = &request.runtime {
        out.verbose(&format!("Runtime bundle: {locator}"));
    }

    let generator = DistributionGenerator::new(settings(location, None)?)?;
    let artifact = generator.build_distribution(&request).await?;
    out.artifact(&artifact);
    Ok(())
}
