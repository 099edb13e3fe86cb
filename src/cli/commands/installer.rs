//! `installer`: staged distribution compiled into an installer executable.

use super::{runtime_locator, settings};
use crate::bundler::{InstallerRequest, InstallerStager};
use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::Result;

pub(super) async fn execute_installer(args: &Args, config: &RuntimeConfig) -> Result<()> {
    let Command::Installer {
        location,
        base,
        runtime,
        script_dir,
        output,
        compiler,
    } = &args.command
    else {
        return Ok(());
    };

    let mut request = InstallerRequest::new(base, script_dir, output);
    if let Some(locator) = runtime_locator(runtime.as_deref())? {
        request = request.with_runtime(locator);
    }

    let stager = InstallerStager::new(settings(location, compiler.as_deref())?)?;
    let out = config.output();
    out.progress(&format!("Building installer {output}"));
    out.verbose(&format!(
        "Staging into {}",
        stager.staging_root(output).display()
    ));

    let artifact = stager.build_installer(&request).await?;
    out.artifact(&artifact);
    Ok(())
}
