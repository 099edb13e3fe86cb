//! Command executors.
//!
//! Each command builds its [`Settings`] from the arguments, drives the
//! packaging engine and reports artifacts through the [`OutputManager`].
//!
//! [`OutputManager`]: crate::cli::OutputManager

mod build;
mod installer;
mod matrix;

use crate::bundler::{self, RuntimeLocator, Settings, SettingsBuilder};
use crate::cli::{Args, BuildLocation, Command, RuntimeConfig};
use crate::error::Result;
use std::path::Path;

use build::execute_build;
use installer::execute_installer;
use matrix::execute_matrix;

/// Execute the command selected by `args` and return the process exit code
pub async fn execute_command(args: Args) -> Result<i32> {
    let config = RuntimeConfig::from(&args);

    if let Err(validation_error) = args.validate() {
        config
            .output()
            .error(&format!("Invalid arguments: {validation_error}"));
        return Ok(1);
    }

    let result = match &args.command {
        Command::Build { .. } => execute_build(&args, &config).await,
        Command::Matrix { .. } => execute_matrix(&args, &config).await,
        Command::Installer { .. } => execute_installer(&args, &config).await,
    };

    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            let output = config.output();
            output.error(&format!("Command '{}' failed: {}", args.command.name(), e));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() && !output.is_quiet() {
                output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    output.indent(&format!("• {suggestion}"));
                }
            }
            Ok(1)
        }
    }
}

fn settings(location: &BuildLocation, compiler: Option<&Path>) -> bundler::Result<Settings> {
    let mut builder = SettingsBuilder::new()
        .dist_directory(&location.dist_dir)
        .target_directory(&location.target_dir)
        .build_number(location.build_number);
    if let Some(staging) = &location.staging_dir {
        builder = builder.staging_directory(staging);
    }
    if let Some(compiler) = compiler {
        builder = builder.installer_compiler(compiler);
    }
    builder.build()
}

fn runtime_locator(runtime: Option<&str>) -> bundler::Result<Option<RuntimeLocator>> {
    runtime.map(RuntimeLocator::parse).transpose()
}
