//! Command line argument parsing and validation.

use crate::bundler::ContainerKind;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Platform distribution packager
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_dist",
    version,
    about = "Repackage platform archives into per-platform distributions",
    long_about = "Repackage a platform-neutral base archive into zip or tar.gz distributions,
merging an optional runtime bundle (zip, tar.gz or .pkg, local or https).

Usage:
  kodegen_bundler_dist build --dist-dir out/dist --target-dir out/artifacts \\
      --base consulo-linux64.zip --runtime jdk-17_linux-x64_bin.tar.gz \\
      --output consulo-linux64 --kind tar --build-number 1234
  kodegen_bundler_dist matrix --config dist.toml --build-number 1234
  kodegen_bundler_dist installer --dist-dir out/dist --target-dir out/artifacts \\
      --base consulo-win64.zip --script-dir nsis --output consulo-win64-installer"
)]
pub struct Args {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Show per-artifact details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Directories and build number shared by single-artifact commands
#[derive(ClapArgs, Debug, Clone)]
pub struct BuildLocation {
    /// Directory holding the base archives
    #[arg(long, value_name = "DIR")]
    pub dist_dir: PathBuf,

    /// Directory the output is written to
    #[arg(long, value_name = "DIR")]
    pub target_dir: PathBuf,

    /// Build number substituted for the build placeholder
    #[arg(long, default_value_t = 0, env = "BUILD_NUMBER")]
    pub build_number: u32,

    /// Directory remote runtime bundles are downloaded into
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build one distribution archive
    Build {
        /// Input, output and build number locations
        #[command(flatten)]
        location: BuildLocation,

        /// Base archive name inside the dist directory
        #[arg(long, value_name = "FILE")]
        base: PathBuf,

        /// Runtime bundle path or https URL
        #[arg(long, value_name = "PATH|URL")]
        runtime: Option<String>,

        /// Output name without extension
        #[arg(long, value_name = "NAME")]
        output: String,

        /// Output archive kind
        #[arg(long, value_name = "zip|tar")]
        kind: ContainerKind,

        /// Use the mac layout regardless of the base archive name
        #[arg(long)]
        mac: bool,
    },

    /// Build every artifact listed in a manifest
    Matrix {
        /// Manifest path
        #[arg(long, value_name = "FILE", default_value = "dist.toml")]
        config: PathBuf,

        /// Build number, overriding the manifest's
        #[arg(long, env = "BUILD_NUMBER")]
        build_number: Option<u32>,

        /// Continue with the remaining artifacts after a failure
        #[arg(long)]
        keep_going: bool,
    },

    /// Stage a distribution and compile an installer from it
    Installer {
        /// Input, output and build number locations
        #[command(flatten)]
        location: BuildLocation,

        /// Base archive name inside the dist directory
        #[arg(long, value_name = "FILE")]
        base: PathBuf,

        /// Runtime bundle path or https URL
        #[arg(long, value_name = "PATH|URL")]
        runtime: Option<String>,

        /// Directory holding the installer script
        #[arg(long, value_name = "DIR")]
        script_dir: PathBuf,

        /// Installer name without extension
        #[arg(long, value_name = "NAME")]
        output: String,

        /// Installer compiler (default: makensis on PATH)
        #[arg(long, value_name = "PATH")]
        compiler: Option<PathBuf>,
    },
}

impl Command {
    /// Command name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Build { .. } => "build",
            Command::Matrix { .. } => "matrix",
            Command::Installer { .. } => "installer",
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        let output = match &self.command {
            Command::Build { output, .. } | Command::Installer { output, .. } => output,
            Command::Matrix { .. } => return Ok(()),
        };

        if output.is_empty() {
            return Err("--output must not be empty".to_string());
        }
        if output.contains(['/', '\\']) {
            return Err(format!("--output must be a file name, got '{output}'"));
        }
        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_consistent() {
        Args::command().debug_assert();
        let build = Args::command().find_subcommand("build").cloned().unwrap();
        assert!(build.get_arguments().any(|arg| arg.get_id() == "dist_dir"));
    }

    #[test]
    fn test_parse_build() {
        let args = Args::try_parse_from([
            "kodegen_bundler_dist",
            "build",
            "--dist-dir",
            "d",
            "--target-dir",
            "t",
            "--base",
            "consulo-mac64.zip",
            "--output",
            "consulo-mac64",
            "--kind",
            "tar.gz",
            "--mac",
        ])
        .unwrap();

        let Command::Build { kind, mac, location, .. } = &args.command else {
            panic!("expected build, got {:?}", args.command);
        };
        assert_eq!(*kind, ContainerKind::Tar);
        assert!(*mac);
        assert_eq!(location.dist_dir, PathBuf::from("d"));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_output_must_be_a_file_name() {
        let args = Args::try_parse_from([
            "kodegen_bundler_dist",
            "installer",
            "--dist-dir",
            "d",
            "--target-dir",
            "t",
            "--base",
            "b.zip",
            "--script-dir",
            "nsis",
            "--output",
            "../escape",
        ])
        .unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = Args::try_parse_from([
            "kodegen_bundler_dist",
            "build",
            "--dist-dir",
            "d",
            "--target-dir",
            "t",
            "--base",
            "b.zip",
            "--output",
            "o",
            "--kind",
            "rar",
        ]);
        assert!(result.is_err());
    }
}
