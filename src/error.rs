//! Error types for kodegen_bundler_dist operations.
//!
//! This module defines the application-level error type with actionable
//! error messages and recovery suggestions. Packaging failures are carried
//! as [`crate::bundler::Error`].

use crate::bundler::Error as BundlerError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kodegen_bundler_dist operations
pub type Result<T> = std::result::Result<T, DistError>;

/// Main error type for all kodegen_bundler_dist operations
#[derive(Error, Debug)]
pub enum DistError {
    /// Packaging engine errors
    #[error("Packaging error: {0}")]
    Bundler(#[from] BundlerError),

    /// Manifest loading errors
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Manifest (`dist.toml`) errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        /// Manifest path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid TOML or has unknown keys
    #[error("Failed to parse manifest {path}: {source}")]
    Parse {
        /// Manifest path
        path: PathBuf,
        /// Parsing error
        #[source]
        source: toml::de::Error,
    },

    /// Manifest parsed but describes nothing buildable
    #[error("Invalid manifest {path}: {reason}")]
    Invalid {
        /// Manifest path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Some artifacts of a matrix run failed
    #[error("{failed} of {total} artifacts failed")]
    ArtifactsFailed {
        /// Number of failed artifacts
        failed: usize,
        /// Number of artifacts attempted
        total: usize,
    },
}

impl DistError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DistError::Bundler(error) => bundler_suggestions(error.root_cause()),
            DistError::Manifest(ManifestError::Read { path, .. }) => vec![
                format!("Check that {} exists and is readable", path.display()),
                "Pass the manifest location with --config".to_string(),
            ],
            DistError::Manifest(ManifestError::Parse { .. }) => vec![
                "Check the manifest for typos in table or key names".to_string(),
                "Each [[artifact]] needs base, output and kind".to_string(),
            ],
            DistError::Cli(CliError::ArtifactsFailed { .. }) => vec![
                "Scroll up for the error of each failed artifact".to_string(),
                "Run with RUST_LOG=debug for per-entry details".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

fn bundler_suggestions(error: &BundlerError) -> Vec<String> {
    match error {
        BundlerError::Format { kind, .. } => vec![
            format!("Check that the input really is a {kind} archive"),
            "Runtime bundle formats are chosen by file name: .zip, .pkg, .tar, anything else is tar.gz"
                .to_string(),
        ],
        BundlerError::RootNotFound { path } => vec![
            format!(
                "List the contents of {} and check it has a top-level directory",
                path.display()
            ),
            "Repack the runtime with a single root directory".to_string(),
        ],
        BundlerError::Network { url, .. } => vec![
            format!("Check that {url} is reachable from this machine"),
            "Download the runtime manually and pass a local path instead".to_string(),
        ],
        BundlerError::Configuration(_) => vec![
            "The installer script directory must hold exactly one .nsi file".to_string(),
            "Install NSIS or pass --compiler with the makensis path".to_string(),
        ],
        BundlerError::ExternalProcess { .. } | BundlerError::CommandFailed { .. } => vec![
            "Inspect the staging directory left in the target directory".to_string(),
            "Run makensis by hand inside it to see the full output".to_string(),
        ],
        BundlerError::Fs { path, .. } => vec![format!(
            "Check permissions and free space for {}",
            path.display()
        )],
        _ => vec!["Check the error message above for specific details".to_string()],
    }
}
