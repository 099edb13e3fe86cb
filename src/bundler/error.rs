//! Error types for distribution packaging.
//!
//! Provides contextual error chaining, filesystem-specific errors, and the
//! packaging failure kinds (format, root discovery, network, configuration,
//! external process).
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted error messages
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundler_dist::bundler::{Context, ErrorExt, Result};
//! use std::path::Path;
//!
//! fn read_base(path: &Path) -> Result<Vec<u8>> {
//!     let bytes = std::fs::read(path).fs_context("reading base archive", path)?;
//!     if bytes.is_empty() {
//!         kodegen_bundler_dist::bail!("base archive {} is empty", path.display());
//!     }
//!     Ok(bytes)
//! }
//! ```

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by the packaging engine.
///
/// Every variant is fatal to the distribution or staging invocation that
/// raised it. There is no partial success and no retry.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// Input bytes do not match the declared container/compression kind.
    #[error("malformed {kind} input: {reason}")]
    Format {
        /// Declared container kind (e.g. "tar", "zip", "cpio", "xar")
        kind: &'static str,
        /// What was wrong with the bytes
        reason: String,
    },

    /// Runtime bundle has no discoverable top-level directory.
    #[error("can't find root directory in runtime bundle {}", path.display())]
    RootNotFound {
        /// Runtime bundle that was scanned
        path: PathBuf,
    },

    /// Remote runtime bundle download failed.
    #[error("download of {url} failed: {reason}")]
    Network {
        /// URL that was requested
        url: String,
        /// Failure description
        reason: String,
    },

    /// HTTP client error (downloading runtime bundles).
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid packaging configuration (e.g. installer script count != 1).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// External process exited unsuccessfully.
    #[error("{command} exited with {}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    ExternalProcess {
        /// Command that was run
        command: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
    },

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "reading base archive")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// Child process could not be spawned.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to execute
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// ZIP archive reading/writing error.
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Error walking directory (installer script copy).
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// URL parsing error.
    #[error("{0}")]
    UrlParse(#[from] url::ParseError),

    /// Packaging manifest could not be parsed.
    #[error("{0}")]
    TomlError(#[from] toml::de::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Creates a [`Error::Format`] for the given container kind.
    pub fn format(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::Format {
            kind,
            reason: reason.into(),
        }
    }

    /// Returns the innermost error, looking through [`Error::Context`] layers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Error::Context(_, inner) => inner.root_cause(),
            other => other,
        }
    }
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with the engine's Error type.
/// Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
///
/// Wraps I/O errors with the path that caused them for better diagnostics.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying binary".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
///
/// # Examples
///
/// ```ignore
/// bail!("operation failed");
/// bail!("invalid value: {}", value);
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError(format!($msg)))
    };
    ($err:expr $(,)?) => {
        return Err($crate::bundler::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_context() {
        let err: Result<()> = Err(Error::format("tar", "bad header"));
        let err = err.context("reading runtime").context("merging").unwrap_err();
        assert!(matches!(err.root_cause(), Error::Format { kind: "tar", .. }));
        assert!(err.to_string().starts_with("merging: reading runtime: malformed tar input"));
    }

    #[test]
    fn test_external_process_message() {
        let err = Error::ExternalProcess {
            command: "makensis".into(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "makensis exited with code 2");
    }
}
