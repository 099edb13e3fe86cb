//! # kodegen_bundler_dist
//!
//! Platform distribution packager.
//!
//! Takes one platform-neutral build archive and produces the per-platform
//! distributions of an application: zip and tar.gz archives with the build
//! number filled in, launcher permissions fixed, text files normalized to LF
//! and an optional runtime bundle (JDK/JRE) merged at the platform's runtime
//! location. Windows installers are produced by staging the same tree on
//! disk and running NSIS against it.
//!
//! ## Usage
//!
//! ```bash
//! kodegen_bundler_dist build --dist-dir out/dist --target-dir out/artifacts \
//!     --base consulo-linux64.zip --runtime jdk-17_linux-x64_bin.tar.gz \
//!     --output consulo-linux64 --kind tar --build-number 1234
//! kodegen_bundler_dist matrix --config dist.toml
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bundler;
pub mod cli;
pub mod error;
pub mod manifest;

pub use bundler::{
    DistributionArtifact, DistributionGenerator, DistributionRequest, InstallerRequest,
    InstallerStager, PackagingPolicy, Platform, RuntimeLocator, Settings, SettingsBuilder,
};
pub use cli::Args;
pub use error::{CliError, DistError, ManifestError, Result};
pub use manifest::DistManifest;
