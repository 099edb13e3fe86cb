//! Packaging policy: the path rules applied while repackaging.
//!
//! Every list the packaging engine consults (the build placeholder, the
//! executable allow-list, runtime skip suffixes, useless-file patterns and
//! the runtime layout per platform) lives in [`PackagingPolicy`], which is
//! plain data. [`PackagingPolicy::default`] carries the Consulo layout;
//! manifests may override any field.
//!
//! # Examples
//!
//! ```
//! use kodegen_bundler_dist::bundler::{PackagingPolicy, Platform};
//!
//! let policy = PackagingPolicy::default();
//! assert_eq!(
//!     policy.replace_build_placeholder("Consulo/platform/buildSNAPSHOT/launcher.sh", 42),
//!     "Consulo/platform/build42/launcher.sh"
//! );
//! assert!(policy.is_executable("Consulo/platform/build42/launcher.sh", 42));
//! assert_eq!(policy.layout(Platform::Mac).root_alias, "jdk");
//! ```

use serde::Deserialize;
use std::{borrow::Cow, fmt};

/// Target platform family of a distribution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Platform {
    /// macOS application bundle layout.
    Mac,
    /// Windows and Linux install-root layout.
    Other,
}

impl Platform {
    /// Infers the platform from a base archive file name: names containing
    /// `mac` are mac distributions.
    pub fn detect(base_archive_name: &str) -> Self {
        if base_archive_name.contains("mac") {
            Platform::Mac
        } else {
            Platform::Other
        }
    }

    /// Returns [`Platform::Mac`] when `mac` is true.
    pub fn from_mac_flag(mac: bool) -> Self {
        if mac { Platform::Mac } else { Platform::Other }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Mac => write!(f, "mac"),
            Platform::Other => write!(f, "win/linux"),
        }
    }
}

/// Where a runtime bundle lands inside a distribution.
///
/// A runtime entry at `<root>/<relative>` is written to
/// `<location><root_alias>/<relative>`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RuntimeLayout {
    /// Prefix inside the distribution, ending with `/`. May contain the
    /// build placeholder.
    pub location: String,
    /// Directory name the runtime's root is renamed to.
    pub root_alias: String,
}

impl RuntimeLayout {
    /// Target path for an entry at `relative` below the runtime root.
    pub fn target(&self, relative: &str) -> String {
        format!("{}{}/{}", self.location, self.root_alias, relative)
    }
}

/// Files that never make it into a distribution.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UselessFiles {
    /// Dropped when the path ends with one of these.
    pub suffixes: Vec<String>,
    /// Dropped when the path contains one of these.
    pub substrings: Vec<String>,
    /// Dropped when the path equals one of these.
    pub exact: Vec<String>,
}

impl Default for UselessFiles {
    fn default() -> Self {
        Self {
            suffixes: strings(&[".pdb", ".DS_Store"]),
            substrings: strings(&[".dSYM/"]),
            exact: strings(&["."]),
        }
    }
}

impl UselessFiles {
    /// Returns true when `path` matches any pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.suffixes.iter().any(|s| path.ends_with(s.as_str()))
            || self.substrings.iter().any(|s| path.contains(s.as_str()))
            || self.exact.iter().any(|s| path == s)
    }
}

/// Path rules for repackaging.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PackagingPolicy {
    /// Path segment standing for the in-progress build.
    pub build_placeholder: String,
    /// Prefix of the concrete build identifier (`build` gives `build42`).
    pub build_prefix: String,
    /// Base archive paths forced to mode 0755. Written with the placeholder,
    /// matched after substitution.
    pub executables: Vec<String>,
    /// Runtime paths below the root dropped from non-mac distributions.
    pub skip_suffixes: Vec<String>,
    /// Runtime paths below the root dropped from mac distributions.
    pub mac_skip_suffixes: Vec<String>,
    /// Files dropped from runtime bundles.
    pub useless: UselessFiles,
    /// Runtime layout of non-mac distributions.
    pub layout: RuntimeLayout,
    /// Runtime layout of mac distributions.
    pub mac_layout: RuntimeLayout,
}

impl Default for PackagingPolicy {
    fn default() -> Self {
        Self {
            build_placeholder: "buildSNAPSHOT".to_string(),
            build_prefix: "build".to_string(),
            executables: strings(&[
                // linux
                "Consulo/consulo.sh",
                "Consulo/platform/buildSNAPSHOT/launcher.sh",
                "Consulo/platform/bin/fsnotifier",
                "Consulo/platform/bin/fsnotifier64",
                // mac
                "Consulo.app/Contents/bin/fsnotifier",
                "Consulo.app/Contents/bin/restarter",
                "Consulo.app/Contents/MacOS/consulo",
            ]),
            skip_suffixes: strings(&["jmods", "lib/src.zip"]),
            mac_skip_suffixes: strings(&["Contents/Home/jmods/", "Contents/Home/lib/src.zip"]),
            useless: UselessFiles::default(),
            layout: RuntimeLayout {
                location: "Consulo/platform/buildSNAPSHOT/".to_string(),
                root_alias: "jre".to_string(),
            },
            mac_layout: RuntimeLayout {
                location: "Consulo.app/Contents/platform/buildSNAPSHOT/jre/".to_string(),
                root_alias: "jdk".to_string(),
            },
        }
    }
}

impl PackagingPolicy {
    /// Concrete build identifier for `build_number`.
    pub fn build_id(&self, build_number: u32) -> String {
        format!("{}{}", self.build_prefix, build_number)
    }

    /// Replaces every path segment equal to the build placeholder.
    ///
    /// Segments that merely contain the placeholder text are left alone.
    pub fn replace_build_placeholder<'a>(&self, path: &'a str, build_number: u32) -> Cow<'a, str> {
        let placeholder = self.build_placeholder.as_str();
        if placeholder.is_empty() || !path.split('/').any(|segment| segment == placeholder) {
            return Cow::Borrowed(path);
        }

        let build_id = self.build_id(build_number);
        let rewritten = path
            .split('/')
            .map(|segment| {
                if segment == placeholder {
                    build_id.as_str()
                } else {
                    segment
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        Cow::Owned(rewritten)
    }

    /// Returns true when the rewritten path `path` is on the executable
    /// allow-list.
    pub fn is_executable(&self, path: &str, build_number: u32) -> bool {
        self.executables
            .iter()
            .any(|exe| self.replace_build_placeholder(exe, build_number) == path)
    }

    /// Returns true for files dropped from runtime bundles.
    pub fn is_useless(&self, path: &str) -> bool {
        self.useless.matches(path)
    }

    /// Runtime skip suffixes for `platform`.
    pub fn skip_suffixes(&self, platform: Platform) -> &[String] {
        match platform {
            Platform::Mac => &self.mac_skip_suffixes,
            Platform::Other => &self.skip_suffixes,
        }
    }

    /// Runtime layout for `platform`.
    pub fn layout(&self, platform: Platform) -> &RuntimeLayout {
        match platform {
            Platform::Mac => &self.mac_layout,
            Platform::Other => &self.layout,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_without_placeholder_are_unchanged() {
        let policy = PackagingPolicy::default();
        for path in ["A/launcher.sh", "Consulo/", "Consulo/platform/lib/boot.jar", ""] {
            let rewritten = policy.replace_build_placeholder(path, 42);
            assert!(matches!(rewritten, Cow::Borrowed(_)));
            assert_eq!(rewritten, path);
        }
    }

    #[test]
    fn test_placeholder_segment_is_replaced_exactly_once() {
        let policy = PackagingPolicy::default();
        assert_eq!(
            policy.replace_build_placeholder("Consulo/platform/buildSNAPSHOT/", 42),
            "Consulo/platform/build42/"
        );
        assert_eq!(
            policy.replace_build_placeholder("Consulo/platform/buildSNAPSHOT/lib/buildSNAPSHOT.txt", 7),
            "Consulo/platform/build7/lib/buildSNAPSHOT.txt"
        );
    }

    #[test]
    fn test_substring_of_segment_is_not_replaced() {
        let policy = PackagingPolicy::default();
        assert_eq!(
            policy.replace_build_placeholder("Consulo/my-buildSNAPSHOT-notes/x", 42),
            "Consulo/my-buildSNAPSHOT-notes/x"
        );
    }

    #[test]
    fn test_executables_match_after_rewrite() {
        let policy = PackagingPolicy::default();
        assert!(policy.is_executable("Consulo/consulo.sh", 1));
        assert!(policy.is_executable("Consulo/platform/build1/launcher.sh", 1));
        assert!(!policy.is_executable("Consulo/platform/buildSNAPSHOT/launcher.sh", 1));
        assert!(!policy.is_executable("Consulo/readme.txt", 1));
    }

    #[test]
    fn test_useless_files() {
        let policy = PackagingPolicy::default();
        assert!(policy.is_useless("jdk/bin/java.pdb"));
        assert!(policy.is_useless("jdk/Contents/.DS_Store"));
        assert!(policy.is_useless("jdk/lib/libjvm.dylib.dSYM/Contents/Info.plist"));
        assert!(policy.is_useless("."));
        assert!(!policy.is_useless("jdk/bin/java"));
        assert!(!policy.is_useless("./"));
    }

    #[test]
    fn test_platform_detect_and_layout() {
        assert_eq!(Platform::detect("consulo-mac64.zip"), Platform::Mac);
        assert_eq!(Platform::detect("consulo-win64.zip"), Platform::Other);

        let policy = PackagingPolicy::default();
        assert_eq!(
            policy.layout(Platform::Other).target("bin/java"),
            "Consulo/platform/buildSNAPSHOT/jre/bin/java"
        );
        assert_eq!(
            policy.layout(Platform::Mac).target("Contents/Home/bin/java"),
            "Consulo.app/Contents/platform/buildSNAPSHOT/jre/jdk/Contents/Home/bin/java"
        );
        assert_eq!(policy.skip_suffixes(Platform::Other), ["jmods", "lib/src.zip"]);
    }

    #[test]
    fn test_policy_overrides_from_toml() {
        let policy: PackagingPolicy = toml::from_str(
            r#"
            executables = ["A/launcher.sh"]

            [useless]
            suffixes = [".map"]
            "#,
        )
        .unwrap();
        assert_eq!(policy.executables, ["A/launcher.sh"]);
        assert!(policy.is_useless("a.js.map"));
        assert!(!policy.is_useless("jdk/bin/java.pdb"));
        assert_eq!(policy.build_placeholder, "buildSNAPSHOT");
    }
}
