//! File system utilities for staging.
//!
//! Synchronous helpers are used by the staging sink inside the blocking
//! packaging pipeline; the async ones by the installer flow around it.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::path::Path;
use tokio::fs;

/// Sets unix permission bits. No-op on platforms without them.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
        .fs_context("setting permissions of", path)
}

/// Sets unix permission bits. No-op on platforms without them.
#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Makes a symbolic link at `link` pointing to `target`.
#[cfg(unix)]
pub fn symlink_file(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).fs_context("creating symlink", link)
}

/// Makes a symbolic link at `link` pointing to `target`.
#[cfg(windows)]
pub fn symlink_file(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(target, link).fs_context("creating symlink", link)
}

/// Makes a symbolic link to a directory.
#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> Result<()> {
    symlink_file(target, link)
}

/// Makes a symbolic link to a directory.
#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link).fs_context("creating symlink", link)
}

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    if fs::try_exists(path).await.unwrap_or(false) {
        fs::remove_dir_all(path)
            .await
            .fs_context("removing directory", path)
    } else {
        Ok(())
    }
}

/// Recursively copies the contents of `from` into `to`, creating `to` and
/// any intermediate directories as needed.
///
/// Preserves symlinks on platforms that support them and overwrites files
/// already present at the destination.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        return Err(Error::GenericError(format!(
            "{} is not a directory",
            from.display()
        )));
    }
    fs::create_dir_all(to)
        .await
        .fs_context("creating directory", to)?;

    for entry in walkdir::WalkDir::new(from) {
        let entry = entry?;
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())
                .await
                .fs_context("reading symlink", entry.path())?;
            if entry.path().is_dir() {
                symlink_dir(&target, &dest_path)?;
            } else {
                symlink_file(&target, &dest_path)?;
            }
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)
                .await
                .fs_context("creating directory", &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)
                .await
                .fs_context("copying", entry.path())?;
        }
    }

    Ok(())
}
