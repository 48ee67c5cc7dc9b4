//! File and directory copying under the overwrite policy.
//!
//! Every write goes through [`prepare_destination`]: in dry-run mode nothing
//! is touched, without force an existing destination is fatal, with force it
//! is removed first.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::config::OperationMode;
use crate::error::DeployError;

/// Get `dst` ready to be written. Returns `false` when the write must be
/// skipped (dry run).
pub fn prepare_destination(dst: &Path, mode: &OperationMode) -> Result<bool> {
    if mode.dry_run {
        return Ok(false);
    }

    let exists = dst.exists() || dst.is_symlink();
    if exists && !mode.force {
        return Err(DeployError::WouldOverwrite {
            path: dst.to_path_buf(),
        }
        .into());
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if dst.is_dir() && !dst.is_symlink() {
        fs::remove_dir_all(dst)
            .with_context(|| format!("Failed to remove directory: {}", dst.display()))?;
    } else if exists {
        fs::remove_file(dst).with_context(|| format!("Failed to remove: {}", dst.display()))?;
    }

    Ok(true)
}

/// Copy a single file, following symlinks at `src`. Permissions are kept.
pub fn copy_file(src: &Path, dst: &Path, mode: &OperationMode) -> Result<()> {
    if !prepare_destination(dst, mode)? {
        return Ok(());
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Replace `dst` with a copy of the directory `src`, leaving out every file
/// for which `exclude` returns true.
///
/// Symlinks resolving inside `src` are recreated as links. Symlinks resolving
/// outside it are followed and their target copied, so the copy does not
/// depend on anything next to `src`.
///
/// Returns the total size in bytes of all files copied.
pub fn copy_dir(
    src: &Path,
    dst: &Path,
    mode: &OperationMode,
    exclude: fn(&Path) -> bool,
) -> Result<u64> {
    if !src.is_dir() {
        bail!("Directory does not exist: {}", src.display());
    }
    if !prepare_destination(dst, mode)? {
        return Ok(0);
    }
    let root = src
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", src.display()))?;
    copy_dir_recursive(src, dst, &root, exclude)
}

/// Write `contents` to `dst`.
pub fn write_file(dst: &Path, contents: &str, mode: &OperationMode) -> Result<()> {
    if !prepare_destination(dst, mode)? {
        return Ok(());
    }
    fs::write(dst, contents).with_context(|| format!("Failed to write: {}", dst.display()))?;
    Ok(())
}

/// Separate debug symbol files (`*.debug`).
pub fn is_debug_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "debug")
}

/// Keep every file.
pub fn keep_all(_path: &Path) -> bool {
    false
}

fn copy_dir_recursive(
    src: &Path,
    dst: &Path,
    root: &Path,
    exclude: fn(&Path) -> bool,
) -> Result<u64> {
    let mut total_size: u64 = 0;

    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_symlink() {
            let resolved = path
                .canonicalize()
                .with_context(|| format!("Dangling symlink: {}", path.display()))?;
            if resolved.starts_with(root) {
                let target = fs::read_link(&path)?;
                std::os::unix::fs::symlink(&target, &dest_path).with_context(|| {
                    format!(
                        "Failed to create symlink {} -> {}",
                        dest_path.display(),
                        target.display()
                    )
                })?;
            } else if resolved.is_dir() {
                total_size += copy_dir_recursive(&resolved, &dest_path, &resolved, exclude)?;
            } else if !exclude(&path) {
                total_size += fs::copy(&resolved, &dest_path).with_context(|| {
                    format!("Failed to copy {} to {}", resolved.display(), dest_path.display())
                })?;
            }
        } else if path.is_dir() {
            total_size += copy_dir_recursive(&path, &dest_path, root, exclude)?;
        } else if !exclude(&path) {
            total_size += fs::copy(&path, &dest_path).with_context(|| {
                format!("Failed to copy {} to {}", path.display(), dest_path.display())
            })?;
        }
    }

    Ok(total_size)
}
