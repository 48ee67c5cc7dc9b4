//! Shared library dependency analysis using `ldd -r`.
//!
//! `ldd` runs the dynamic loader's own resolution (including lazily bound
//! symbols with `-r`), so a single call reports the full transitive closure
//! of a binary together with the path every library resolved to.

use anyhow::{bail, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::entity::SharedLib;
use crate::tools::Toolchain;

static LDD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+\.so[.0-9]*)\s*=>\s*(/\S+)").expect("ldd line pattern is valid")
});

static LIB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^lib(\S+)\.so[.0-9]*$").expect("library name pattern is valid"));

/// Resolve the shared libraries `binary_path` links against.
///
/// Only entries whose resolved path exists are kept, and every path is
/// canonicalized, so aliases of one file collapse into one [`SharedLib`].
///
/// # Errors
///
/// Returns an error if the file does not exist, `ldd` is not on `PATH`, or
/// `ldd` fails.
#[must_use = "library dependencies should be processed"]
pub fn resolve_libs(tools: &dyn Toolchain, binary_path: &Path) -> Result<BTreeSet<SharedLib>> {
    if !binary_path.exists() {
        bail!("File does not exist: {}", binary_path.display());
    }

    let stdout = tools.list_dependencies(binary_path)?;

    let mut libs = BTreeSet::new();
    for (name, path) in parse_ldd_output(&stdout) {
        if !path.is_file() {
            continue;
        }
        let path = path.canonicalize().unwrap_or(path);
        libs.insert(SharedLib::new(name, path));
    }
    Ok(libs)
}

/// Parse `ldd` output into `(library name, resolved path)` pairs.
///
/// Example `ldd -r` output:
/// ```text
///     linux-vdso.so.1 (0x00007ffd5a5f2000)
///     libQt6Widgets.so.6 => /opt/Qt/6.5.3/gcc_64/lib/libQt6Widgets.so.6 (0x00007f...)
///     libfoo.so.1 => not found
///     /lib64/ld-linux-x86-64.so.2 (0x00007f...)
/// ```
pub fn parse_ldd_output(output: &str) -> Vec<(String, PathBuf)> {
    output
        .lines()
        .filter_map(|line| LDD_LINE.captures(line))
        .map(|caps| (caps[1].to_string(), PathBuf::from(&caps[2])))
        .collect()
}

/// Short name of a library file: `libQt6Core.so.6.5.3` gives `Qt6Core`.
///
/// Returns `None` for names that don't follow the `lib<name>.so[.N]*` convention.
pub fn parse_lib_name(file_name: &str) -> Option<&str> {
    LIB_NAME
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// File name of the library with short name `lib_name`.
pub fn format_lib_name(lib_name: &str) -> String {
    format!("lib{lib_name}.so")
}

/// Recursively collect every shared library under the given directories.
///
/// Directories that resolve to the same real path are walked once, and
/// missing directories are skipped. Symlinks are not followed and not
/// reported; only regular files whose name follows the library naming
/// convention are.
pub fn find_libs<P: AsRef<Path>>(dirs: &[P]) -> Result<BTreeSet<SharedLib>> {
    let mut seen = BTreeSet::new();
    let mut libs = BTreeSet::new();

    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            continue;
        }
        let real = dir.canonicalize()?;
        if !seen.insert(real) {
            continue;
        }

        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if parse_lib_name(&file_name).is_some() {
                libs.insert(SharedLib::new(file_name.as_ref(), entry.path()));
            }
        }
    }

    Ok(libs)
}
