//! Installation layout, tool lookup and path arithmetic.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::error::DeployError;

/// Directory layout of a Qt installation (e.g. `/opt/Qt/6.5.3/gcc_64`).
#[derive(Debug, Clone)]
pub struct QtInstall {
    root: PathBuf,
    real_lib_dir: PathBuf,
}

impl QtInstall {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let lib_dir = root.join("lib");
        let real_lib_dir = lib_dir.canonicalize().unwrap_or(lib_dir);
        Self { root, real_lib_dir }
    }

    /// `lib/` with symlinks resolved; framework membership is tested against it.
    pub fn real_lib_dir(&self) -> &Path {
        &self.real_lib_dir
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn plugin_dir(&self, plugin_type: &str) -> PathBuf {
        self.plugins_dir().join(plugin_type)
    }

    pub fn qml_dir(&self) -> PathBuf {
        self.root.join("qml")
    }

    pub fn translations_dir(&self) -> PathBuf {
        self.root.join("translations")
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.root.join("mkspecs").join("modules")
    }

    pub fn libexec_dir(&self) -> PathBuf {
        self.root.join("libexec")
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join("resources")
    }

    pub fn import_scanner(&self) -> PathBuf {
        self.libexec_dir().join("qmlimportscanner")
    }
}

/// Find an external tool on `PATH`.
pub fn find_tool(tool: &str) -> Result<PathBuf> {
    which::which(tool).map_err(|_| {
        DeployError::ToolNotFound {
            tool: tool.to_string(),
        }
        .into()
    })
}

/// Make `path` absolute against the working directory and fold `.`/`..`
/// lexically, without touching the filesystem.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("Failed to make path absolute: {}", path.display()))?;
    Ok(normalize(&abs))
}

/// Lexically fold `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Lexical relative path from `base` to `target`. Both must be absolute and
/// normalized. Equal paths give `.`.
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<_> = target.components().collect();
    let base: Vec<_> = base.components().collect();

    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        rel
    }
}

/// Turn a library directory relative to a binary into a runpath entry.
///
/// Relative paths are anchored at `$ORIGIN`; absolute paths pass through.
pub fn format_runpath(lib_dir: &Path) -> String {
    if lib_dir.is_absolute() {
        return lib_dir.display().to_string();
    }
    if lib_dir == Path::new(".") {
        return "$ORIGIN".to_string();
    }
    format!("$ORIGIN/{}", lib_dir.display())
}
