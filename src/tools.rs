//! External tools: `ldd`, `patchelf` and `qmlimportscanner`.
//!
//! The engine only consumes their output. [`Toolchain`] is the seam that
//! lets tests script the answers instead of shelling out.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::trace;

use crate::error::DeployError;
use crate::paths::find_tool;

pub trait Toolchain {
    /// Raw stdout of `ldd -r <binary>`. A non-zero exit is an error.
    fn list_dependencies(&self, binary: &Path) -> Result<String>;

    /// Set the runpath of `binary` to the literal `runpath`.
    fn set_runpath(&self, binary: &Path, runpath: &str) -> Result<()>;

    /// Raw stdout (a JSON array) of the QML import scanner run on `root`.
    fn scan_qml_imports(&self, scanner: &Path, import_path: &Path, root: &Path) -> Result<String>;
}

/// Runs the real tools found on `PATH` (or inside the Qt installation).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolchain;

impl Toolchain for SystemToolchain {
    fn list_dependencies(&self, binary: &Path) -> Result<String> {
        let ldd = find_tool("ldd")?;
        trace!("ldd -r {}", binary.display());

        let output = Command::new(&ldd)
            .arg("-r")
            .arg(binary)
            .output()
            .with_context(|| format!("Failed to run {}", ldd.display()))?;

        if !output.status.success() {
            return Err(failure("ldd", binary, &output).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn set_runpath(&self, binary: &Path, runpath: &str) -> Result<()> {
        let patchelf = find_tool("patchelf")?;
        trace!("patchelf --set-rpath {} {}", runpath, binary.display());

        let output = Command::new(&patchelf)
            .args(["--set-rpath", runpath])
            .arg(binary)
            .stdout(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", patchelf.display()))?;

        if !output.status.success() {
            return Err(failure("patchelf", binary, &output).into());
        }
        Ok(())
    }

    fn scan_qml_imports(&self, scanner: &Path, import_path: &Path, root: &Path) -> Result<String> {
        if !scanner.is_file() {
            return Err(DeployError::ToolNotFound {
                tool: scanner.display().to_string(),
            }
            .into());
        }
        trace!(
            "{} -importPath {} -rootPath {}",
            scanner.display(),
            import_path.display(),
            root.display()
        );

        let output = Command::new(scanner)
            .arg("-importPath")
            .arg(import_path)
            .arg("-rootPath")
            .arg(root)
            .output()
            .with_context(|| format!("Failed to run {}", scanner.display()))?;

        if !output.status.success() {
            return Err(failure("qmlimportscanner", root, &output).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn failure(tool: &str, target: &Path, output: &Output) -> DeployError {
    DeployError::ToolFailed {
        tool: tool.to_string(),
        target: target.to_path_buf(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
