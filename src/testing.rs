//! Test doubles: a scripted [`Toolchain`] and a throwaway Qt installation.

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::DeployError;
use crate::paths::QtInstall;
use crate::tools::Toolchain;

/// Scripted toolchain: `ldd` answers from a table, `patchelf` calls are
/// recorded, the scanner prints a canned document.
#[derive(Default)]
pub(crate) struct FakeToolchain {
    deps: HashMap<PathBuf, Vec<PathBuf>>,
    failing: Vec<PathBuf>,
    scanner_output: Option<String>,
    pub(crate) ldd_calls: RefCell<Vec<PathBuf>>,
    pub(crate) runpaths: RefCell<Vec<(PathBuf, String)>>,
}

fn key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl FakeToolchain {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `binary` links against `libs` (the full closure, as `ldd` reports it).
    pub(crate) fn with_deps(mut self, binary: &Path, libs: &[PathBuf]) -> Self {
        self.deps.insert(key(binary), libs.to_vec());
        self
    }

    /// `ldd` exits with status 1 on `binary`.
    pub(crate) fn with_failing_ldd(mut self, binary: &Path) -> Self {
        self.failing.push(key(binary));
        self
    }

    pub(crate) fn with_scanner_output(mut self, json: &str) -> Self {
        self.scanner_output = Some(json.to_string());
        self
    }

    pub(crate) fn runpath_of(&self, binary: &Path) -> Option<String> {
        self.runpaths
            .borrow()
            .iter()
            .rev()
            .find(|(path, _)| path == binary)
            .map(|(_, runpath)| runpath.clone())
    }
}

impl Toolchain for FakeToolchain {
    fn list_dependencies(&self, binary: &Path) -> Result<String> {
        self.ldd_calls.borrow_mut().push(binary.to_path_buf());
        if self.failing.contains(&key(binary)) {
            return Err(DeployError::ToolFailed {
                tool: "ldd".to_string(),
                target: binary.to_path_buf(),
                status: "exit status: 1".to_string(),
                stderr: "not a dynamic executable".to_string(),
            }
            .into());
        }
        let mut out = String::from("\tlinux-vdso.so.1 (0x00007ffd5a5f2000)\n");
        for lib in self.deps.get(&key(binary)).into_iter().flatten() {
            let name = lib.file_name().unwrap().to_string_lossy();
            writeln!(out, "\t{} => {} (0x00007f0000000000)", name, lib.display()).unwrap();
        }
        Ok(out)
    }

    fn set_runpath(&self, binary: &Path, runpath: &str) -> Result<()> {
        self.runpaths
            .borrow_mut()
            .push((binary.to_path_buf(), runpath.to_string()));
        Ok(())
    }

    fn scan_qml_imports(
        &self,
        _scanner: &Path,
        _import_path: &Path,
        _root: &Path,
    ) -> Result<String> {
        match &self.scanner_output {
            Some(json) => Ok(json.clone()),
            None => bail!("no scanner output scripted"),
        }
    }
}

/// A temporary directory holding a skeleton Qt installation under `qt/`
/// plus room for application binaries and output trees next to it.
pub(crate) struct MockQt {
    _temp: TempDir,
    base: PathBuf,
}

impl MockQt {
    pub(crate) fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let base = temp.path().canonicalize().unwrap();
        let dirs = [
            "qt/lib",
            "qt/libexec",
            "qt/plugins",
            "qt/qml",
            "qt/translations",
            "qt/mkspecs/modules",
        ];
        for dir in dirs {
            fs::create_dir_all(base.join(dir)).unwrap();
        }
        Self { _temp: temp, base }
    }

    pub(crate) fn qt_dir(&self) -> PathBuf {
        self.base.join("qt")
    }

    pub(crate) fn install(&self) -> QtInstall {
        QtInstall::new(self.qt_dir())
    }

    /// A path next to the installation (outside `qt/`).
    pub(crate) fn path(&self, rel: &str) -> PathBuf {
        self.base.join(rel)
    }

    /// Write `contents` to `rel`, relative to the temp root.
    pub(crate) fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.base.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// A Qt library in `qt/lib`.
    pub(crate) fn lib(&self, file_name: &str) -> PathBuf {
        self.write(&format!("qt/lib/{file_name}"), file_name)
    }

    /// A plugin library in `qt/plugins/<plugin_type>`.
    pub(crate) fn plugin(&self, plugin_type: &str, file_name: &str) -> PathBuf {
        self.write(&format!("qt/plugins/{plugin_type}/{file_name}"), file_name)
    }

    /// Module metadata `qt/mkspecs/modules/qt_lib_<short>.pri`.
    pub(crate) fn module_pri(&self, short: &str, module: &str, plugin_types: &str) -> PathBuf {
        let mut pri = format!("QT.{short}.VERSION = 6.5.3\nQT.{short}.name = Qt{short}\n");
        writeln!(pri, "QT.{short}.module = {module}").unwrap();
        if !plugin_types.is_empty() {
            writeln!(pri, "QT.{short}.plugin_types = {plugin_types}").unwrap();
        }
        self.write(&format!("qt/mkspecs/modules/qt_lib_{short}.pri"), &pri)
    }

    /// An application binary outside the installation.
    pub(crate) fn app(&self, name: &str) -> PathBuf {
        self.write(&format!("app/{name}"), name)
    }
}
