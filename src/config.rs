//! Run configuration.
//!
//! The driver builds one [`DeployConfig`] and every component reads from it;
//! nothing here is global.

use std::path::{Path, PathBuf};

/// How the run treats the filesystem and how chatty it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMode {
    /// Replace existing destinations instead of aborting.
    pub force: bool,
    /// Plan and log everything, write nothing.
    pub dry_run: bool,
    /// 0: errors and warnings, 1: progress, 2: per-file detail, 3: tool commands.
    pub verbosity: u8,
}

impl Default for OperationMode {
    fn default() -> Self {
        Self {
            force: false,
            dry_run: false,
            verbosity: 1,
        }
    }
}

/// Where each kind of entity is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub exe_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub plugins_dir: PathBuf,
    pub qml_dir: PathBuf,
    pub data_dir: PathBuf,
    pub translations_dir: PathBuf,
}

impl OutputDirs {
    /// Everything in `root`, except translations which go to `root/translations`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            exe_dir: root.to_path_buf(),
            lib_dir: root.to_path_buf(),
            plugins_dir: root.to_path_buf(),
            qml_dir: root.to_path_buf(),
            data_dir: root.to_path_buf(),
            translations_dir: root.join("translations"),
        }
    }
}

/// Deployment steps to leave out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipFlags {
    pub conf: bool,
    pub exe: bool,
    pub lib: bool,
    pub plugins: bool,
    pub qml: bool,
    pub data: bool,
    pub translations: bool,
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Qt installation root, e.g. `/opt/Qt/6.5.3/gcc_64`.
    pub qt_dir: PathBuf,
    pub executables: Vec<PathBuf>,
    /// Directories whose QML sources are scanned for imports.
    pub qml_scan_dirs: Vec<PathBuf>,
    pub dirs: OutputDirs,
    pub skip: SkipFlags,
    pub mode: OperationMode,
}

impl DeployConfig {
    pub fn new(qt_dir: impl Into<PathBuf>, executables: Vec<PathBuf>, dirs: OutputDirs) -> Self {
        Self {
            qt_dir: qt_dir.into(),
            executables,
            qml_scan_dirs: Vec::new(),
            dirs,
            skip: SkipFlags::default(),
            mode: OperationMode::default(),
        }
    }

    pub fn with_qml_scan_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.qml_scan_dirs = dirs;
        self
    }

    pub fn with_skip(mut self, skip: SkipFlags) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_mode(mut self, mode: OperationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether the library rescan and runpath rewrite has anything to do.
    pub fn deploys_libraries(&self) -> bool {
        !(self.skip.lib && self.skip.plugins && self.skip.qml)
    }
}
