//! Deployment entities.
//!
//! Entities are plain values. Two entities with the same name and the same
//! source path are the same entity, so every collection of them is a set.

use std::path::{Path, PathBuf};

/// An executable to deploy into the executable directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Executable {
    pub name: String,
    pub path: PathBuf,
}

impl Executable {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A shared library, identified by its file name and its real path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedLib {
    pub name: String,
    pub path: PathBuf,
}

impl SharedLib {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A Qt module, backed by exactly one Qt library (e.g. `Qt6Gui`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QtModule {
    pub name: String,
    pub lib: SharedLib,
}

/// A plugin type (`platforms`, `imageformats`, ...) and its directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QtPlugin {
    pub name: String,
    pub path: PathBuf,
}

/// A translation catalog (`qtbase_de.qm`) or a translation data directory
/// (`qtwebengine_locales`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QtTranslation {
    pub name: String,
    pub path: PathBuf,
}

impl QtTranslation {
    pub fn is_directory(&self) -> bool {
        self.path.is_dir()
    }
}

/// A QML module reported by the import scanner.
///
/// `relative_path` is the module directory relative to the installation's
/// `qml` import root and decides where the module lands under the deployed
/// QML directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QmlModule {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub lib: Option<SharedLib>,
}

impl QmlModule {
    /// The module's companion plugin library, if it has one.
    pub fn lib_path(&self) -> Option<&Path> {
        self.lib.as_ref().map(|lib| lib.path.as_path())
    }
}
