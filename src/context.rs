//! Per-run resolver state.
//!
//! [`Resolver`] owns the toolchain handle, the installation layout and the
//! memo tables of one run. Discovery in `qt.rs` and `qml.rs` is implemented
//! as methods on it so every lookup shares the same caches.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::analyze;
use crate::entity::{QmlModule, QtPlugin, SharedLib};
use crate::paths::QtInstall;
use crate::qt::ModuleProperties;
use crate::tools::Toolchain;

/// Memo tables, keyed by canonical input path or entity.
#[derive(Default)]
pub(crate) struct Caches {
    pub(crate) libs: HashMap<PathBuf, BTreeSet<SharedLib>>,
    pub(crate) modules: Option<HashMap<String, ModuleProperties>>,
    pub(crate) langs: Option<Vec<String>>,
    pub(crate) plugin_libs: HashMap<QtPlugin, BTreeSet<SharedLib>>,
    pub(crate) qml_modules: HashMap<PathBuf, BTreeSet<QmlModule>>,
}

pub struct Resolver<'t> {
    pub(crate) tools: &'t dyn Toolchain,
    pub(crate) qt: QtInstall,
    pub(crate) cache: Caches,
}

impl<'t> Resolver<'t> {
    pub fn new(tools: &'t dyn Toolchain, qt: QtInstall) -> Self {
        Self {
            tools,
            qt,
            cache: Caches::default(),
        }
    }

    /// Shared libraries `binary` links against, resolved once per run.
    pub fn resolve_libs(&mut self, binary: &Path) -> Result<BTreeSet<SharedLib>> {
        let key = binary
            .canonicalize()
            .unwrap_or_else(|_| binary.to_path_buf());

        if let Some(libs) = self.cache.libs.get(&key) {
            trace!("ldd cache hit for {}", key.display());
            return Ok(libs.clone());
        }

        let libs = analyze::resolve_libs(self.tools, &key)?;
        self.cache.libs.insert(key, libs.clone());
        Ok(libs)
    }
}
