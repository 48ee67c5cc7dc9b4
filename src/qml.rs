//! QML module discovery through `qmlimportscanner`.

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::analyze::format_lib_name;
use crate::context::Resolver;
use crate::entity::{QmlModule, SharedLib};
use crate::error::DeployError;
use crate::paths::{normalize, relative_path};
use crate::qt::is_qt_lib;

/// One entry of the scanner's JSON array. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct ImportDescriptor {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    path: Option<PathBuf>,
    plugin: Option<String>,
}

/// Turn scanner output into QML modules.
///
/// Only `"module"` descriptors that carry a resolved `path` are kept. A
/// descriptor naming a `plugin` gets its companion library `lib<plugin>.so`
/// inside the module directory. A module outside `qml_root` is an error.
pub fn parse_scanner_output(json: &str, root: &Path, qml_root: &Path) -> Result<Vec<QmlModule>> {
    let descriptors: Vec<ImportDescriptor> =
        serde_json::from_str(json).map_err(|err| DeployError::MalformedScannerOutput {
            root: root.to_path_buf(),
            reason: err.to_string(),
        })?;

    let qml_root = normalize(qml_root);
    let mut modules = Vec::new();

    for descriptor in descriptors {
        if descriptor.kind != "module" {
            continue;
        }
        let Some(path) = descriptor.path else {
            continue;
        };

        let lib = descriptor.plugin.map(|plugin| {
            let lib_name = format_lib_name(&plugin);
            let lib_path = path.join(&lib_name);
            SharedLib::new(lib_name, lib_path)
        });

        let relative = relative_path(&normalize(&path), &qml_root);
        if relative.is_absolute() || relative.starts_with("..") {
            return Err(DeployError::QmlModuleOutsideImportPath {
                module: path,
                qml_root,
            }
            .into());
        }

        let name = descriptor
            .name
            .unwrap_or_else(|| relative.display().to_string());

        modules.push(QmlModule {
            name,
            path,
            relative_path: relative,
            lib,
        });
    }

    Ok(modules)
}

impl Resolver<'_> {
    /// QML modules imported by the QML sources under `scan_dir`.
    pub fn find_qml_modules(&mut self, scan_dir: &Path) -> Result<BTreeSet<QmlModule>> {
        let key = scan_dir
            .canonicalize()
            .unwrap_or_else(|_| scan_dir.to_path_buf());
        if let Some(modules) = self.cache.qml_modules.get(&key) {
            return Ok(modules.clone());
        }

        let qml_root = self.qt.qml_dir();
        let json = self
            .tools
            .scan_qml_imports(&self.qt.import_scanner(), &qml_root, scan_dir)?;

        let modules: BTreeSet<_> = parse_scanner_output(&json, scan_dir, &qml_root)?
            .into_iter()
            .collect();
        debug!(
            "{} QML modules imported under {}",
            modules.len(),
            scan_dir.display()
        );

        self.cache.qml_modules.insert(key, modules.clone());
        Ok(modules)
    }

    /// Qt libraries the module's companion plugin library depends on.
    pub fn find_qml_module_libs(&mut self, module: &QmlModule) -> Result<BTreeSet<SharedLib>> {
        let Some(lib_path) = module.lib_path() else {
            return Ok(BTreeSet::new());
        };
        if !lib_path.is_file() {
            warn!(
                "Plugin library {} of QML module {} not found",
                lib_path.display(),
                module.name
            );
            return Ok(BTreeSet::new());
        }

        let libs = self
            .resolve_libs(lib_path)?
            .into_iter()
            .filter(|lib| is_qt_lib(&self.qt, lib))
            .collect();
        Ok(libs)
    }
}
