//! Deployment planning: the union of everything the inputs need.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::context::Resolver;
use crate::entity::{Executable, QmlModule, QtPlugin, QtTranslation, SharedLib};

/// Everything that has to be copied, deduplicated.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub executables: BTreeSet<Executable>,
    pub libs: BTreeSet<SharedLib>,
    pub plugins: BTreeSet<QtPlugin>,
    pub translations: BTreeSet<QtTranslation>,
    pub qml_modules: BTreeSet<QmlModule>,
}

/// Input executable as an entity: its file name and its real path.
fn input_executable(path: &Path) -> Result<Executable> {
    let real = path
        .canonicalize()
        .with_context(|| format!("File does not exist: {}", path.display()))?;
    let name = path
        .file_name()
        .with_context(|| format!("Executable path has no file name: {}", path.display()))?
        .to_string_lossy()
        .into_owned();
    Ok(Executable::new(name, real))
}

/// Walk every dependency graph of the inputs and merge the results.
pub fn build_plan(
    resolver: &mut Resolver<'_>,
    executables: &[PathBuf],
    qml_scan_dirs: &[PathBuf],
) -> Result<DeploymentPlan> {
    let mut plan = DeploymentPlan::default();

    for path in executables {
        info!("Scanning dependencies of {} ...", path.display());
        let executable = input_executable(path)?;

        for module in resolver.find_qt_modules(&executable.path)? {
            debug!("{} uses {}", executable.name, module.name);

            plan.executables
                .extend(resolver.find_qt_module_executables(&module));
            plan.libs.extend(resolver.find_qt_module_libs(&module)?);
            plan.translations
                .extend(resolver.find_qt_module_translations(&module)?);

            for plugin in resolver.find_qt_module_plugins(&module)? {
                if plan.plugins.contains(&plugin) {
                    continue;
                }
                plan.libs.extend(resolver.find_qt_plugin_libs(&plugin)?);
                plan.plugins.insert(plugin);
            }
        }

        plan.executables.insert(executable);
    }

    for scan_dir in qml_scan_dirs {
        info!("Scanning qml imports of {} ...", scan_dir.display());

        for module in resolver.find_qml_modules(scan_dir)? {
            plan.libs.extend(resolver.find_qml_module_libs(&module)?);
            plan.qml_modules.insert(module);
        }
    }

    debug!(
        "Plan: {} executables, {} libraries, {} plugins, {} qml modules, {} translations",
        plan.executables.len(),
        plan.libs.len(),
        plan.plugins.len(),
        plan.qml_modules.len(),
        plan.translations.len()
    );
    Ok(plan)
}
