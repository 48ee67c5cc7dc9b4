//! Make Linux Qt 6 applications self-contained.
//!
//! Computes the runtime closure an application needs from a Qt installation
//! (Qt libraries, plugins, QML modules, translations, helper processes),
//! copies it into a relocatable tree and rewrites every deployed binary's
//! runpath to `$ORIGIN`-relative entries pointing at the deployed libraries.
//!
//! Uses `ldd -r` for dependency resolution, `patchelf` for runpath rewriting
//! and the installation's own `qmlimportscanner` for QML imports.

mod analyze;
mod config;
mod context;
mod copy;
mod deploy;
mod entity;
mod error;
mod paths;
mod plan;
mod qml;
mod qt;
mod tools;

#[cfg(test)]
mod testing;

pub use analyze::{find_libs, format_lib_name, parse_ldd_output, parse_lib_name, resolve_libs};
pub use config::{DeployConfig, OperationMode, OutputDirs, SkipFlags};
pub use context::Resolver;
pub use copy::{copy_dir, copy_file, is_debug_file, write_file};
pub use deploy::{
    render_qt_conf, run, ArtifactKind, CopyOp, DeployReport, Deployer, Source, QT_CONF,
};
pub use entity::{Executable, QmlModule, QtModule, QtPlugin, QtTranslation, SharedLib};
pub use error::DeployError;
pub use paths::{absolute, find_tool, format_runpath, relative_path, QtInstall};
pub use plan::{build_plan, DeploymentPlan};
pub use qml::parse_scanner_output;
pub use qt::{
    is_qt_lib, is_webengine_module, parse_module_pri, translation_domain, ModuleProperties,
};
pub use tools::{SystemToolchain, Toolchain};
