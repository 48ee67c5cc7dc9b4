//! Physical deployment of a [`DeploymentPlan`] and the runpath rewrite pass.
//!
//! Deployment happens in two phases. The first turns the plan into a list
//! of copy operations, validates the whole list (destination collisions and
//! the overwrite policy) and only then performs it. The second phase rescans
//! the deployed tree and points the runpath of every binary found there at
//! the deployed library directory. It rescans instead of reusing the plan
//! because plugin and QML directories can carry private libraries the plan
//! never tracked individually.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyze::find_libs;
use crate::config::{DeployConfig, OutputDirs};
use crate::context::Resolver;
use crate::copy::{self, is_debug_file, keep_all};
use crate::error::DeployError;
use crate::paths::{self, format_runpath, relative_path, QtInstall};
use crate::plan::{build_plan, DeploymentPlan};
use crate::tools::Toolchain;

pub const QT_CONF: &str = "qt.conf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Configuration,
    Executable,
    Library,
    Plugin,
    QmlModule,
    Data,
    Translation,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Configuration => "configuration file",
            ArtifactKind::Executable => "executable",
            ArtifactKind::Library => "library",
            ArtifactKind::Plugin => "plugin",
            ArtifactKind::QmlModule => "qml module",
            ArtifactKind::Data => "data directory",
            ArtifactKind::Translation => "translation data",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Dir { path: PathBuf, strip_debug: bool },
    Generated(String),
}

impl Source {
    fn origin(&self) -> PathBuf {
        match self {
            Source::File(path) | Source::Dir { path, .. } => path.clone(),
            Source::Generated(_) => PathBuf::from("(generated)"),
        }
    }
}

/// One write of the first phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOp {
    pub kind: ArtifactKind,
    pub source: Source,
    pub destination: PathBuf,
}

/// What a run wrote, or in dry-run mode would have written.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub copied: Vec<PathBuf>,
    pub runpaths: Vec<(PathBuf, String)>,
}

/// Contents of `qt.conf`, with every directory relative to the executable
/// directory.
pub fn render_qt_conf(dirs: &OutputDirs) -> String {
    let rel = |dir: &Path| relative_path(dir, &dirs.exe_dir).display().to_string();
    format!(
        "[Paths]\n\
         Plugins = {plugins}\n\
         Imports = {qml}\n\
         Qml2Imports = {qml}\n\
         Data = {data}\n\
         Translations = {translations}\n",
        plugins = rel(&dirs.plugins_dir),
        qml = rel(&dirs.qml_dir),
        data = rel(&dirs.data_dir),
        translations = rel(&dirs.translations_dir),
    )
}

pub struct Deployer<'a> {
    config: &'a DeployConfig,
    tools: &'a dyn Toolchain,
    qt: QtInstall,
    dirs: OutputDirs,
}

impl<'a> Deployer<'a> {
    pub fn new(config: &'a DeployConfig, tools: &'a dyn Toolchain) -> Result<Self> {
        let dirs = &config.dirs;
        let dirs = OutputDirs {
            exe_dir: paths::absolute(&dirs.exe_dir)?,
            lib_dir: paths::absolute(&dirs.lib_dir)?,
            plugins_dir: paths::absolute(&dirs.plugins_dir)?,
            qml_dir: paths::absolute(&dirs.qml_dir)?,
            data_dir: paths::absolute(&dirs.data_dir)?,
            translations_dir: paths::absolute(&dirs.translations_dir)?,
        };
        Ok(Self {
            config,
            tools,
            qt: QtInstall::new(&config.qt_dir),
            dirs,
        })
    }

    pub fn deploy(&self, plan: &DeploymentPlan) -> Result<DeployReport> {
        info!("Deploying files ...");

        let ops = self.copy_ops(plan);
        check_collisions(&ops)?;
        let ops = drop_covered(ops);

        let mode = &self.config.mode;
        if !mode.dry_run && !mode.force {
            if let Some(op) = ops
                .iter()
                .find(|op| op.destination.exists() || op.destination.is_symlink())
            {
                return Err(DeployError::WouldOverwrite {
                    path: op.destination.clone(),
                }
                .into());
            }
        }

        let mut report = DeployReport::default();
        for op in &ops {
            self.apply(op)?;
            report.copied.push(op.destination.clone());
        }

        report.runpaths = self.update_runpaths(plan)?;
        Ok(report)
    }

    /// Every write the plan calls for, in deployment order.
    pub fn copy_ops(&self, plan: &DeploymentPlan) -> Vec<CopyOp> {
        let skip = &self.config.skip;
        let dirs = &self.dirs;
        let mut ops = Vec::new();

        if !skip.conf {
            ops.push(CopyOp {
                kind: ArtifactKind::Configuration,
                source: Source::Generated(render_qt_conf(dirs)),
                destination: dirs.exe_dir.join(QT_CONF),
            });
        }

        if !skip.exe {
            for exe in &plan.executables {
                let destination = dirs.exe_dir.join(&exe.name);
                if is_same_file(&exe.path, &destination) {
                    debug!("Executable {} is already in place", destination.display());
                    continue;
                }
                ops.push(CopyOp {
                    kind: ArtifactKind::Executable,
                    source: Source::File(exe.path.clone()),
                    destination,
                });
            }
        }

        if !skip.lib {
            for lib in &plan.libs {
                ops.push(CopyOp {
                    kind: ArtifactKind::Library,
                    source: Source::File(lib.path.clone()),
                    destination: dirs.lib_dir.join(&lib.name),
                });
            }
        }

        if !skip.plugins {
            for plugin in &plan.plugins {
                ops.push(CopyOp {
                    kind: ArtifactKind::Plugin,
                    source: Source::Dir {
                        path: plugin.path.clone(),
                        strip_debug: true,
                    },
                    destination: dirs.plugins_dir.join(&plugin.name),
                });
            }
        }

        if !skip.qml {
            for module in &plan.qml_modules {
                ops.push(CopyOp {
                    kind: ArtifactKind::QmlModule,
                    source: Source::Dir {
                        path: module.path.clone(),
                        strip_debug: true,
                    },
                    destination: paths::normalize(&dirs.qml_dir.join(&module.relative_path)),
                });
            }
        }

        if !skip.data {
            let resources = self.qt.resources_dir();
            if resources.is_dir() {
                ops.push(CopyOp {
                    kind: ArtifactKind::Data,
                    source: Source::Dir {
                        path: resources,
                        strip_debug: false,
                    },
                    destination: dirs.data_dir.join("resources"),
                });
            } else {
                debug!("No data directory at {}", resources.display());
            }
        }

        if !skip.translations {
            for translation in &plan.translations {
                let source = if translation.is_directory() {
                    Source::Dir {
                        path: translation.path.clone(),
                        strip_debug: true,
                    }
                } else {
                    Source::File(translation.path.clone())
                };
                ops.push(CopyOp {
                    kind: ArtifactKind::Translation,
                    source,
                    destination: dirs.translations_dir.join(&translation.name),
                });
            }
        }

        ops
    }

    fn apply(&self, op: &CopyOp) -> Result<()> {
        debug!("Deploying {} {}", op.kind, op.destination.display());
        let mode = &self.config.mode;

        match &op.source {
            Source::File(src) => copy::copy_file(src, &op.destination, mode),
            Source::Dir { path, strip_debug } => {
                let exclude = if *strip_debug { is_debug_file } else { keep_all };
                copy::copy_dir(path, &op.destination, mode, exclude).map(|_| ())
            }
            Source::Generated(contents) => copy::write_file(&op.destination, contents, mode),
        }
    }

    /// Second phase: rewrite the runpath of every deployed binary.
    fn update_runpaths(&self, plan: &DeploymentPlan) -> Result<Vec<(PathBuf, String)>> {
        let dirs = &self.dirs;
        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();

        if !self.config.skip.exe {
            info!("Updating executables run paths ...");
            for exe in &plan.executables {
                let path = dirs.exe_dir.join(&exe.name);
                if seen.insert(path.clone()) {
                    targets.push(path);
                }
            }
        }

        if self.config.deploys_libraries() {
            info!("Updating libraries run paths ...");
            for lib in find_libs(&[&dirs.lib_dir, &dirs.plugins_dir, &dirs.qml_dir])? {
                if seen.insert(lib.path.clone()) {
                    targets.push(lib.path);
                }
            }
        }

        let mut updated = Vec::new();
        for target in targets {
            let origin = target.parent().unwrap_or(&dirs.exe_dir);
            let runpath = format_runpath(&relative_path(&dirs.lib_dir, origin));
            debug!("Updating run path of {} to {}", target.display(), runpath);

            if !self.config.mode.dry_run {
                self.tools.set_runpath(&target, &runpath)?;
            }
            updated.push((target, runpath));
        }
        Ok(updated)
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Fail if two different sources would land on the same destination.
fn check_collisions(ops: &[CopyOp]) -> Result<()> {
    let mut claimed: HashMap<&Path, &CopyOp> = HashMap::new();
    for op in ops {
        if let Some(first) = claimed.get(op.destination.as_path()) {
            if first.source != op.source {
                return Err(DeployError::DestinationCollision {
                    destination: op.destination.clone(),
                    first: first.source.origin(),
                    second: op.source.origin(),
                }
                .into());
            }
            continue;
        }
        claimed.insert(op.destination.as_path(), op);
    }
    Ok(())
}

/// Drop duplicate operations and directory copies already performed as part
/// of an enclosing directory copy (`QtQuick/Controls` inside `QtQuick`).
fn drop_covered(ops: Vec<CopyOp>) -> Vec<CopyOp> {
    let dir_copies: Vec<(PathBuf, PathBuf, bool)> = ops
        .iter()
        .filter_map(|op| match &op.source {
            Source::Dir { path, strip_debug } => {
                Some((path.clone(), op.destination.clone(), *strip_debug))
            }
            _ => None,
        })
        .collect();

    let covered = |op: &CopyOp| match &op.source {
        Source::Dir { path, strip_debug } => dir_copies.iter().any(|(src, dst, strip)| {
            dst != &op.destination
                && strip == strip_debug
                && op
                    .destination
                    .strip_prefix(dst)
                    .ok()
                    .zip(path.strip_prefix(src).ok())
                    .is_some_and(|(a, b)| a == b)
        }),
        _ => false,
    };

    let mut seen = BTreeSet::new();
    let mut kept = Vec::new();
    for op in ops.iter() {
        if covered(op) {
            debug!(
                "{} is deployed with its parent directory",
                op.destination.display()
            );
            continue;
        }
        if seen.insert(op.destination.clone()) {
            kept.push(op.clone());
        }
    }
    kept
}

/// Plan and deploy everything `config` asks for.
pub fn run(config: &DeployConfig, tools: &dyn Toolchain) -> Result<DeployReport> {
    let mut resolver = Resolver::new(tools, QtInstall::new(&config.qt_dir));
    let plan = build_plan(&mut resolver, &config.executables, &config.qml_scan_dirs)?;

    let report = Deployer::new(config, tools)?.deploy(&plan)?;
    info!("Deployment succeeded.");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OperationMode, SkipFlags};
    use crate::entity::{Executable, QtTranslation};
    use crate::testing::{FakeToolchain, MockQt};
    use std::collections::BTreeMap;
    use std::fs;
    use walkdir::WalkDir;

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let rel = entry.path().strip_prefix(dir).unwrap().to_path_buf();
                (rel, fs::read(entry.path()).unwrap())
            })
            .collect()
    }

    fn files(dir: &Path) -> Vec<String> {
        snapshot(dir)
            .into_keys()
            .map(|path| path.display().to_string())
            .collect()
    }

    fn forced() -> OperationMode {
        OperationMode {
            force: true,
            ..OperationMode::default()
        }
    }

    /// A widgets application with the xcb platform plugin (which carries a
    /// private helper library) and a German qtbase catalog.
    fn widgets_app(mock: &MockQt) -> (PathBuf, FakeToolchain) {
        let app = mock.app("viewer");
        let widgets = mock.lib("libQt6Widgets.so.6");
        let gui = mock.lib("libQt6Gui.so.6");
        let core = mock.lib("libQt6Core.so.6");
        let xcb_qpa = mock.lib("libQt6XcbQpa.so.6");
        let xcb = mock.plugin("platforms", "libqxcb.so");
        mock.plugin("platforms", "libqxcb.so.debug");
        mock.plugin("platforms", "private/libxcbhelper.so");
        let libc = mock.write("usr/lib/libc.so.6", "libc");
        mock.module_pri("gui", "Qt6Gui", "platforms imageformats");
        mock.write("qt/translations/qtbase_de.qm", "de");

        let tools = FakeToolchain::new()
            .with_deps(&app, &[widgets.clone(), gui.clone(), core.clone(), libc.clone()])
            .with_deps(&widgets, &[gui.clone(), core.clone(), libc.clone()])
            .with_deps(&gui, &[core.clone(), libc.clone()])
            .with_deps(&core, &[libc.clone()])
            .with_deps(&xcb, &[xcb_qpa, gui, core, libc]);
        (app, tools)
    }

    #[test]
    fn test_render_qt_conf() {
        let dirs = OutputDirs {
            exe_dir: PathBuf::from("/dist/bin"),
            lib_dir: PathBuf::from("/dist/lib"),
            plugins_dir: PathBuf::from("/dist/plugins"),
            qml_dir: PathBuf::from("/dist/qml"),
            data_dir: PathBuf::from("/dist/bin"),
            translations_dir: PathBuf::from("/dist/bin/translations"),
        };
        assert_eq!(
            render_qt_conf(&dirs),
            "[Paths]\n\
             Plugins = ../plugins\n\
             Imports = ../qml\n\
             Qml2Imports = ../qml\n\
             Data = .\n\
             Translations = translations\n"
        );
    }

    #[test]
    fn test_single_executable_without_qt_deps() {
        let mock = MockQt::new();
        let app = mock.app("tool");
        let libc = mock.write("usr/lib/libc.so.6", "libc");
        let tools = FakeToolchain::new().with_deps(&app, &[libc]);
        let dist = mock.path("dist");

        let config = DeployConfig::new(mock.qt_dir(), vec![app], OutputDirs::with_root(&dist));
        run(&config, &tools).unwrap();

        assert_eq!(files(&dist), vec!["qt.conf", "tool"]);
        assert_eq!(
            tools.runpath_of(&dist.join("tool")).as_deref(),
            Some("$ORIGIN")
        );
    }

    #[test]
    fn test_deploys_closure_plugins_and_translations() {
        let mock = MockQt::new();
        let (app, tools) = widgets_app(&mock);
        let dist = mock.path("dist");

        let config = DeployConfig::new(mock.qt_dir(), vec![app], OutputDirs::with_root(&dist));
        run(&config, &tools).unwrap();

        assert_eq!(
            files(&dist),
            vec![
                "libQt6Core.so.6",
                "libQt6Gui.so.6",
                "libQt6Widgets.so.6",
                "libQt6XcbQpa.so.6",
                "platforms/libqxcb.so",
                "platforms/private/libxcbhelper.so",
                "qt.conf",
                "translations/qtbase_de.qm",
                "viewer",
            ]
        );
    }

    #[test]
    fn test_runpaths_cover_untracked_plugin_libraries() {
        let mock = MockQt::new();
        let (app, tools) = widgets_app(&mock);
        let dist = mock.path("dist");

        let mut dirs = OutputDirs::with_root(&dist);
        dirs.exe_dir = dist.join("bin");
        dirs.lib_dir = dist.join("lib");
        dirs.plugins_dir = dist.join("plugins");
        let config = DeployConfig::new(mock.qt_dir(), vec![app], dirs);
        run(&config, &tools).unwrap();

        let runpath = |rel: &str| tools.runpath_of(&dist.join(rel));
        assert_eq!(runpath("bin/viewer").as_deref(), Some("$ORIGIN/../lib"));
        assert_eq!(runpath("lib/libQt6Core.so.6").as_deref(), Some("$ORIGIN"));
        assert_eq!(
            runpath("plugins/platforms/libqxcb.so").as_deref(),
            Some("$ORIGIN/../../lib")
        );
        assert_eq!(
            runpath("plugins/platforms/private/libxcbhelper.so").as_deref(),
            Some("$ORIGIN/../../../lib")
        );
        assert_eq!(tools.runpaths.borrow().len(), 7);
    }

    #[test]
    fn test_overwrite_without_force_aborts_before_writing() {
        let mock = MockQt::new();
        let (app, tools) = widgets_app(&mock);
        let dist = mock.path("dist");
        let existing = mock.write("dist/libQt6Core.so.6", "previous build");

        let config = DeployConfig::new(mock.qt_dir(), vec![app], OutputDirs::with_root(&dist));
        let err = run(&config, &tools).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::WouldOverwrite { path }) if *path == existing
        ));
        assert_eq!(files(&dist), vec!["libQt6Core.so.6"]);
        assert_eq!(fs::read_to_string(&existing).unwrap(), "previous build");
        assert!(tools.runpaths.borrow().is_empty());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let mock = MockQt::new();
        let (app, tools) = widgets_app(&mock);
        let dist = mock.path("dist");

        let mode = OperationMode {
            dry_run: true,
            ..OperationMode::default()
        };
        let config = DeployConfig::new(mock.qt_dir(), vec![app], OutputDirs::with_root(&dist))
            .with_mode(mode);
        let report = run(&config, &tools).unwrap();

        assert!(!dist.exists());
        assert!(report.copied.contains(&dist.join("libQt6Core.so.6")));
        assert!(tools.runpaths.borrow().is_empty());
    }

    #[test]
    fn test_forced_redeploy_is_identical() {
        let mock = MockQt::new();
        let (app, tools) = widgets_app(&mock);
        let dist = mock.path("dist");

        let config = DeployConfig::new(mock.qt_dir(), vec![app], OutputDirs::with_root(&dist))
            .with_mode(forced());
        run(&config, &tools).unwrap();
        let first = snapshot(&dist);
        run(&config, &tools).unwrap();

        assert_eq!(first, snapshot(&dist));
    }

    #[test]
    fn test_in_place_executable_is_not_copied() {
        let mock = MockQt::new();
        let app = mock.app("tool");
        let tools = FakeToolchain::new();
        let app_dir = mock.path("app");
        let before = fs::metadata(&app).unwrap().modified().unwrap();

        let config = DeployConfig::new(
            mock.qt_dir(),
            vec![app.clone()],
            OutputDirs::with_root(&app_dir),
        );
        let report = run(&config, &tools).unwrap();

        assert_eq!(report.copied, vec![app_dir.join("qt.conf")]);
        assert_eq!(fs::metadata(&app).unwrap().modified().unwrap(), before);
        assert_eq!(tools.runpath_of(&app).as_deref(), Some("$ORIGIN"));
    }

    #[test]
    fn test_same_name_from_different_sources_collides() {
        let mock = MockQt::new();
        let first = mock.write("a/tool", "a");
        let second = mock.write("b/tool", "b");
        let tools = FakeToolchain::new();
        let dist = mock.path("dist");

        let config = DeployConfig::new(
            mock.qt_dir(),
            vec![first, second],
            OutputDirs::with_root(&dist),
        );
        let err = run(&config, &tools).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::DestinationCollision { .. })
        ));
        assert!(!dist.exists());
    }

    #[test]
    fn test_nested_qml_modules_deploy_once() {
        let mock = MockQt::new();
        let app = mock.app("viewer");
        mock.write("qt/qml/QtQuick/qmldir", "module QtQuick");
        mock.write("qt/qml/QtQuick/Controls/qmldir", "module QtQuick.Controls");
        mock.write("qt/qml/QtQuick/Controls/libqtquickcontrols2plugin.so.debug", "dwarf");
        let json = format!(
            r#"[
                {{"name": "QtQuick", "type": "module", "path": "{0}/QtQuick"}},
                {{"name": "QtQuick.Controls", "type": "module", "path": "{0}/QtQuick/Controls"}}
            ]"#,
            mock.qt_dir().join("qml").display()
        );
        let tools = FakeToolchain::new().with_scanner_output(&json);
        let dist = mock.path("dist");

        let mut dirs = OutputDirs::with_root(&dist);
        dirs.qml_dir = dist.join("qml");
        let config = DeployConfig::new(mock.qt_dir(), vec![app], dirs)
            .with_qml_scan_dirs(vec![mock.path("app")]);
        run(&config, &tools).unwrap();

        assert_eq!(
            files(&dist.join("qml")),
            vec!["QtQuick/Controls/qmldir", "QtQuick/qmldir"]
        );
    }

    #[test]
    fn test_skip_flags_limit_deployment() {
        let mock = MockQt::new();
        let (app, tools) = widgets_app(&mock);
        let dist = mock.path("dist");

        let skip = SkipFlags {
            conf: true,
            plugins: true,
            translations: true,
            ..SkipFlags::default()
        };
        let config = DeployConfig::new(mock.qt_dir(), vec![app], OutputDirs::with_root(&dist))
            .with_skip(skip);
        run(&config, &tools).unwrap();

        assert_eq!(
            files(&dist),
            vec![
                "libQt6Core.so.6",
                "libQt6Gui.so.6",
                "libQt6Widgets.so.6",
                "libQt6XcbQpa.so.6",
                "viewer",
            ]
        );
    }

    #[test]
    fn test_data_directory_is_deployed_when_present() {
        let mock = MockQt::new();
        let app = mock.app("browser");
        mock.write("qt/resources/icudtl.dat", "icu");
        let tools = FakeToolchain::new();
        let dist = mock.path("dist");

        let config = DeployConfig::new(mock.qt_dir(), vec![app], OutputDirs::with_root(&dist));
        run(&config, &tools).unwrap();

        assert!(dist.join("resources/icudtl.dat").is_file());
    }

    #[test]
    fn test_translation_directory_skips_debug_files() {
        let mock = MockQt::new();
        let locales = mock.qt_dir().join("translations/qtwebengine_locales");
        mock.write("qt/translations/qtwebengine_locales/de.pak", "de");
        mock.write("qt/translations/qtwebengine_locales/de.pak.debug", "dwarf");
        let tools = FakeToolchain::new();
        let dist = mock.path("dist");

        let config = DeployConfig::new(mock.qt_dir(), vec![], OutputDirs::with_root(&dist))
            .with_skip(SkipFlags {
                conf: true,
                ..SkipFlags::default()
            });
        let mut plan = DeploymentPlan::default();
        plan.translations.insert(QtTranslation {
            name: "qtwebengine_locales".to_string(),
            path: locales,
        });
        Deployer::new(&config, &tools).unwrap().deploy(&plan).unwrap();

        assert_eq!(files(&dist), vec!["translations/qtwebengine_locales/de.pak"]);
    }

    #[test]
    fn test_copy_ops_order() {
        let mock = MockQt::new();
        let tools = FakeToolchain::new();
        let dist = mock.path("dist");
        let config = DeployConfig::new(mock.qt_dir(), vec![], OutputDirs::with_root(&dist));
        let deployer = Deployer::new(&config, &tools).unwrap();

        let mut plan = DeploymentPlan::default();
        plan.executables
            .insert(Executable::new("viewer", mock.app("viewer")));
        let kinds: Vec<_> = deployer
            .copy_ops(&plan)
            .into_iter()
            .map(|op| op.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ArtifactKind::Configuration, ArtifactKind::Executable]
        );
    }
}
