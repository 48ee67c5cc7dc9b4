//! Qt library classification and module, plugin and translation discovery.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::analyze::{find_libs, parse_lib_name};
use crate::context::Resolver;
use crate::entity::{Executable, QtModule, QtPlugin, QtTranslation, SharedLib};
use crate::paths::QtInstall;

/// Properties of one module, from its `.pri` file (`module`, `plugin_types`, ...).
pub type ModuleProperties = HashMap<String, String>;

/// Modules whose name contains this token belong to Qt WebEngine.
pub const WEBENGINE_MARKER: &str = "WebEngine";
pub const WEBENGINE_PROCESS: &str = "QtWebEngineProcess";
pub const WEBENGINE_LOCALES: &str = "qtwebengine_locales";

/// Translation domain of each module that ships translations.
const TRANSLATION_DOMAINS: &[(&str, &str)] = &[
    ("Qt6Concurrent", "qtbase"),
    ("Qt6Core", "qtbase"),
    ("Qt6Declarative", "qtquick1"),
    ("Qt6Gui", "qtbase"),
    ("Qt6Help", "qt_help"),
    ("Qt6Multimedia", "qtmultimedia"),
    ("Qt6MultimediaWidgets", "qtmultimedia"),
    ("Qt6MultimediaQuick", "qtmultimedia"),
    ("Qt6Network", "qtbase"),
    ("Qt6Qml", "qtdeclarative"),
    ("Qt6Quick", "qtdeclarative"),
    ("Qt6Script", "qtscript"),
    ("Qt6ScriptTools", "qtscript"),
    ("Qt6SerialPort", "qtserialport"),
    ("Qt6Sql", "qtbase"),
    ("Qt6Test", "qtbase"),
    ("Qt6Widgets", "qtbase"),
    ("Qt6Xml", "qtbase"),
    ("Qt6WebEngine", "qtwebengine"),
];

static PRI_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*QT\.[a-zA-Z]+\.(\S+)\s*=\s*(.*)").expect("pri line pattern is valid")
});

static BASE_CATALOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^qtbase_(\S+)\.qm$").expect("catalog pattern is valid"));

/// Whether `lib` is a Qt library: its real path is under the installation's
/// `lib/` directory and its file name follows the library naming convention.
pub fn is_qt_lib(qt: &QtInstall, lib: &SharedLib) -> bool {
    let real = lib.path.canonicalize().unwrap_or_else(|_| lib.path.clone());

    let named_like_lib = real
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(parse_lib_name)
        .is_some();

    named_like_lib && real != qt.real_lib_dir() && real.starts_with(qt.real_lib_dir())
}

pub fn is_webengine_module(module: &QtModule) -> bool {
    module.name.contains(WEBENGINE_MARKER)
}

/// Translation domain for a module name (`Qt6Widgets` gives `qtbase`).
pub fn translation_domain(module_name: &str) -> Option<&'static str> {
    TRANSLATION_DOMAINS
        .iter()
        .find(|(name, _)| *name == module_name)
        .map(|(_, domain)| *domain)
}

/// Parse the `QT.<module>.<key> = <value>` assignments of a `.pri` file.
/// Other lines are ignored.
pub fn parse_module_pri(content: &str) -> ModuleProperties {
    content
        .lines()
        .filter_map(|line| PRI_LINE.captures(line))
        .map(|caps| (caps[1].to_string(), caps[2].trim_end().to_string()))
        .collect()
}

impl Resolver<'_> {
    /// Module metadata of the installation, keyed by module name (`Qt6Gui`).
    pub fn available_modules(&mut self) -> Result<&HashMap<String, ModuleProperties>> {
        if self.cache.modules.is_none() {
            let modules = load_modules(&self.qt.modules_dir())?;
            debug!("Found {} module descriptions", modules.len());
            self.cache.modules = Some(modules);
        }
        Ok(self.cache.modules.get_or_insert_with(HashMap::new))
    }

    /// Language codes with a `qtbase_<lang>.qm` catalog in the installation.
    pub fn available_langs(&mut self) -> Result<Vec<String>> {
        if let Some(langs) = &self.cache.langs {
            return Ok(langs.clone());
        }

        let dir = self.qt.translations_dir();
        let mut langs = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?
            {
                let file_name = entry?.file_name();
                if let Some(caps) = BASE_CATALOG.captures(&file_name.to_string_lossy()) {
                    langs.push(caps[1].to_string());
                }
            }
        }
        langs.sort();

        self.cache.langs = Some(langs.clone());
        Ok(langs)
    }

    /// One module per Qt library on the dependency graph of `executable`.
    pub fn find_qt_modules(&mut self, executable: &Path) -> Result<BTreeSet<QtModule>> {
        let mut modules = BTreeSet::new();
        for lib in self.resolve_libs(executable)? {
            if !is_qt_lib(&self.qt, &lib) {
                continue;
            }
            if let Some(name) = parse_lib_name(&lib.name) {
                modules.insert(QtModule {
                    name: name.to_string(),
                    lib,
                });
            }
        }
        Ok(modules)
    }

    /// The module's library plus every Qt library it depends on.
    pub fn find_qt_module_libs(&mut self, module: &QtModule) -> Result<BTreeSet<SharedLib>> {
        let mut libs = BTreeSet::from([module.lib.clone()]);
        for lib in self.resolve_libs(&module.lib.path)? {
            if is_qt_lib(&self.qt, &lib) {
                libs.insert(lib);
            }
        }
        Ok(libs)
    }

    /// Helper processes the module spawns at runtime.
    pub fn find_qt_module_executables(&self, module: &QtModule) -> BTreeSet<Executable> {
        let mut executables = BTreeSet::new();
        if is_webengine_module(module) {
            executables.insert(Executable::new(
                WEBENGINE_PROCESS,
                self.qt.libexec_dir().join(WEBENGINE_PROCESS),
            ));
        }
        executables
    }

    /// Translation catalogs of the module's domain, one per available language.
    pub fn find_qt_module_translations(
        &mut self,
        module: &QtModule,
    ) -> Result<BTreeSet<QtTranslation>> {
        let mut translations = BTreeSet::new();
        let dir = self.qt.translations_dir();

        if let Some(domain) = translation_domain(&module.name) {
            for lang in self.available_langs()? {
                let name = format!("{domain}_{lang}.qm");
                let path = dir.join(&name);
                if path.is_file() {
                    translations.insert(QtTranslation { name, path });
                }
            }
        }

        if is_webengine_module(module) {
            translations.insert(QtTranslation {
                name: WEBENGINE_LOCALES.to_string(),
                path: dir.join(WEBENGINE_LOCALES),
            });
        }

        Ok(translations)
    }

    /// Plugin types declared by the module that exist in the installation.
    pub fn find_qt_module_plugins(&mut self, module: &QtModule) -> Result<BTreeSet<QtPlugin>> {
        let plugin_types: Vec<String> = self
            .available_modules()?
            .get(&module.name)
            .and_then(|props| props.get("plugin_types"))
            .map(|types| types.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let mut plugins = BTreeSet::new();
        for name in plugin_types {
            let path = self.qt.plugin_dir(&name);
            if path.is_dir() {
                plugins.insert(QtPlugin { name, path });
            } else {
                debug!("Plugin directory {} not found, skipping", path.display());
            }
        }
        Ok(plugins)
    }

    /// Qt libraries needed by any library inside the plugin directory.
    pub fn find_qt_plugin_libs(&mut self, plugin: &QtPlugin) -> Result<BTreeSet<SharedLib>> {
        if let Some(libs) = self.cache.plugin_libs.get(plugin) {
            return Ok(libs.clone());
        }

        let mut libs = BTreeSet::new();
        for plugin_lib in find_libs(&[&plugin.path])? {
            for lib in self.resolve_libs(&plugin_lib.path)? {
                if is_qt_lib(&self.qt, &lib) {
                    libs.insert(lib);
                }
            }
        }

        self.cache.plugin_libs.insert(plugin.clone(), libs.clone());
        Ok(libs)
    }
}

fn load_modules(modules_dir: &Path) -> Result<HashMap<String, ModuleProperties>> {
    let mut modules = HashMap::new();
    if !modules_dir.is_dir() {
        return Ok(modules);
    }

    for entry in fs::read_dir(modules_dir)
        .with_context(|| format!("Failed to read {}", modules_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "pri") {
            continue;
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let props = parse_module_pri(&content);
        if let Some(name) = props.get("module") {
            modules.insert(name.clone(), props);
        }
    }

    Ok(modules)
}
