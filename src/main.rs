use anyhow::{Context, Result};
use clap::Parser;
use qtbundle::{absolute, run, DeployConfig, OperationMode, OutputDirs, SkipFlags, SystemToolchain};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "qtbundle")]
#[command(about = "Make Linux Qt 6 applications self-contained")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Input executables
    #[arg(required = true, value_name = "EXECUTABLE")]
    executables: Vec<PathBuf>,

    /// Qt installation directory (e.g. /opt/Qt/6.5.3/gcc_64)
    #[arg(long, value_name = "PATH")]
    qtdir: PathBuf,

    /// Directory to scan for QML imports (repeatable)
    #[arg(long = "qml-scan-dir", value_name = "PATH")]
    qml_scan_dirs: Vec<PathBuf>,

    /// Force overwriting existing files
    #[arg(short, long)]
    force: bool,

    /// Print what is going to be deployed, but don't deploy anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Verbosity level (0: errors, 1: progress, 2: every file, 3: tool commands)
    #[arg(short, long, value_name = "LEVEL", default_value_t = 1)]
    verbose: u8,

    /// Output directory (by default directory of first executable)
    #[arg(long, value_name = "PATH")]
    out_dir: Option<PathBuf>,

    /// Output directory for executables (by default same as --out-dir)
    #[arg(long, value_name = "PATH")]
    out_exe_dir: Option<PathBuf>,

    /// Output directory for libraries (by default same as --out-dir)
    #[arg(long, value_name = "PATH")]
    out_lib_dir: Option<PathBuf>,

    /// Output directory for plugins (by default same as --out-dir)
    #[arg(long, value_name = "PATH")]
    out_plugins_dir: Option<PathBuf>,

    /// Output directory for qml modules (by default same as --out-dir)
    #[arg(long, value_name = "PATH")]
    out_qml_dir: Option<PathBuf>,

    /// Output directory for data files (by default same as --out-dir)
    #[arg(long, value_name = "PATH")]
    out_data_dir: Option<PathBuf>,

    /// Output directory for translations (by default 'translations' inside --out-dir)
    #[arg(long, value_name = "PATH")]
    out_translations_dir: Option<PathBuf>,

    /// Skip qt.conf deployment
    #[arg(long)]
    no_conf: bool,

    /// Skip executable deployment
    #[arg(long)]
    no_exe: bool,

    /// Skip libraries deployment
    #[arg(long)]
    no_lib: bool,

    /// Skip plugins deployment
    #[arg(long)]
    no_plugins: bool,

    /// Skip qml modules deployment
    #[arg(long)]
    no_qml: bool,

    /// Skip data files deployment
    #[arg(long)]
    no_data: bool,

    /// Skip translations deployment
    #[arg(long)]
    no_translations: bool,
}

impl Cli {
    fn into_config(self) -> Result<DeployConfig> {
        let root = match &self.out_dir {
            Some(dir) => dir.clone(),
            None => {
                let first = &self.executables[0];
                let parent = first
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."));
                absolute(parent)
                    .with_context(|| format!("Cannot locate directory of {}", first.display()))?
            }
        };

        let defaults = OutputDirs::with_root(&root);
        let dirs = OutputDirs {
            exe_dir: self.out_exe_dir.unwrap_or(defaults.exe_dir),
            lib_dir: self.out_lib_dir.unwrap_or(defaults.lib_dir),
            plugins_dir: self.out_plugins_dir.unwrap_or(defaults.plugins_dir),
            qml_dir: self.out_qml_dir.unwrap_or(defaults.qml_dir),
            data_dir: self.out_data_dir.unwrap_or(defaults.data_dir),
            translations_dir: self.out_translations_dir.unwrap_or(defaults.translations_dir),
        };

        let skip = SkipFlags {
            conf: self.no_conf,
            exe: self.no_exe,
            lib: self.no_lib,
            plugins: self.no_plugins,
            qml: self.no_qml,
            data: self.no_data,
            translations: self.no_translations,
        };

        let mode = OperationMode {
            force: self.force,
            dry_run: self.dry_run,
            verbosity: self.verbose,
        };

        Ok(DeployConfig::new(self.qtdir, self.executables, dirs)
            .with_qml_scan_dirs(self.qml_scan_dirs)
            .with_skip(skip)
            .with_mode(mode))
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = cli
        .into_config()
        .and_then(|config| run(&config, &SystemToolchain));

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            ExitCode::FAILURE
        }
    }
}
