//! Fatal deployment errors.
//!
//! Every failure aborts the run. These variants exist so the driver and the
//! tests can tell the fatal conditions apart; they travel through
//! `anyhow::Error` and are recovered with `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    /// An external tool is not installed or not on `PATH`.
    #[error("cannot find '{tool}' tool in PATH")]
    ToolNotFound { tool: String },

    /// An external tool exited with a non-zero status.
    #[error("{tool} failed on {target} ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        target: PathBuf,
        status: String,
        stderr: String,
    },

    /// The destination exists and overwriting was not forced.
    #[error("cannot overwrite without --force: {path}")]
    WouldOverwrite { path: PathBuf },

    /// Two different sources would be deployed to the same destination.
    #[error("both {first} and {second} would be deployed to {destination}")]
    DestinationCollision {
        destination: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// The QML import scanner printed something that is not a descriptor list.
    #[error("malformed qmlimportscanner output for {root}: {reason}")]
    MalformedScannerOutput { root: PathBuf, reason: String },

    /// A scanned QML module does not live under the installation's QML directory.
    #[error("QML module {module} lies outside {qml_root}")]
    QmlModuleOutsideImportPath { module: PathBuf, qml_root: PathBuf },
}
