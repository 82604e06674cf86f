//! Runtime error types.

use std::path::PathBuf;

use switchboard_framework::{ContainerError, ModuleError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while discovering, loading or unloading a plugin.
///
/// All of these are confined to the plugin they concern: the scan that hit
/// them logs the error and moves on to the next candidate.
#[derive(Error, Debug)]
pub enum PluginError {
    /// `plugin.toml` is missing or malformed.
    #[error("invalid plugin manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// No loader in the chain provides the manifest's class.
    #[error("plugin class not found: {0}")]
    MissingClass(String),

    /// The class constructor panicked.
    #[error("failed to instantiate plugin class {class}: {reason}")]
    Instantiation { class: String, reason: String },

    /// The manifest names a parent plugin that is not installed.
    #[error("parent plugin {parent} of {plugin} is not present")]
    ParentMissing { plugin: String, parent: String },

    /// The plugin requires a newer server.
    #[error("plugin {plugin} requires server version {required}, running {running}")]
    VersionTooOld {
        plugin: String,
        required: String,
        running: String,
    },

    /// The archive could not be read or contains unsafe entries.
    #[error("invalid plugin archive {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    /// Native plugin library failure.
    #[error("failed to load native plugin library {}: {reason}", path.display())]
    Library { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lifecycle call on the plugin failed.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

impl PluginError {
    pub fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that stop the runtime as a whole.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The runtime is already running or was shut down.
    #[error("invalid runtime state: {0}")]
    State(&'static str),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
