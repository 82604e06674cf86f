//! The top-level installable unit.

use std::path::PathBuf;

use crate::container::Container;
use crate::error::ModuleResult;

/// Descriptive information about an installed plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
}

/// Everything a plugin receives when it is loaded.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub info: PluginInfo,
    /// The plugin's (extracted) directory.
    pub directory: PathBuf,
    pub container: Container,
}

/// A plugin that is not itself a [`Module`](crate::Module).
///
/// Plugins that publish services should implement `Module` instead; the
/// plugin manager drives either kind.
pub trait Plugin: Send + Sync {
    fn initialize(&self, context: &PluginContext) -> ModuleResult<()>;

    fn destroy(&self) -> ModuleResult<()> {
        Ok(())
    }
}
