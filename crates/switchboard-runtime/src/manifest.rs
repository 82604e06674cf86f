//! `plugin.toml` parsing.
//!
//! ```toml
//! class = "org.example.muc"
//! name = "Multi-User Chat"
//! description = "Group chat rooms"
//! author = "Example Org"
//! version = "1.2.0"
//! min_server_version = "0.1.0"
//! parent_plugin = "admin"
//! ```

use std::cmp::Ordering;
use std::path::Path;

use serde::Deserialize;
use switchboard_framework::PluginInfo;

use crate::error::{PluginError, PluginResult};

/// File name of the plugin manifest, relative to the plugin root.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Parsed plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// Implementation class name.
    pub class: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub min_server_version: Option<String>,
    /// Directory name of the plugin whose loader this one chains to.
    #[serde(default)]
    pub parent_plugin: Option<String>,
}

impl PluginManifest {
    /// Reads `<dir>/plugin.toml`.
    pub fn load(dir: &Path) -> PluginResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| PluginError::manifest(&path, e))?;
        Self::parse(&text).map_err(|reason| PluginError::manifest(&path, reason))
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let mut manifest: Self = toml::from_str(text).map_err(|e| e.message().to_string())?;
        manifest.class = manifest.class.trim().to_string();
        if manifest.class.is_empty() {
            return Err("`class` must not be empty".to_string());
        }
        manifest.parent_plugin = manifest
            .parent_plugin
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Ok(manifest)
    }

    /// Descriptive info; `dir_name` stands in for a missing `name`.
    pub fn info(&self, dir_name: &str) -> PluginInfo {
        PluginInfo {
            name: self.name.clone().unwrap_or_else(|| dir_name.to_string()),
            description: self.description.clone(),
            author: self.author.clone(),
            version: self.version.clone(),
        }
    }

    /// Whether a server at `server_version` satisfies `min_server_version`.
    pub fn supports_server(&self, server_version: &str) -> bool {
        self.min_server_version
            .as_deref()
            .is_none_or(|required| compare_versions(server_version, required) != Ordering::Less)
    }
}

/// Compares dotted versions numerically, component by component.
///
/// Missing components count as zero and a non-numeric suffix such as
/// `-beta` is ignored, so `1.2` == `1.2.0` and `1.10` > `1.9`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
