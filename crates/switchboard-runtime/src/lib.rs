//! # Switchboard Runtime
//!
//! Hot deployment and orchestration for the Switchboard server:
//!
//! - [`PluginManager`]: watches the plugin directory, explodes archives,
//!   loads plugins bootstrap-first and unloads them when their archive goes
//! - [`PluginClassLoader`] / [`PluginCatalog`]: resolve a manifest's class
//!   name to a constructor, chained parent-first
//! - [`SwitchboardRuntime`]: configuration, logging, registry, container and
//!   plugin monitor wired together
//!
//! ## Plugin Layout
//!
//! ```text
//! plugins/
//! ├── admin/                  bootstrap plugin, always loaded first
//! │   └── plugin.toml
//! ├── muc.zip                 exploded into muc/ on the next scan
//! └── muc/
//!     ├── plugin.toml         class = "org.example.muc"
//!     ├── classes/
//!     └── lib/
//! ```
//!
//! ## Feature Flags
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `native-plugins`: plugin classes from dynamic libraries in `lib/`

pub mod archive;
pub mod catalog;
pub mod classloader;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod manifest;
pub mod monitor;
pub mod runtime;

pub use catalog::{Factory, PLUGIN_CLASSES, PluginCatalog, PluginClass, PluginInstance};
pub use classloader::PluginClassLoader;
pub use config::{ConfigError, ConfigLoader, ConfigResult, SwitchboardConfig};
pub use error::{PluginError, PluginResult, RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use manager::{PluginListener, PluginManager, PluginManagerBuilder, ScanSummary};
pub use manifest::PluginManifest;
pub use monitor::PluginMonitor;
pub use runtime::{RuntimeBuilder, SwitchboardRuntime};

#[doc(hidden)]
pub use linkme;

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
