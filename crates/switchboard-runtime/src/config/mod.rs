//! Runtime configuration.
//!
//! Three sections: `[logging]`, `[server]` (the container environment) and
//! `[plugins]` (the watched plugin directory).

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, PluginsConfig, ServerConfig,
    SwitchboardConfig,
};
pub use validation::validate_config;
