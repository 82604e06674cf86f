//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{PluginsConfig, ServerConfig, SwitchboardConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchboardConfig) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    validate_plugins_config(&config.plugins)?;
    validate_logging_filters(config)?;
    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    if server.home.as_os_str().is_empty() {
        return Err(ConfigError::required("server.home"));
    }
    if server.encoding.trim().is_empty() {
        return Err(ConfigError::required("server.encoding"));
    }
    if server.version.trim().is_empty() {
        return Err(ConfigError::required("server.version"));
    }
    Ok(())
}

fn validate_plugins_config(plugins: &PluginsConfig) -> ConfigResult<()> {
    if plugins.directory.as_os_str().is_empty() {
        return Err(ConfigError::required("plugins.directory"));
    }

    if plugins.scan_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "plugins.scan_interval_secs",
            "must be greater than 0",
        ));
    }
    if plugins.dev_scan_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "plugins.dev_scan_interval_secs",
            "must be greater than 0",
        ));
    }

    if plugins.bootstrap.trim().is_empty() {
        return Err(ConfigError::required("plugins.bootstrap"));
    }

    if plugins.archive_extensions.is_empty() {
        return Err(ConfigError::required("plugins.archive_extensions"));
    }
    for ext in &plugins.archive_extensions {
        if ext.is_empty() || ext.starts_with('.') || ext.contains(['/', '\\']) {
            return Err(ConfigError::invalid(
                "plugins.archive_extensions",
                format!("{ext:?} is not a bare extension"),
            ));
        }
    }

    Ok(())
}

fn validate_logging_filters(config: &SwitchboardConfig) -> ConfigResult<()> {
    for target in config.logging.filters.keys() {
        if target.trim().is_empty() || target.contains([' ', '=']) {
            return Err(ConfigError::invalid(
                "logging.filters",
                format!("{target:?} is not a target name"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SwitchboardConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = SwitchboardConfig::default();
        config.plugins.scan_interval_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.key(), Some("plugins.scan_interval_secs"));
    }

    #[test]
    fn test_empty_bootstrap_rejected() {
        let mut config = SwitchboardConfig::default();
        config.plugins.bootstrap = " ".into();
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.key(), Some("plugins.bootstrap"));
    }

    #[test]
    fn test_dotted_extension_rejected() {
        let mut config = SwitchboardConfig::default();
        config.plugins.archive_extensions = vec![".zip".into()];
        assert!(validate_config(&config).is_err());
    }
}
