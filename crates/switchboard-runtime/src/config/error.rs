use std::path::PathBuf;

use thiserror::Error;

/// Why the server configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly named file does not exist. Searched files are optional.
    #[error("no configuration at {}", .0.display())]
    NotFound(PathBuf),

    #[error("configuration files with extension {extension:?} are not supported")]
    UnsupportedFormat { extension: String },

    /// The merged sources do not deserialize into the schema.
    #[error(transparent)]
    Extract(#[from] figment::Error),

    /// A setting is present but unusable, or empty where a value is required.
    #[error("`{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }

    pub(crate) fn required(key: &'static str) -> Self {
        Self::invalid(key, "a value is required")
    }

    /// The dotted key of an invalid setting.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_names_the_key() {
        let err = ConfigError::required("plugins.bootstrap");
        assert_eq!(err.key(), Some("plugins.bootstrap"));
        assert_eq!(err.to_string(), "`plugins.bootstrap`: a value is required");
        assert_eq!(ConfigError::NotFound("x.toml".into()).key(), None);
    }
}
