/// Errors raised while loading or validating agent configuration.
///
/// Every variant is fatal at startup: the agent refuses to run with a partial
/// configuration.
///
/// # Examples
///
/// ```rust
/// use netpulse_common::error::ConfigError;
///
/// let err = ConfigError::MissingKey("influxdb.token".to_string());
/// assert!(err.to_string().contains("influxdb.token"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A `monitor_rate` string is malformed, has an unknown unit, or is not positive.
    #[error("Config: invalid refresh rate '{rate}': {reason}")]
    InvalidRefreshRate { rate: String, reason: String },

    /// A required key is absent or empty.
    #[error("Config: missing required key '{0}'")]
    MissingKey(String),

    /// A value is present but outside its accepted range.
    #[error("Config: invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// A list that must contain at least one entry is empty.
    #[error("Config: '{0}' must not be empty")]
    EmptyList(String),

    /// The configuration file could not be read.
    #[error("Config: failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or does not match the expected shape.
    #[error("Config: failed to parse: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Convenience `Result` alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
