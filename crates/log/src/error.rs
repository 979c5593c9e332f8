use thiserror::Error;

/// Logger setup failures
#[derive(Debug, Error)]
pub enum LogError {
    /// Filter directives could not be parsed
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A configuration value is not recognised
    #[error("Invalid log configuration: {0}")]
    Config(String),

    /// A global subscriber is already installed
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

pub type LogResult<T> = Result<T, LogError>;
