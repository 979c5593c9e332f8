//! Rotation configuration
//!
//! All settings are optional and come from the environment of the process
//! running the rotation.
//!
//! | Variable | Default |
//! |---|---|
//! | `PASSWORD_LENGTH` | `32` |
//! | `EXCLUDE_CHARACTERS` | `` :/@"'\ `` |
//! | `EXCLUDE_NUMBERS` | `false` |
//! | `EXCLUDE_PUNCTUATION` | `false` |
//! | `EXCLUDE_UPPERCASE` | `false` |
//! | `EXCLUDE_LOWERCASE` | `false` |
//! | `REQUIRE_EACH_INCLUDED_TYPE` | `true` |
//! | `CLUSTER_ENDPOINT_MARKER` | `cluster` |
//!
//! Boolean variables are true for `true`, `1`, `y` or `yes` (any case) and
//! false for anything else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters the generated password must never contain by default.
/// They break connection URIs or shell quoting.
pub const DEFAULT_EXCLUDE_CHARACTERS: &str = ":/@\"'\\";

/// Default generated password length
pub const DEFAULT_PASSWORD_LENGTH: u32 = 32;

/// Upper bound accepted by the store's generator
pub const MAX_PASSWORD_LENGTH: u32 = 4096;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable is set but cannot be used
    #[error("Invalid value for {variable}: {reason}")]
    InvalidValue { variable: String, reason: String },
}

/// Parameters handed to the store's password generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub length: u32,
    pub exclude_characters: String,
    pub exclude_numbers: bool,
    pub exclude_punctuation: bool,
    pub exclude_uppercase: bool,
    pub exclude_lowercase: bool,
    pub require_each_included_type: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            exclude_characters: DEFAULT_EXCLUDE_CHARACTERS.to_string(),
            exclude_numbers: false,
            exclude_punctuation: false,
            exclude_uppercase: false,
            exclude_lowercase: false,
            require_each_included_type: true,
        }
    }
}

/// Replica-validation heuristics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Substring of the second host label that marks a cluster-level endpoint
    pub cluster_endpoint_marker: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            cluster_endpoint_marker: "cluster".to_string(),
        }
    }
}

/// Complete rotation configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    pub password: PasswordPolicy,
    pub topology: TopologyConfig,
}

impl RotationConfig {
    /// Load from process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let password = &mut config.password;

        if let Some(raw) = lookup("PASSWORD_LENGTH") {
            password.length = parse_length(&raw)?;
        }
        if let Some(chars) = lookup("EXCLUDE_CHARACTERS") {
            password.exclude_characters = chars;
        }

        let flag = |key: &str, default: bool| lookup(key).map_or(default, |v| parse_flag(&v));
        password.exclude_numbers = flag("EXCLUDE_NUMBERS", password.exclude_numbers);
        password.exclude_punctuation = flag("EXCLUDE_PUNCTUATION", password.exclude_punctuation);
        password.exclude_uppercase = flag("EXCLUDE_UPPERCASE", password.exclude_uppercase);
        password.exclude_lowercase = flag("EXCLUDE_LOWERCASE", password.exclude_lowercase);
        password.require_each_included_type = flag(
            "REQUIRE_EACH_INCLUDED_TYPE",
            password.require_each_included_type,
        );

        if let Some(marker) = lookup("CLUSTER_ENDPOINT_MARKER") {
            if marker.is_empty() {
                return Err(ConfigError::InvalidValue {
                    variable: "CLUSTER_ENDPOINT_MARKER".into(),
                    reason: "must not be empty".into(),
                });
            }
            config.topology.cluster_endpoint_marker = marker;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "y" | "yes"
    )
}

fn parse_length(raw: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        variable: "PASSWORD_LENGTH".into(),
        reason,
    };
    let length = raw
        .trim()
        .parse::<u32>()
        .map_err(|e| invalid(format!("'{raw}': {e}")))?;
    if !(1..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(invalid(format!(
            "must be between 1 and {MAX_PASSWORD_LENGTH}, got {length}"
        )));
    }
    Ok(length)
}
