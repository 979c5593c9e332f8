//! Secret store collaborator
//!
//! The store owns all version / stage state. This crate only reads it and
//! requests mutations; nothing is cached across invocations.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::PasswordPolicy;
use crate::error::RotationResult;
use crate::stage::{VersionStage, VersionStages};

/// Tag attached to a secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretTag {
    pub key: String,
    pub value: String,
}

impl SecretTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of `describeSecret`
#[derive(Debug, Clone, Default)]
pub struct SecretMetadata {
    /// `None` when the store does not report the flag
    pub rotation_enabled: Option<bool>,
    pub version_stages: VersionStages,
    pub tags: Vec<SecretTag>,
}

impl SecretMetadata {
    /// Only an explicit `false` disables rotation
    pub fn rotation_allowed(&self) -> bool {
        self.rotation_enabled != Some(false)
    }
}

/// Versioned secret storage with stage labels
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stage map, rotation flag and tags of a secret
    async fn describe_secret(&self, secret_id: &str) -> RotationResult<SecretMetadata>;

    /// Secret string of the version holding `stage`.
    ///
    /// When `version_id` is given the version must also carry `stage`.
    /// Returns [`RotationError::SecretNotFound`] when no such version exists.
    ///
    /// [`RotationError::SecretNotFound`]: crate::RotationError::SecretNotFound
    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> RotationResult<SecretString>;

    /// Store a new version under `version_id` with the given stages
    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &SecretString,
        stages: &[VersionStage],
    ) -> RotationResult<()>;

    /// Move `stage` to `move_to`, removing it from `remove_from`, in one call
    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> RotationResult<()>;

    /// Generate a random password using the store's own generator
    async fn generate_random_password(&self, policy: &PasswordPolicy)
    -> RotationResult<SecretString>;
}
