//! Version stages, step names and the per-invocation request
//!
//! The secret store's stage labels are the only rotation state that survives
//! between invocations:
//!
//! ```text
//!  create ──► set ──► test ──► finish
//!  PENDING    PENDING  PENDING  PENDING → CURRENT, old CURRENT → PREVIOUS
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stage label attached to a secret version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionStage {
    /// Credential in active use
    #[serde(rename = "AWSCURRENT")]
    Current,

    /// Candidate credential being prepared
    #[serde(rename = "AWSPENDING")]
    Pending,

    /// Credential displaced by the last successful rotation
    #[serde(rename = "AWSPREVIOUS")]
    Previous,
}

impl VersionStage {
    /// Wire label as used by the secret store
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStage::Current => "AWSCURRENT",
            VersionStage::Pending => "AWSPENDING",
            VersionStage::Previous => "AWSPREVIOUS",
        }
    }
}

impl fmt::Display for VersionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version id → stage labels, as reported by `describeSecret`
///
/// Labels the store uses for other purposes are kept as raw strings so that
/// nothing reported by the store is silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionStages(HashMap<String, Vec<String>>);

impl VersionStages {
    pub fn new(map: HashMap<String, Vec<String>>) -> Self {
        Self(map)
    }

    /// Stage labels of a version, `None` if the version is unknown
    pub fn stages_of(&self, version_id: &str) -> Option<&[String]> {
        self.0.get(version_id).map(Vec::as_slice)
    }

    /// Whether `version_id` currently carries `stage`
    pub fn has_stage(&self, version_id: &str, stage: VersionStage) -> bool {
        self.stages_of(version_id)
            .is_some_and(|labels| labels.iter().any(|l| l == stage.as_str()))
    }

    /// The version holding `stage`, if any
    pub fn version_with(&self, stage: VersionStage) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| l == stage.as_str()))
            .map(|(id, _)| id.as_str())
    }
}

/// One of the four rotation steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStep {
    /// Generate the pending version
    Create,
    /// Apply the pending credential to the database
    Set,
    /// Log in with the pending credential
    Test,
    /// Promote pending to current
    Finish,
}

impl RotationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStep::Create => "create",
            RotationStep::Set => "set",
            RotationStep::Test => "test",
            RotationStep::Finish => "finish",
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised step name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStep(pub String);

impl fmt::Display for UnknownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown rotation step '{}'", self.0)
    }
}

impl std::error::Error for UnknownStep {}

impl FromStr for RotationStep {
    type Err = UnknownStep;

    /// Accepts both the short names and the store's event names
    /// (`createSecret`, `setSecret`, `testSecret`, `finishSecret`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" | "createSecret" => Ok(RotationStep::Create),
            "set" | "setSecret" => Ok(RotationStep::Set),
            "test" | "testSecret" => Ok(RotationStep::Test),
            "finish" | "finishSecret" => Ok(RotationStep::Finish),
            other => Err(UnknownStep(other.to_string())),
        }
    }
}

/// The unit of work for one invocation
///
/// `step` stays a raw string until the coordinator has checked the version
/// staging, so that an already-finished rotation short-circuits even for a
/// garbage step name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRequest {
    #[serde(rename = "SecretId")]
    pub secret_id: String,
    #[serde(rename = "ClientRequestToken")]
    pub token: String,
    #[serde(rename = "Step")]
    pub step: String,
}

impl RotationRequest {
    pub fn new(
        secret_id: impl Into<String>,
        token: impl Into<String>,
        step: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            token: token.into(),
            step: step.into(),
        }
    }
}
