//! Rotation error taxonomy
//!
//! Every failure terminates the current step invocation. Nothing is retried
//! here except the SSL fallback inside [`ConnectionStrategy`]; recovery is
//! the caller re-invoking the same step.
//!
//! [`ConnectionStrategy`]: crate::connection::ConnectionStrategy

use thiserror::Error;

/// Errors that can occur while running a rotation step
#[derive(Debug, Error)]
pub enum RotationError {
    // ── coordinator preconditions ──────────────────────────────────────────
    /// The secret has rotation explicitly disabled
    #[error("Secret {secret_id} is not enabled for rotation")]
    NotEligible { secret_id: String },

    /// The requested version token carries no stage at all
    #[error("Secret version {token} has no stage for rotation of secret {secret_id}")]
    UnknownVersion { secret_id: String, token: String },

    /// The requested version token is not staged as pending
    #[error("Secret version {token} not set as AWSPENDING for rotation of secret {secret_id}")]
    InvalidStage { secret_id: String, token: String },

    /// Step name was not one of create / set / test / finish
    #[error("Invalid step parameter {step} for secret {secret_id}")]
    InvalidStep { secret_id: String, step: String },

    // ── payload validation ─────────────────────────────────────────────────
    /// Secret string is not a JSON object, or a field has the wrong type
    #[error("Secret {secret_id} is malformed: {reason}")]
    MalformedSecret { secret_id: String, reason: String },

    /// A required key is absent from the secret JSON
    #[error("{field} key is missing from secret JSON")]
    MissingField { field: String },

    /// `engine` is not a supported PostgreSQL flavour
    #[error("Database engine must be set to 'postgres' or 'aurora-postgresql', got '{engine}'")]
    UnsupportedEngine { engine: String },

    /// Linkage ARN is too long or resolves to nothing
    #[error("{arn} is not a valid DB instance ARN: {reason}")]
    InvalidArn { arn: String, reason: String },

    // ── policy ─────────────────────────────────────────────────────────────
    /// Appending the clone suffix would exceed the identifier limit
    #[error(
        "Unable to clone user {username}, username length with _clone appended would exceed {limit} characters"
    )]
    UsernameTooLong { username: String, limit: usize },

    // ── connectivity ───────────────────────────────────────────────────────
    /// Could not open an authenticated session
    #[error("Unable to log into {host} as user '{user}': {reason}")]
    ConnectionFailed {
        host: String,
        user: String,
        reason: String,
    },

    /// The pending credential cannot log in
    #[error("Unable to log into database with pending secret of secret {secret_id}: {reason}")]
    CredentialNotUsable { secret_id: String, reason: String },

    // ── cross-version consistency ──────────────────────────────────────────
    /// Pending and current versions disagree on identity or host
    #[error("State mismatch for secret {secret_id}: {reason}")]
    StateMismatch { secret_id: String, reason: String },

    /// Current host is neither the master host nor one of its replicas
    #[error("Current database host {current_host} is not the same host as/rds replica of master {master_host}")]
    TopologyMismatch {
        current_host: String,
        master_host: String,
    },

    // ── collaborator failures ──────────────────────────────────────────────
    /// The store holds no version for the requested stage / token
    #[error("Secret {secret_id} has no version staged {stage}")]
    SecretNotFound { secret_id: String, stage: String },

    /// Any other secret store failure
    #[error("Secret store {operation} failed: {reason}")]
    SecretStore { operation: String, reason: String },

    /// Control-plane API failure (a missing resource is not a failure)
    #[error("Control plane {operation} failed: {reason}")]
    ControlPlane { operation: String, reason: String },

    /// A statement failed inside an open database session
    #[error("Database {operation} failed: {reason}")]
    Database { operation: String, reason: String },
}

impl RotationError {
    /// Short stable name, used as the `error.kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotEligible { .. } => "not_eligible",
            Self::UnknownVersion { .. } => "unknown_version",
            Self::InvalidStage { .. } => "invalid_stage",
            Self::InvalidStep { .. } => "invalid_step",
            Self::MalformedSecret { .. } => "malformed_secret",
            Self::MissingField { .. } => "missing_field",
            Self::UnsupportedEngine { .. } => "unsupported_engine",
            Self::InvalidArn { .. } => "invalid_arn",
            Self::UsernameTooLong { .. } => "username_too_long",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::CredentialNotUsable { .. } => "credential_not_usable",
            Self::StateMismatch { .. } => "state_mismatch",
            Self::TopologyMismatch { .. } => "topology_mismatch",
            Self::SecretNotFound { .. } => "secret_not_found",
            Self::SecretStore { .. } => "secret_store",
            Self::ControlPlane { .. } => "control_plane",
            Self::Database { .. } => "database",
        }
    }

    pub(crate) fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn secret_store(operation: &str, reason: impl ToString) -> Self {
        Self::SecretStore {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn control_plane(operation: &str, reason: impl ToString) -> Self {
        Self::ControlPlane {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn database(operation: &str, reason: impl ToString) -> Self {
        Self::Database {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for rotation operations
pub type RotationResult<T> = Result<T, RotationError>;
