//! Rotation entry point
//!
//! [`RotationCoordinator::handle`] checks that the requested version is
//! legitimately mid-rotation before any step runs:
//!
//! 1. rotation must not be disabled on the secret
//! 2. the token must carry at least one stage
//! 3. a token already staged `AWSCURRENT` finishes immediately
//! 4. otherwise the token must be staged `AWSPENDING`
//!
//! Only then is the step name parsed and dispatched.

use std::sync::Arc;

use crate::config::RotationConfig;
use crate::db::DatabaseClient;
use crate::error::{RotationError, RotationResult};
use crate::stage::{RotationRequest, RotationStep, VersionStage};
use crate::steps::RotationSteps;
use crate::store::SecretStore;
use crate::topology::Topology;

/// What [`RotationCoordinator::handle`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The step ran to completion
    Completed(RotationStep),
    /// The version was already `AWSCURRENT`; nothing to do
    AlreadyCurrent,
}

#[derive(Debug, Clone)]
pub struct RotationCoordinator {
    steps: RotationSteps,
}

impl RotationCoordinator {
    pub fn new(
        store: Arc<dyn SecretStore>,
        topology: Arc<dyn Topology>,
        database: Arc<dyn DatabaseClient>,
        config: RotationConfig,
    ) -> Self {
        Self {
            steps: RotationSteps::new(store, topology, database, config),
        }
    }

    /// Direct access to the step implementations, bypassing the guards
    pub fn steps(&self) -> &RotationSteps {
        &self.steps
    }

    #[tracing::instrument(
        skip(self, request),
        fields(secret_id = %request.secret_id, token = %request.token, step = %request.step)
    )]
    pub async fn handle(&self, request: &RotationRequest) -> RotationResult<Outcome> {
        let secret_id = request.secret_id.as_str();
        let token = request.token.as_str();

        let metadata = self.steps.store().describe_secret(secret_id).await?;
        if !metadata.rotation_allowed() {
            tracing::error!(secret_id, "Secret is not enabled for rotation");
            return Err(RotationError::NotEligible {
                secret_id: secret_id.to_string(),
            });
        }

        let stages = metadata.version_stages;
        if stages.stages_of(token).is_none_or(<[String]>::is_empty) {
            tracing::error!(secret_id, token, "Secret version has no stage for rotation");
            return Err(RotationError::UnknownVersion {
                secret_id: secret_id.to_string(),
                token: token.to_string(),
            });
        }
        if stages.has_stage(token, VersionStage::Current) {
            tracing::info!(secret_id, token, "Secret version already set as AWSCURRENT");
            return Ok(Outcome::AlreadyCurrent);
        }
        if !stages.has_stage(token, VersionStage::Pending) {
            tracing::error!(secret_id, token, "Secret version not set as AWSPENDING for rotation");
            return Err(RotationError::InvalidStage {
                secret_id: secret_id.to_string(),
                token: token.to_string(),
            });
        }

        let step: RotationStep = request.step.parse().map_err(|_| RotationError::InvalidStep {
            secret_id: secret_id.to_string(),
            step: request.step.clone(),
        })?;

        match self.steps.run(step, secret_id, token).await {
            Ok(()) => Ok(Outcome::Completed(step)),
            Err(err) => {
                tracing::error!(error = %err, error.kind = err.kind(), "Rotation step failed");
                Err(err)
            }
        }
    }
}
