//! The four rotation steps
//!
//! Each step is independently invocable and safe to re-run. No state is
//! shared between steps except what the secret store records:
//!
//! 1. **create**: derive the alternate username, generate a password and
//!    store them as the `AWSPENDING` version (no-op if it already exists).
//! 2. **set**: prove the current credential works, check that pending is
//!    the alternate of current on the same host, then log in as master and
//!    create the pending role (cloning current's privileges) or reset its
//!    password.
//! 3. **test**: log in with the pending credential.
//! 4. **finish**: move `AWSCURRENT` to the pending version in one call.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::accessor::{SecretAccessor, SecretRole};
use crate::config::{PasswordPolicy, RotationConfig};
use crate::connection::ConnectionStrategy;
use crate::db::{DatabaseClient, Session};
use crate::error::{RotationError, RotationResult};
use crate::payload::CredentialPayload;
use crate::stage::{RotationStep, VersionStage};
use crate::store::SecretStore;
use crate::topology::{ReplicaResolver, Topology};
use crate::username::alternate;

const ROLE_EXISTS_QUERY: &str = "SELECT 1 FROM pg_roles WHERE rolname = $1";
const LIVENESS_QUERY: &str = "SELECT NOW()";

/// Step implementations wired to their collaborators
#[derive(Clone)]
pub struct RotationSteps {
    store: Arc<dyn SecretStore>,
    accessor: SecretAccessor,
    connections: ConnectionStrategy,
    replicas: ReplicaResolver,
    password_policy: PasswordPolicy,
}

impl std::fmt::Debug for RotationSteps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationSteps")
            .field("replicas", &self.replicas)
            .field("password_policy", &self.password_policy)
            .finish_non_exhaustive()
    }
}

impl RotationSteps {
    pub fn new(
        store: Arc<dyn SecretStore>,
        topology: Arc<dyn Topology>,
        database: Arc<dyn DatabaseClient>,
        config: RotationConfig,
    ) -> Self {
        Self {
            accessor: SecretAccessor::new(Arc::clone(&store), Arc::clone(&topology)),
            connections: ConnectionStrategy::new(database),
            replicas: ReplicaResolver::new(topology, config.topology),
            password_policy: config.password,
            store,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Run one step against `token`
    pub async fn run(&self, step: RotationStep, secret_id: &str, token: &str) -> RotationResult<()> {
        match step {
            RotationStep::Create => self.create(secret_id, token).await,
            RotationStep::Set => self.set(secret_id, token).await,
            RotationStep::Test => self.test(secret_id, token).await,
            RotationStep::Finish => self.finish(secret_id, token).await,
        }
    }

    /// Generate the pending version unless it already exists.
    #[tracing::instrument(skip(self), fields(step = "create"))]
    pub async fn create(&self, secret_id: &str, token: &str) -> RotationResult<()> {
        let current = self
            .accessor
            .fetch(secret_id, VersionStage::Current, None, SecretRole::User)
            .await?;

        match self
            .accessor
            .fetch(secret_id, VersionStage::Pending, Some(token), SecretRole::User)
            .await
        {
            Ok(_) => {
                tracing::info!(secret_id, "createSecret: Successfully retrieved secret");
                return Ok(());
            }
            Err(RotationError::SecretNotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        let username = alternate(&current.username)?;
        let password = self
            .store
            .generate_random_password(&self.password_policy)
            .await?;
        let pending = current.with_credentials(username, password);

        self.store
            .put_secret_value(
                secret_id,
                token,
                &pending.to_secret_string(),
                &[VersionStage::Pending],
            )
            .await?;

        tracing::info!(
            secret_id,
            token,
            user = %pending.username,
            "createSecret: Successfully put secret"
        );
        Ok(())
    }

    /// Apply the pending credential to the database as master.
    #[tracing::instrument(skip(self), fields(step = "set"))]
    pub async fn set(&self, secret_id: &str, token: &str) -> RotationResult<()> {
        let current = self
            .accessor
            .fetch(secret_id, VersionStage::Current, None, SecretRole::User)
            .await?;
        let pending = self
            .accessor
            .fetch(secret_id, VersionStage::Pending, Some(token), SecretRole::User)
            .await?;

        // The credential being rotated must itself be valid; a forged pending
        // version must not be able to borrow the master's privileges.
        let session = self.connections.connect(&current).await?;
        release(Ok(()), session.close().await)?;

        let expected = alternate(&current.username)?;
        if pending.username != expected {
            return Err(RotationError::StateMismatch {
                secret_id: secret_id.to_string(),
                reason: format!(
                    "attempting to modify user {} other than current user or clone {}",
                    pending.username, current.username
                ),
            });
        }
        if pending.host != current.host {
            return Err(RotationError::StateMismatch {
                secret_id: secret_id.to_string(),
                reason: format!(
                    "attempting to modify user for host {} other than current host {}",
                    pending.host, current.host
                ),
            });
        }

        let master_arn = current
            .master_arn
            .as_deref()
            .ok_or_else(|| RotationError::missing_field("masterarn"))?;
        let master = self
            .accessor
            .fetch(master_arn, VersionStage::Current, None, SecretRole::Master)
            .await?
            .with_dbname(current.dbname.clone());

        if current.host != master.host && !self.replicas.is_replica(&current, &master).await? {
            return Err(RotationError::TopologyMismatch {
                current_host: current.host.clone(),
                master_host: master.host.clone(),
            });
        }

        let mut session = self.connections.connect(&master).await?;
        let applied = apply_pending_role(session.as_mut(), &current, &pending).await;
        release(applied, session.close().await)?;

        tracing::info!(
            secret_id,
            user = %pending.username,
            "setSecret: Successfully set password in PostgreSQL DB"
        );
        Ok(())
    }

    /// Log in with the pending credential.
    #[tracing::instrument(skip(self), fields(step = "test"))]
    pub async fn test(&self, secret_id: &str, token: &str) -> RotationResult<()> {
        let pending = self
            .accessor
            .fetch(secret_id, VersionStage::Pending, Some(token), SecretRole::User)
            .await?;

        let mut session = self
            .connections
            .connect(&pending)
            .await
            .map_err(|err| match err {
                RotationError::ConnectionFailed { reason, .. } => {
                    RotationError::CredentialNotUsable {
                        secret_id: secret_id.to_string(),
                        reason,
                    }
                }
                other => other,
            })?;

        // Engine-specific permission checks belong here.
        let checked = check_liveness(session.as_mut()).await;
        release(checked, session.close().await)?;

        tracing::info!(
            secret_id,
            "testSecret: Successfully signed into PostgreSQL DB with AWSPENDING secret"
        );
        Ok(())
    }

    /// Promote the pending version to current.
    #[tracing::instrument(skip(self), fields(step = "finish"))]
    pub async fn finish(&self, secret_id: &str, token: &str) -> RotationResult<()> {
        let metadata = self.store.describe_secret(secret_id).await?;
        let current_version = metadata.version_stages.version_with(VersionStage::Current);

        if current_version == Some(token) {
            tracing::info!(
                secret_id,
                token,
                "finishSecret: Version already marked as AWSCURRENT"
            );
            return Ok(());
        }

        self.store
            .update_version_stage(secret_id, VersionStage::Current, token, current_version)
            .await?;

        tracing::info!(
            secret_id,
            token,
            previous = ?current_version,
            "finishSecret: Successfully set AWSCURRENT stage to version"
        );
        Ok(())
    }
}

/// Create the pending role with current's privileges, or reset its password.
/// Commits on success; the caller closes the session either way.
async fn apply_pending_role(
    session: &mut dyn Session,
    current: &CredentialPayload,
    pending: &CredentialPayload,
) -> RotationResult<()> {
    let pending_role = session.quote_ident(&pending.username).await?;
    let current_role = session.quote_ident(&current.username).await?;
    let password = session.quote_literal(pending.password()).await?;

    let exists = session
        .exists(ROLE_EXISTS_QUERY, &[pending.username.as_str()])
        .await?;

    if exists {
        session
            .execute(
                &format!(
                    "ALTER USER {pending_role} WITH PASSWORD {}",
                    password.expose_secret()
                ),
                &[],
            )
            .await?;
    } else {
        session
            .execute(
                &format!(
                    "CREATE ROLE {pending_role} WITH LOGIN PASSWORD {}",
                    password.expose_secret()
                ),
                &[],
            )
            .await?;
        session
            .execute(&format!("GRANT {current_role} TO {pending_role}"), &[])
            .await?;
    }

    session.commit().await
}

async fn check_liveness(session: &mut dyn Session) -> RotationResult<()> {
    session.execute(LIVENESS_QUERY, &[]).await?;
    session.commit().await
}

/// Combine the outcome of a session's work with the outcome of closing it.
///
/// The work's error wins. A close failure after committed work is logged
/// and does not fail the step.
fn release<T>(outcome: RotationResult<T>, closed: RotationResult<()>) -> RotationResult<T> {
    if let Err(close_err) = closed {
        tracing::warn!(error = %close_err, "Failed to close database session");
    }
    outcome
}
