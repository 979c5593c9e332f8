//! Secret accessor
//!
//! Fetches one secret version and turns it into a validated
//! [`CredentialPayload`]. Master secrets created by the database service
//! itself contain nothing but `username` and `password`; their connection
//! parameters are looked up through the control plane using the linkage
//! tag the service attaches to the secret.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use crate::error::{RotationError, RotationResult};
use crate::payload::CredentialPayload;
use crate::stage::VersionStage;
use crate::store::SecretStore;
use crate::topology::Topology;

/// Tag linking a managed master secret to its database instance
pub const INSTANCE_LINK_TAG: &str = "aws:rds:primarydbinstancearn";

/// Tag linking a managed master secret to its database cluster
pub const CLUSTER_LINK_TAG: &str = "aws:rds:primarydbclusterarn";

/// Longest linkage ARN accepted
pub const MAX_LINK_ARN_LENGTH: usize = 256;

/// Which kind of secret is being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRole {
    /// The credential under rotation
    User,
    /// The administrative credential used to change it
    Master,
}

/// Database a managed master secret is linked to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLink {
    Instance(String),
    Cluster(String),
}

impl DatabaseLink {
    fn arn(&self) -> &str {
        match self {
            DatabaseLink::Instance(arn) | DatabaseLink::Cluster(arn) => arn,
        }
    }
}

/// Reads and validates secret versions
#[derive(Clone)]
pub struct SecretAccessor {
    store: Arc<dyn SecretStore>,
    topology: Arc<dyn Topology>,
}

impl std::fmt::Debug for SecretAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretAccessor").finish_non_exhaustive()
    }
}

impl SecretAccessor {
    pub fn new(store: Arc<dyn SecretStore>, topology: Arc<dyn Topology>) -> Self {
        Self { store, topology }
    }

    /// Fetch the version of `secret_id` holding `stage`, optionally pinned to
    /// `token`, and validate it.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(
        &self,
        secret_id: &str,
        stage: VersionStage,
        token: Option<&str>,
        role: SecretRole,
    ) -> RotationResult<CredentialPayload> {
        let raw = self
            .store
            .get_secret_value(secret_id, stage, token)
            .await?;

        let value: Value = serde_json::from_str(raw.expose_secret()).map_err(|e| {
            RotationError::MalformedSecret {
                secret_id: secret_id.to_string(),
                reason: format!("invalid JSON: {e}"),
            }
        })?;
        let Value::Object(mut fields) = value else {
            return Err(RotationError::MalformedSecret {
                secret_id: secret_id.to_string(),
                reason: "secret string is not a JSON object".to_string(),
            });
        };

        if role == SecretRole::Master && is_bare_credential(&fields) {
            if let Some(link) = self.database_link(secret_id).await? {
                self.enrich_from_topology(&mut fields, &link).await?;
                tracing::info!(
                    secret_id,
                    "Fetched connection parameters for master secret from control plane"
                );
            }
            // Without a link the required-field check below reports what is missing.
        }

        CredentialPayload::from_map(secret_id, fields)
    }

    /// Linkage tag of a managed master secret, if present.
    ///
    /// When several linkage tags are present the last one wins.
    async fn database_link(&self, secret_id: &str) -> RotationResult<Option<DatabaseLink>> {
        let metadata = self.store.describe_secret(secret_id).await?;

        let link = metadata
            .tags
            .iter()
            .rev()
            .find_map(|tag| match tag.key.to_ascii_lowercase().as_str() {
                INSTANCE_LINK_TAG => Some(DatabaseLink::Instance(tag.value.clone())),
                CLUSTER_LINK_TAG => Some(DatabaseLink::Cluster(tag.value.clone())),
                _ => None,
            });

        match &link {
            None => {
                tracing::warn!(
                    secret_id,
                    "Master secret has no database linkage tag; connection parameters must be in the secret"
                );
            }
            Some(link) if link.arn().len() > MAX_LINK_ARN_LENGTH => {
                return Err(RotationError::InvalidArn {
                    arn: link.arn().to_string(),
                    reason: format!("exceeds the maximum length of {MAX_LINK_ARN_LENGTH}"),
                });
            }
            Some(_) => {}
        }

        Ok(link)
    }

    async fn enrich_from_topology(
        &self,
        fields: &mut Map<String, Value>,
        link: &DatabaseLink,
    ) -> RotationResult<()> {
        let not_found = |kind: &str| RotationError::InvalidArn {
            arn: link.arn().to_string(),
            reason: format!("no {kind} found for it"),
        };

        let (endpoint, engine) = match link {
            DatabaseLink::Instance(arn) => {
                let instance = self
                    .topology
                    .describe_instance(arn)
                    .await?
                    .ok_or_else(|| not_found("DB instance"))?;
                (instance.endpoint, instance.engine)
            }
            DatabaseLink::Cluster(arn) => {
                let cluster = self
                    .topology
                    .describe_cluster(arn)
                    .await?
                    .ok_or_else(|| not_found("DB cluster"))?;
                (cluster.endpoint, cluster.engine)
            }
        };

        if let Some(endpoint) = endpoint {
            fields.insert("host".to_string(), Value::String(endpoint.host));
            fields.insert("port".to_string(), Value::from(endpoint.port));
        }
        if let Some(engine) = engine {
            fields.insert("engine".to_string(), Value::String(engine));
        }
        Ok(())
    }
}

/// Exactly `{username, password}` and nothing else
fn is_bare_credential(fields: &Map<String, Value>) -> bool {
    fields.len() == 2 && fields.contains_key("username") && fields.contains_key("password")
}
