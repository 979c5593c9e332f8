//! Secrets Manager store and RDS topology
//!
//! # Configuration
//!
//! ```rust,ignore
//! use pgrotate_rotation::aws::{AwsConfig, RdsTopology, SecretsManagerStore};
//!
//! let sdk = AwsConfig {
//!     region: Some("us-east-1".into()),
//!     endpoint_url: Some("http://localhost:4566".into()),
//! }
//! .load()
//! .await;
//!
//! let store = SecretsManagerStore::new(&sdk);
//! let topology = RdsTopology::new(&sdk);
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_rds::Client as RdsClient;
use aws_sdk_rds::types::{DbCluster, DbInstance};
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use aws_sdk_secretsmanager::types::Tag;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::PasswordPolicy;
use crate::error::{RotationError, RotationResult};
use crate::payload::DEFAULT_PORT;
use crate::stage::{VersionStage, VersionStages};
use crate::store::{SecretMetadata, SecretStore, SecretTag};
use crate::topology::{ClusterInfo, ClusterMember, Endpoint, InstanceInfo, Topology};

/// SDK settings shared by both clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    /// AWS region (auto-detected from the environment if `None`)
    pub region: Option<String>,

    /// Custom endpoint URL, e.g. LocalStack at `http://localhost:4566`
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    /// Resolve credentials and region through the default provider chain
    pub async fn load(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        tracing::info!(
            region = ?sdk_config.region().map(ToString::to_string),
            endpoint = ?self.endpoint_url,
            "Loaded AWS SDK configuration"
        );
        sdk_config
    }
}

/// [`SecretStore`] backed by AWS Secrets Manager
#[derive(Clone)]
pub struct SecretsManagerStore {
    client: SecretsManagerClient,
}

impl std::fmt::Debug for SecretsManagerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManagerStore").finish_non_exhaustive()
    }
}

impl SecretsManagerStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: SecretsManagerClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    #[tracing::instrument(skip(self), fields(provider = "AWS"))]
    async fn describe_secret(&self, secret_id: &str) -> RotationResult<SecretMetadata> {
        let output = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| RotationError::secret_store("DescribeSecret", e.into_service_error()))?;

        Ok(SecretMetadata {
            rotation_enabled: output.rotation_enabled(),
            version_stages: stages_from_aws(output.version_ids_to_stages()),
            tags: tags_from_aws(output.tags()),
        })
    }

    #[tracing::instrument(skip(self), fields(provider = "AWS"))]
    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> RotationResult<SecretString> {
        let result = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let err = e.into_service_error();
                if err.is_resource_not_found_exception() {
                    return Err(RotationError::SecretNotFound {
                        secret_id: secret_id.to_string(),
                        stage: stage.to_string(),
                    });
                }
                return Err(RotationError::secret_store("GetSecretValue", err));
            }
        };

        output
            .secret_string()
            .map(|s| SecretString::from(s.to_string()))
            .ok_or_else(|| RotationError::MalformedSecret {
                secret_id: secret_id.to_string(),
                reason: "secret does not contain string data".to_string(),
            })
    }

    #[tracing::instrument(skip(self, secret_string), fields(provider = "AWS"))]
    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &SecretString,
        stages: &[VersionStage],
    ) -> RotationResult<()> {
        self.client
            .put_secret_value()
            .secret_id(secret_id)
            .client_request_token(version_id)
            .secret_string(secret_string.expose_secret())
            .set_version_stages(Some(
                stages.iter().map(|s| s.as_str().to_string()).collect(),
            ))
            .send()
            .await
            .map_err(|e| RotationError::secret_store("PutSecretValue", e.into_service_error()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(provider = "AWS"))]
    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> RotationResult<()> {
        self.client
            .update_secret_version_stage()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .move_to_version_id(move_to)
            .set_remove_from_version_id(remove_from.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                RotationError::secret_store("UpdateSecretVersionStage", e.into_service_error())
            })?;
        Ok(())
    }

    #[tracing::instrument(skip(self, policy), fields(provider = "AWS", length = policy.length))]
    async fn generate_random_password(
        &self,
        policy: &PasswordPolicy,
    ) -> RotationResult<SecretString> {
        let exclude_characters =
            Some(policy.exclude_characters.clone()).filter(|chars| !chars.is_empty());

        let output = self
            .client
            .get_random_password()
            .password_length(i64::from(policy.length))
            .set_exclude_characters(exclude_characters)
            .exclude_numbers(policy.exclude_numbers)
            .exclude_punctuation(policy.exclude_punctuation)
            .exclude_uppercase(policy.exclude_uppercase)
            .exclude_lowercase(policy.exclude_lowercase)
            .require_each_included_type(policy.require_each_included_type)
            .send()
            .await
            .map_err(|e| RotationError::secret_store("GetRandomPassword", e.into_service_error()))?;

        output
            .random_password()
            .map(|p| SecretString::from(p.to_string()))
            .ok_or_else(|| {
                RotationError::secret_store("GetRandomPassword", "response carried no password")
            })
    }
}

fn stages_from_aws(stages: Option<&HashMap<String, Vec<String>>>) -> VersionStages {
    VersionStages::new(stages.cloned().unwrap_or_default())
}

fn tags_from_aws(tags: &[Tag]) -> Vec<SecretTag> {
    tags.iter()
        .filter_map(|tag| Some(SecretTag::new(tag.key()?, tag.value().unwrap_or_default())))
        .collect()
}

/// [`Topology`] backed by the RDS control-plane API
#[derive(Clone)]
pub struct RdsTopology {
    client: RdsClient,
}

impl std::fmt::Debug for RdsTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdsTopology").finish_non_exhaustive()
    }
}

impl RdsTopology {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: RdsClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl Topology for RdsTopology {
    #[tracing::instrument(skip(self), fields(provider = "AWS"))]
    async fn describe_instance(&self, id: &str) -> RotationResult<Option<InstanceInfo>> {
        let result = self
            .client
            .describe_db_instances()
            .db_instance_identifier(id)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.db_instances().first().map(instance_info)),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_db_instance_not_found_fault() {
                    tracing::debug!(id, "DB instance not found");
                    Ok(None)
                } else {
                    Err(RotationError::control_plane("DescribeDBInstances", err))
                }
            }
        }
    }

    #[tracing::instrument(skip(self), fields(provider = "AWS"))]
    async fn describe_cluster(&self, id: &str) -> RotationResult<Option<ClusterInfo>> {
        let result = self
            .client
            .describe_db_clusters()
            .db_cluster_identifier(id)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.db_clusters().first().map(cluster_info)),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_db_cluster_not_found_fault() {
                    tracing::debug!(id, "DB cluster not found");
                    Ok(None)
                } else {
                    Err(RotationError::control_plane("DescribeDBClusters", err))
                }
            }
        }
    }
}

fn endpoint_of(address: Option<&str>, port: Option<i32>) -> Option<Endpoint> {
    Some(Endpoint {
        host: address?.to_string(),
        port: port
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT),
    })
}

fn instance_info(instance: &DbInstance) -> InstanceInfo {
    let endpoint = instance
        .endpoint()
        .and_then(|e| endpoint_of(e.address(), e.port()));

    InstanceInfo {
        instance_id: instance
            .db_instance_identifier()
            .unwrap_or_default()
            .to_string(),
        endpoint,
        engine: instance.engine().map(str::to_string),
        read_replica_source_id: instance
            .read_replica_source_db_instance_identifier()
            .map(str::to_string),
        cluster_id: instance.db_cluster_identifier().map(str::to_string),
    }
}

fn cluster_info(cluster: &DbCluster) -> ClusterInfo {
    ClusterInfo {
        cluster_id: cluster.db_cluster_identifier().unwrap_or_default().to_string(),
        endpoint: endpoint_of(cluster.endpoint(), cluster.port()),
        engine: cluster.engine().map(str::to_string),
        reader_endpoint: cluster.reader_endpoint().map(str::to_string),
        members: cluster
            .db_cluster_members()
            .iter()
            .filter_map(|member| {
                Some(ClusterMember {
                    instance_id: member.db_instance_identifier()?.to_string(),
                    is_writer: member.is_cluster_writer().unwrap_or(false),
                })
            })
            .collect(),
    }
}
