//! Control-plane topology and replica validation
//!
//! The set step must never apply a password change through an endpoint that
//! is not the master's own database. A child secret may legitimately point
//! at a read replica of the master though, so "different host" alone is not
//! enough to refuse: [`ReplicaResolver::is_replica`] decides whether the
//! child's host is a replica of the master's database.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TopologyConfig;
use crate::error::RotationResult;
use crate::payload::CredentialPayload;

/// Host / port pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Result of `describeInstance`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub endpoint: Option<Endpoint>,
    pub engine: Option<String>,
    /// Set when the instance is a read replica
    pub read_replica_source_id: Option<String>,
    /// Set when the instance belongs to a cluster
    pub cluster_id: Option<String>,
}

/// One instance of a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    pub instance_id: String,
    pub is_writer: bool,
}

/// Result of `describeCluster`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    pub cluster_id: String,
    /// Writer endpoint
    pub endpoint: Option<Endpoint>,
    pub engine: Option<String>,
    pub reader_endpoint: Option<String>,
    pub members: Vec<ClusterMember>,
}

/// Database topology metadata
///
/// Identifiers may be bare identifiers or ARNs. A resource that does not
/// exist is `Ok(None)`, not an error.
#[async_trait]
pub trait Topology: Send + Sync {
    async fn describe_instance(&self, id: &str) -> RotationResult<Option<InstanceInfo>>;

    async fn describe_cluster(&self, id: &str) -> RotationResult<Option<ClusterInfo>>;
}

/// Kind of endpoint a master host names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Cluster-level (writer / reader / custom) endpoint
    Cluster,
    /// Endpoint of a single instance
    Instance,
}

impl EndpointKind {
    /// Classify `host` by its second DNS label.
    ///
    /// Hosts with fewer than two labels are treated as instance endpoints.
    pub fn classify(host: &str, cluster_marker: &str) -> Self {
        match host.split('.').nth(1) {
            Some(label) if label.contains(cluster_marker) => EndpointKind::Cluster,
            _ => EndpointKind::Instance,
        }
    }
}

/// Instance (or cluster) identifier encoded in the first label of a host
pub fn instance_id_of(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

/// Decides whether a child credential's database is a replica of the master's
#[derive(Clone)]
pub struct ReplicaResolver {
    topology: Arc<dyn Topology>,
    config: TopologyConfig,
}

impl std::fmt::Debug for ReplicaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaResolver")
            .field("config", &self.config)
            .finish()
    }
}

/// Reader endpoint and members of the master's cluster
struct ReplicaSet {
    reader_endpoint: String,
    members: Vec<ClusterMember>,
}

impl ReplicaResolver {
    pub fn new(topology: Arc<dyn Topology>, config: TopologyConfig) -> Self {
        Self { topology, config }
    }

    /// `true` when `candidate.host` is a read replica of `master`'s database.
    ///
    /// Anything that cannot be resolved counts as "not a replica".
    pub async fn is_replica(
        &self,
        candidate: &CredentialPayload,
        master: &CredentialPayload,
    ) -> RotationResult<bool> {
        let candidate_id = instance_id_of(&candidate.host);
        let master_id = instance_id_of(&master.host);

        if !master.engine.is_clustered() {
            let Some(instance) = self.topology.describe_instance(candidate_id).await? else {
                return Ok(false);
            };
            return Ok(instance.read_replica_source_id.as_deref() == Some(master_id));
        }

        let Some(replicas) = self.cluster_of(&master.host).await? else {
            return Ok(false);
        };
        let is_reader_endpoint = candidate.host == replicas.reader_endpoint;
        let is_reader_instance = replicas
            .members
            .iter()
            .any(|m| m.instance_id == candidate_id && !m.is_writer);
        Ok(is_reader_endpoint || is_reader_instance)
    }

    async fn cluster_of(&self, master_host: &str) -> RotationResult<Option<ReplicaSet>> {
        let master_id = instance_id_of(master_host);

        let cluster = match EndpointKind::classify(master_host, &self.config.cluster_endpoint_marker)
        {
            EndpointKind::Cluster => self.topology.describe_cluster(master_id).await?,
            EndpointKind::Instance => {
                let cluster_id = self
                    .topology
                    .describe_instance(master_id)
                    .await?
                    .and_then(|instance| instance.cluster_id);
                match cluster_id {
                    Some(id) => self.topology.describe_cluster(&id).await?,
                    None => None,
                }
            }
        };

        Ok(cluster.map(|cluster| ReplicaSet {
            reader_endpoint: cluster.reader_endpoint.unwrap_or_default(),
            members: cluster.members,
        }))
    }
}
