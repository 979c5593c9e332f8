//! In-memory collaborators for driving rotations without AWS or PostgreSQL

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pgrotate_rotation::config::{PasswordPolicy, RotationConfig};
use pgrotate_rotation::coordinator::RotationCoordinator;
use pgrotate_rotation::db::{ConnectParams, DatabaseClient, Session, SslMode};
use pgrotate_rotation::error::{RotationError, RotationResult};
use pgrotate_rotation::stage::{VersionStage, VersionStages};
use pgrotate_rotation::store::{SecretMetadata, SecretStore, SecretTag};
use pgrotate_rotation::topology::{ClusterInfo, InstanceInfo, Topology};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

pub const SECRET: &str = "arn:aws:secretsmanager:us-east-1:123456789012:secret:app-AbCdEf";
pub const MASTER: &str = "arn:aws:secretsmanager:us-east-1:123456789012:secret:master-GhIjKl";
pub const TOKEN: &str = "c0ffee00-0000-4000-8000-000000000001";
pub const CURRENT_VERSION: &str = "c0ffee00-0000-4000-8000-000000000000";
pub const HOST: &str = "prod.abc123.us-east-1.rds.amazonaws.com";

// ── secret store ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct FakeVersion {
    id: String,
    stages: Vec<String>,
    payload: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct FakeSecret {
    rotation_enabled: Option<bool>,
    versions: Vec<FakeVersion>,
    tags: Vec<SecretTag>,
}

/// Versioned secret store with AWS-like stage bookkeeping
#[derive(Debug, Default)]
pub struct FakeStore {
    secrets: Mutex<HashMap<String, FakeSecret>>,
    generated: AtomicUsize,
    policies: Mutex<Vec<PasswordPolicy>>,
    stage_updates: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a secret whose only version is `AWSCURRENT`
    pub fn insert_secret(&self, secret_id: &str, version_id: &str, payload: Value) {
        let secret = FakeSecret {
            rotation_enabled: Some(true),
            versions: vec![FakeVersion {
                id: version_id.to_string(),
                stages: vec![VersionStage::Current.to_string()],
                payload: Some(payload.to_string()),
            }],
            tags: Vec::new(),
        };
        self.secrets
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), secret);
    }

    pub fn set_rotation_enabled(&self, secret_id: &str, enabled: Option<bool>) {
        self.with_secret(secret_id, |s| s.rotation_enabled = enabled);
    }

    pub fn add_tag(&self, secret_id: &str, key: &str, value: &str) {
        self.with_secret(secret_id, |s| s.tags.push(SecretTag::new(key, value)));
    }

    /// What the store does when rotation starts: label `token` pending
    /// without any payload.
    pub fn begin_rotation(&self, secret_id: &str, token: &str) {
        self.with_secret(secret_id, |s| {
            move_stage(s, VersionStage::Pending.as_str(), token);
        });
    }

    /// Attach a version with arbitrary stages, bypassing the create step
    pub fn insert_version(
        &self,
        secret_id: &str,
        version_id: &str,
        stages: &[&str],
        payload: Option<Value>,
    ) {
        self.with_secret(secret_id, |s| {
            s.versions.retain(|v| v.id != version_id);
            s.versions.push(FakeVersion {
                id: version_id.to_string(),
                stages: stages.iter().map(ToString::to_string).collect(),
                payload: payload.map(|p| p.to_string()),
            });
        });
    }

    /// Overwrite the payload of the version holding `stage`
    pub fn replace_payload(&self, secret_id: &str, stage: VersionStage, payload: Value) {
        self.with_secret(secret_id, |s| {
            if let Some(v) = s.versions.iter_mut().find(|v| has(v, stage.as_str())) {
                v.payload = Some(payload.to_string());
            }
        });
    }

    /// Decoded payload of the version holding `stage`
    pub fn payload(&self, secret_id: &str, stage: VersionStage) -> Option<Value> {
        let secrets = self.secrets.lock().unwrap();
        let version = secrets
            .get(secret_id)?
            .versions
            .iter()
            .find(|v| has(v, stage.as_str()))?;
        serde_json::from_str(version.payload.as_deref()?).ok()
    }

    /// Stage labels of one version, sorted
    pub fn stages_of(&self, secret_id: &str, version_id: &str) -> Vec<String> {
        let secrets = self.secrets.lock().unwrap();
        let mut stages = secrets
            .get(secret_id)
            .and_then(|s| s.versions.iter().find(|v| v.id == version_id))
            .map(|v| v.stages.clone())
            .unwrap_or_default();
        stages.sort();
        stages
    }

    /// Number of versions holding `stage`
    pub fn count_with(&self, secret_id: &str, stage: VersionStage) -> usize {
        let secrets = self.secrets.lock().unwrap();
        secrets.get(secret_id).map_or(0, |s| {
            s.versions
                .iter()
                .filter(|v| has(v, stage.as_str()))
                .count()
        })
    }

    pub fn generated_passwords(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    pub fn last_policy(&self) -> Option<PasswordPolicy> {
        self.policies.lock().unwrap().last().cloned()
    }

    pub fn stage_updates(&self) -> usize {
        self.stage_updates.load(Ordering::SeqCst)
    }

    fn with_secret(&self, secret_id: &str, f: impl FnOnce(&mut FakeSecret)) {
        let mut secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get_mut(secret_id)
            .unwrap_or_else(|| panic!("no secret {secret_id}"));
        f(secret);
    }
}

fn has(version: &FakeVersion, stage: &str) -> bool {
    version.stages.iter().any(|s| s == stage)
}

/// Attach `stage` to `version_id` (creating the version if needed), taking
/// it away from every other version.
fn move_stage(secret: &mut FakeSecret, stage: &str, version_id: &str) {
    for v in &mut secret.versions {
        v.stages.retain(|s| s != stage);
    }
    match secret.versions.iter_mut().find(|v| v.id == version_id) {
        Some(v) => v.stages.push(stage.to_string()),
        None => secret.versions.push(FakeVersion {
            id: version_id.to_string(),
            stages: vec![stage.to_string()],
            payload: None,
        }),
    }
}

fn store_error(operation: &str, reason: impl Into<String>) -> RotationError {
    RotationError::SecretStore {
        operation: operation.to_string(),
        reason: reason.into(),
    }
}

#[async_trait]
impl SecretStore for FakeStore {
    async fn describe_secret(&self, secret_id: &str) -> RotationResult<SecretMetadata> {
        let secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get(secret_id)
            .ok_or_else(|| store_error("DescribeSecret", "ResourceNotFoundException"))?;

        Ok(SecretMetadata {
            rotation_enabled: secret.rotation_enabled,
            version_stages: VersionStages::new(
                secret
                    .versions
                    .iter()
                    .filter(|v| !v.stages.is_empty())
                    .map(|v| (v.id.clone(), v.stages.clone()))
                    .collect(),
            ),
            tags: secret.tags.clone(),
        })
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> RotationResult<SecretString> {
        let not_found = || RotationError::SecretNotFound {
            secret_id: secret_id.to_string(),
            stage: stage.to_string(),
        };

        let secrets = self.secrets.lock().unwrap();
        let secret = secrets.get(secret_id).ok_or_else(not_found)?;
        secret
            .versions
            .iter()
            .find(|v| has(v, stage.as_str()) && version_id.is_none_or(|id| id == v.id))
            .and_then(|v| v.payload.clone())
            .map(SecretString::from)
            .ok_or_else(not_found)
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &SecretString,
        stages: &[VersionStage],
    ) -> RotationResult<()> {
        let mut secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get_mut(secret_id)
            .ok_or_else(|| store_error("PutSecretValue", "ResourceNotFoundException"))?;

        if let Some(existing) = secret
            .versions
            .iter()
            .find(|v| v.id == version_id)
            .and_then(|v| v.payload.as_deref())
        {
            if existing != secret_string.expose_secret() {
                return Err(store_error(
                    "PutSecretValue",
                    "ResourceExistsException: version already holds a different value",
                ));
            }
        }

        for stage in stages {
            move_stage(secret, stage.as_str(), version_id);
        }
        if let Some(v) = secret.versions.iter_mut().find(|v| v.id == version_id) {
            v.payload = Some(secret_string.expose_secret().to_string());
        }
        Ok(())
    }

    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> RotationResult<()> {
        self.stage_updates.fetch_add(1, Ordering::SeqCst);

        let mut secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get_mut(secret_id)
            .ok_or_else(|| store_error("UpdateSecretVersionStage", "ResourceNotFoundException"))?;

        let holder = secret
            .versions
            .iter()
            .find(|v| has(v, stage.as_str()))
            .map(|v| v.id.clone());
        if holder.is_some() && holder.as_deref() != remove_from && holder.as_deref() != Some(move_to)
        {
            return Err(store_error(
                "UpdateSecretVersionStage",
                "InvalidParameterException: stage is attached to a different version",
            ));
        }

        move_stage(secret, stage.as_str(), move_to);
        if stage == VersionStage::Current {
            if let Some(previous) = remove_from {
                move_stage(secret, VersionStage::Previous.as_str(), previous);
            }
        }
        Ok(())
    }

    async fn generate_random_password(
        &self,
        policy: &PasswordPolicy,
    ) -> RotationResult<SecretString> {
        let n = self.generated.fetch_add(1, Ordering::SeqCst);
        self.policies.lock().unwrap().push(policy.clone());

        let length = policy.length as usize;
        let mut password = format!("Gen{n}pw");
        while password.len() < length {
            password.push('x');
        }
        password.truncate(length);
        Ok(SecretString::from(password))
    }
}

// ── topology ───────────────────────────────────────────────────────────────

/// Control plane keyed by whatever identifier the caller passes
#[derive(Debug, Default)]
pub struct FakeTopology {
    instances: Mutex<HashMap<String, InstanceInfo>>,
    clusters: Mutex<HashMap<String, ClusterInfo>>,
}

impl FakeTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance(&self, key: &str, info: InstanceInfo) {
        self.instances
            .lock()
            .unwrap()
            .insert(key.to_string(), info);
    }

    pub fn add_cluster(&self, key: &str, info: ClusterInfo) {
        self.clusters.lock().unwrap().insert(key.to_string(), info);
    }
}

#[async_trait]
impl Topology for FakeTopology {
    async fn describe_instance(&self, id: &str) -> RotationResult<Option<InstanceInfo>> {
        Ok(self.instances.lock().unwrap().get(id).cloned())
    }

    async fn describe_cluster(&self, id: &str) -> RotationResult<Option<ClusterInfo>> {
        Ok(self.clusters.lock().unwrap().get(id).cloned())
    }
}

// ── database ───────────────────────────────────────────────────────────────

/// One connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub host: String,
    pub dbname: String,
    pub user: String,
    pub ssl_mode: SslMode,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct DbState {
    roles: HashMap<String, String>,
    memberships: HashSet<(String, String)>,
    reject_ssl: bool,
    unreachable_hosts: HashSet<String>,
    failing_statement: Option<String>,
    attempts: Vec<ConnectAttempt>,
    committed: Vec<String>,
    open_sessions: usize,
    closed_sessions: usize,
}

/// PostgreSQL server with password authentication and role bookkeeping
#[derive(Debug, Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<DbState>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_role(&self, name: &str, password: &str) {
        self.state
            .lock()
            .unwrap()
            .roles
            .insert(name.to_string(), password.to_string());
    }

    /// Refuse every `sslmode=require` connection
    pub fn reject_ssl(&self) {
        self.state.lock().unwrap().reject_ssl = true;
    }

    pub fn make_unreachable(&self, host: &str) {
        self.state
            .lock()
            .unwrap()
            .unreachable_hosts
            .insert(host.to_string());
    }

    /// Fail any statement starting with `prefix`
    pub fn fail_statement(&self, prefix: &str) {
        self.state.lock().unwrap().failing_statement = Some(prefix.to_string());
    }

    pub fn password_of(&self, role: &str) -> Option<String> {
        self.state.lock().unwrap().roles.get(role).cloned()
    }

    /// Whether `member` was granted membership in `role`
    pub fn is_member(&self, member: &str, role: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .memberships
            .contains(&(role.to_string(), member.to_string()))
    }

    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn committed(&self) -> Vec<String> {
        self.state.lock().unwrap().committed.clone()
    }

    /// Sessions opened but never closed
    pub fn leaked_sessions(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.open_sessions - state.closed_sessions
    }
}

#[async_trait]
impl DatabaseClient for FakeDatabase {
    async fn connect(&self, params: &ConnectParams) -> RotationResult<Box<dyn Session>> {
        let mut state = self.state.lock().unwrap();

        let refusal = if state.unreachable_hosts.contains(&params.host) {
            Some("could not connect to server: Connection timed out")
        } else if state.reject_ssl && params.ssl_mode == SslMode::Require {
            Some("server does not support SSL, but SSL was required")
        } else if state.roles.get(&params.username).map(String::as_str)
            != Some(params.password.expose_secret())
        {
            Some("password authentication failed")
        } else {
            None
        };

        state.attempts.push(ConnectAttempt {
            host: params.host.clone(),
            dbname: params.dbname.clone(),
            user: params.username.clone(),
            ssl_mode: params.ssl_mode,
            succeeded: refusal.is_none(),
        });

        if let Some(reason) = refusal {
            return Err(RotationError::ConnectionFailed {
                host: params.host.clone(),
                user: params.username.clone(),
                reason: reason.to_string(),
            });
        }

        state.open_sessions += 1;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<DbState>>,
    pending: Vec<String>,
}

fn unquote_ident(quoted: &str) -> String {
    quoted
        .trim_matches('"')
        .replace("\"\"", "\"")
}

fn unquote_literal(quoted: &str) -> String {
    quoted.trim_matches('\'').replace("''", "'")
}

impl FakeSession {
    fn apply(state: &mut DbState, statement: &str) {
        let words: Vec<&str> = statement.split_whitespace().collect();
        match words.as_slice() {
            ["CREATE", "ROLE", role, "WITH", "LOGIN", "PASSWORD", password] => {
                state
                    .roles
                    .insert(unquote_ident(role), unquote_literal(password));
            }
            ["ALTER", "USER", role, "WITH", "PASSWORD", password] => {
                state
                    .roles
                    .insert(unquote_ident(role), unquote_literal(password));
            }
            ["GRANT", role, "TO", member] => {
                state
                    .memberships
                    .insert((unquote_ident(role), unquote_ident(member)));
            }
            _ => {}
        }
        state.committed.push(statement.to_string());
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn quote_ident(&mut self, name: &str) -> RotationResult<String> {
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }

    async fn quote_literal(&mut self, value: &SecretString) -> RotationResult<SecretString> {
        Ok(SecretString::from(format!(
            "'{}'",
            value.expose_secret().replace('\'', "''")
        )))
    }

    async fn exists(&mut self, query: &str, params: &[&str]) -> RotationResult<bool> {
        assert!(query.contains("pg_roles"), "unexpected query {query}");
        let state = self.state.lock().unwrap();
        Ok(params.first().is_some_and(|role| state.roles.contains_key(*role)))
    }

    async fn execute(&mut self, statement: &str, _params: &[&str]) -> RotationResult<u64> {
        let failing = self.state.lock().unwrap().failing_statement.clone();
        if failing.is_some_and(|prefix| statement.starts_with(&prefix)) {
            return Err(RotationError::Database {
                operation: "execute".to_string(),
                reason: "permission denied to create role".to_string(),
            });
        }
        self.pending.push(statement.to_string());
        Ok(0)
    }

    async fn commit(&mut self) -> RotationResult<()> {
        let mut state = self.state.lock().unwrap();
        for statement in self.pending.drain(..) {
            Self::apply(&mut state, &statement);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> RotationResult<()> {
        self.state.lock().unwrap().closed_sessions += 1;
        Ok(())
    }
}

// ── fixtures ───────────────────────────────────────────────────────────────

pub fn current_payload() -> Value {
    json!({
        "engine": "postgres",
        "host": HOST,
        "port": 5432,
        "username": "app",
        "password": "app-password",
        "dbname": "orders",
        "masterarn": MASTER,
    })
}

pub fn master_payload() -> Value {
    json!({
        "engine": "postgres",
        "host": HOST,
        "port": 5432,
        "username": "master",
        "password": "master-password",
    })
}

/// Store, topology, database and a coordinator over them
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub topology: Arc<FakeTopology>,
    pub db: Arc<FakeDatabase>,
    pub coordinator: RotationCoordinator,
}

impl Harness {
    pub fn empty() -> Self {
        Self::with_config(RotationConfig::default())
    }

    pub fn with_config(config: RotationConfig) -> Self {
        let store = Arc::new(FakeStore::new());
        let topology = Arc::new(FakeTopology::new());
        let db = Arc::new(FakeDatabase::new());
        let coordinator = RotationCoordinator::new(
            Arc::clone(&store) as Arc<dyn SecretStore>,
            Arc::clone(&topology) as Arc<dyn Topology>,
            Arc::clone(&db) as Arc<dyn DatabaseClient>,
            config,
        );
        Self {
            store,
            topology,
            db,
            coordinator,
        }
    }

    /// `app` on [`HOST`] with master escalation, rotation started for [`TOKEN`]
    pub fn standard() -> Self {
        let harness = Self::empty();
        harness
            .store
            .insert_secret(SECRET, CURRENT_VERSION, current_payload());
        harness
            .store
            .insert_secret(MASTER, "master-v1", master_payload());
        harness.store.begin_rotation(SECRET, TOKEN);
        harness.db.add_role("app", "app-password");
        harness.db.add_role("master", "master-password");
        harness
    }

    pub async fn step(&self, step: &str) -> RotationResult<pgrotate_rotation::coordinator::Outcome> {
        let request = pgrotate_rotation::stage::RotationRequest::new(SECRET, TOKEN, step);
        self.coordinator.handle(&request).await
    }
}
