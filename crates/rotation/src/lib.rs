//! PostgreSQL credential rotation
//!
//! Rotates a database credential held in a versioned secret store using the
//! alternating-users scheme: each rotation moves the live credential between
//! `name` and `name_clone`, so the credential being replaced keeps working
//! until the new one is promoted.
//!
//! # Features
//!
//! - **Four idempotent steps** - create, set, test and finish, each safe to re-run
//! - **Master escalation** - roles are changed through the master credential
//! - **Replica validation** - refuses to rotate through an unrelated host
//! - **SSL-first connections** - with a single non-SSL fallback when allowed
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pgrotate_rotation::prelude::*;
//!
//! let coordinator = RotationCoordinator::new(store, topology, database, RotationConfig::from_env()?);
//! coordinator
//!     .handle(&RotationRequest::new("arn:...:secret:app", token, "createSecret"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]

pub mod accessor;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod payload;
pub mod stage;
pub mod steps;
pub mod store;
pub mod topology;
pub mod username;

/// AWS Secrets Manager and RDS adapters
#[cfg(feature = "aws")]
pub mod aws;

/// PostgreSQL client adapter
#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::{RotationError, RotationResult};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::config::{PasswordPolicy, RotationConfig, TopologyConfig};
    pub use crate::coordinator::{Outcome, RotationCoordinator};
    pub use crate::db::{ConnectParams, DatabaseClient, Session, SslMode};
    pub use crate::error::{RotationError, RotationResult};
    pub use crate::payload::{CredentialPayload, Engine};
    pub use crate::stage::{RotationRequest, RotationStep, VersionStage, VersionStages};
    pub use crate::store::{SecretMetadata, SecretStore, SecretTag};
    pub use crate::topology::{ClusterInfo, ClusterMember, Endpoint, InstanceInfo, Topology};
    pub use async_trait::async_trait;
}
