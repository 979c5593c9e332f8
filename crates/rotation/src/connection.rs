//! SSL-first connection strategy
//!
//! | `ssl` value                     | require SSL | fall back |
//! |---------------------------------|-------------|-----------|
//! | absent                          | yes         | yes       |
//! | `true` / `false`                | as given    | no        |
//! | `"true"` / `"false"` (any case) | as given    | no        |
//! | any other string or type        | yes         | yes       |

use std::sync::Arc;

use crate::db::{ConnectParams, DatabaseClient, Session, SslMode};
use crate::error::RotationResult;
use crate::payload::{CredentialPayload, SslSetting};

/// Resolved SSL behaviour for one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SslPolicy {
    pub require_ssl: bool,
    pub allow_fallback: bool,
}

impl SslPolicy {
    const UNSPECIFIED: SslPolicy = SslPolicy {
        require_ssl: true,
        allow_fallback: true,
    };

    pub fn from_setting(setting: Option<&SslSetting>) -> Self {
        match setting {
            None | Some(SslSetting::Unrecognized) => Self::UNSPECIFIED,
            Some(SslSetting::Flag(flag)) => Self::fixed(*flag),
            Some(SslSetting::Text(text)) => match text.to_ascii_lowercase().as_str() {
                "true" => Self::fixed(true),
                "false" => Self::fixed(false),
                _ => Self::UNSPECIFIED,
            },
        }
    }

    fn fixed(require_ssl: bool) -> Self {
        Self {
            require_ssl,
            allow_fallback: false,
        }
    }
}

fn ssl_mode(require_ssl: bool) -> SslMode {
    if require_ssl {
        SslMode::Require
    } else {
        SslMode::Prefer
    }
}

/// Connects with the payload's SSL policy, retrying once without SSL when
/// the policy allows it.
#[derive(Clone)]
pub struct ConnectionStrategy {
    client: Arc<dyn DatabaseClient>,
}

impl std::fmt::Debug for ConnectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStrategy").finish_non_exhaustive()
    }
}

impl ConnectionStrategy {
    pub fn new(client: Arc<dyn DatabaseClient>) -> Self {
        Self { client }
    }

    pub async fn connect(&self, payload: &CredentialPayload) -> RotationResult<Box<dyn Session>> {
        let policy = SslPolicy::from_setting(payload.ssl.as_ref());

        let first = self.attempt(payload, policy.require_ssl).await;
        match first {
            Err(err) if policy.allow_fallback && policy.require_ssl => {
                tracing::warn!(
                    host = %payload.host,
                    user = %payload.username,
                    error = %err,
                    "SSL/TLS connection failed, retrying without SSL/TLS"
                );
                self.attempt(payload, false).await
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        payload: &CredentialPayload,
        require_ssl: bool,
    ) -> RotationResult<Box<dyn Session>> {
        let params = ConnectParams::from_payload(payload, ssl_mode(require_ssl));
        match self.client.connect(&params).await {
            Ok(session) => {
                tracing::info!(
                    host = %params.host,
                    user = %params.username,
                    "Successfully established {} connection",
                    if require_ssl { "SSL/TLS" } else { "non SSL/TLS" }
                );
                Ok(session)
            }
            Err(err) => {
                tracing::error!(
                    host = %params.host,
                    user = %params.username,
                    error = %err,
                    "Unable to connect to PostgreSQL"
                );
                Err(err)
            }
        }
    }
}
