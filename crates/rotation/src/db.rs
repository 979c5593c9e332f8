//! Database client collaborator
//!
//! Sessions are scoped: every caller closes the session it opened before
//! returning, on success and on failure. Closing a session with an
//! uncommitted transaction rolls it back.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::RotationResult;
use crate::payload::CredentialPayload;

/// libpq-style `sslmode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// Fail unless the connection is encrypted
    Require,
    /// Encrypt if the server supports it
    Prefer,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Require => "require",
            SslMode::Prefer => "prefer",
        }
    }
}

/// Everything needed to open one session
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: SecretString,
    pub ssl_mode: SslMode,
}

impl ConnectParams {
    /// Connection parameters for `payload`, with defaults applied
    pub fn from_payload(payload: &CredentialPayload, ssl_mode: SslMode) -> Self {
        Self {
            host: payload.host.clone(),
            port: payload.port_or_default(),
            dbname: payload.dbname_or_default().to_string(),
            username: payload.username.clone(),
            password: payload.password().clone(),
            ssl_mode,
        }
    }
}

/// Opens authenticated sessions
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Fails with [`RotationError::ConnectionFailed`] when the server cannot
    /// be reached or rejects the credentials.
    ///
    /// [`RotationError::ConnectionFailed`]: crate::RotationError::ConnectionFailed
    async fn connect(&self, params: &ConnectParams) -> RotationResult<Box<dyn Session>>;
}

/// An open, authenticated session
///
/// Statements run inside a transaction that starts implicitly with the first
/// statement and ends with [`commit`](Session::commit). Values are always
/// bound as parameters (`$1`, `$2`, ...); identifiers and literals that must
/// be spliced into utility statements go through the server's own quoting
/// functions.
#[async_trait]
pub trait Session: Send {
    /// `quote_ident(name)` evaluated by the server
    async fn quote_ident(&mut self, name: &str) -> RotationResult<String>;

    /// `quote_literal(value)` evaluated by the server
    async fn quote_literal(&mut self, value: &SecretString) -> RotationResult<SecretString>;

    /// Whether `query` returns at least one row
    async fn exists(&mut self, query: &str, params: &[&str]) -> RotationResult<bool>;

    /// Run a statement, returning the number of affected rows
    async fn execute(&mut self, statement: &str, params: &[&str]) -> RotationResult<u64>;

    /// Commit the open transaction, if any
    async fn commit(&mut self) -> RotationResult<()>;

    /// Roll back anything uncommitted and release the connection
    async fn close(self: Box<Self>) -> RotationResult<()>;
}
