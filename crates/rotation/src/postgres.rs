//! sqlx-backed database client
//!
//! One [`PgSession`] wraps one dedicated `PgConnection`; there is no pool.
//! The transaction is opened with the first statement that needs it and
//! rolled back by [`Session::close`] unless it was committed.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Connection, Executor};

use crate::db::{ConnectParams, DatabaseClient, Session, SslMode};
use crate::error::{RotationError, RotationResult};

/// Default time allowed for establishing a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`DatabaseClient`] opening dedicated sqlx connections
#[derive(Debug, Clone)]
pub struct PgClient {
    connect_timeout: Duration,
}

impl Default for PgClient {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl PgClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn pg_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Require => PgSslMode::Require,
        SslMode::Prefer => PgSslMode::Prefer,
    }
}

fn connect_options(params: &ConnectParams) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&params.host)
        .port(params.port)
        .database(&params.dbname)
        .username(&params.username)
        .password(params.password.expose_secret())
        .ssl_mode(pg_ssl_mode(params.ssl_mode))
}

#[async_trait]
impl DatabaseClient for PgClient {
    #[tracing::instrument(
        skip(self, params),
        fields(host = %params.host, port = params.port, user = %params.username, sslmode = params.ssl_mode.as_str())
    )]
    async fn connect(&self, params: &ConnectParams) -> RotationResult<Box<dyn Session>> {
        let failed = |reason: String| RotationError::ConnectionFailed {
            host: params.host.clone(),
            user: params.username.clone(),
            reason,
        };

        let options = connect_options(params);
        let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        Ok(Box::new(PgSession {
            conn,
            in_transaction: false,
        }))
    }
}

/// One open PostgreSQL connection
pub struct PgSession {
    conn: PgConnection,
    in_transaction: bool,
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession")
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl PgSession {
    async fn begin(&mut self) -> RotationResult<()> {
        if !self.in_transaction {
            self.conn
                .execute("BEGIN")
                .await
                .map_err(|e| RotationError::database("begin", e))?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn quote_ident(&mut self, name: &str) -> RotationResult<String> {
        sqlx::query_scalar::<_, String>("SELECT quote_ident($1)")
            .bind(name)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| RotationError::database("quote_ident", e))
    }

    async fn quote_literal(&mut self, value: &SecretString) -> RotationResult<SecretString> {
        let quoted: String = sqlx::query_scalar("SELECT quote_literal($1)")
            .bind(value.expose_secret())
            .persistent(false)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| RotationError::database("quote_literal", e))?;
        Ok(SecretString::from(quoted))
    }

    async fn exists(&mut self, query: &str, params: &[&str]) -> RotationResult<bool> {
        self.begin().await?;

        let mut statement = sqlx::query(query);
        for param in params {
            statement = statement.bind(*param);
        }
        let row = statement
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|e| RotationError::database("query", e))?;
        Ok(row.is_some())
    }

    async fn execute(&mut self, statement: &str, params: &[&str]) -> RotationResult<u64> {
        self.begin().await?;

        // Utility statements carry their (already quoted) values inline and
        // must not be cached as prepared statements.
        let result = if params.is_empty() {
            self.conn.execute(statement).await
        } else {
            let mut query = sqlx::query(statement).persistent(false);
            for param in params {
                query = query.bind(*param);
            }
            query.execute(&mut self.conn).await
        };

        result
            .map(|done| done.rows_affected())
            .map_err(|e| RotationError::database("execute", e))
    }

    async fn commit(&mut self) -> RotationResult<()> {
        if self.in_transaction {
            self.conn
                .execute("COMMIT")
                .await
                .map_err(|e| RotationError::database("commit", e))?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> RotationResult<()> {
        if self.in_transaction {
            if let Err(e) = self.conn.execute("ROLLBACK").await {
                tracing::warn!(error = %e, "Rollback of uncommitted transaction failed");
            }
        }
        self.conn
            .close()
            .await
            .map_err(|e| RotationError::database("close", e))
    }
}
