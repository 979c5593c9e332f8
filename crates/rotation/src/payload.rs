//! Credential payload stored in each secret version
//!
//! The secret string is a JSON object:
//!
//! ```json
//! {
//!   "engine":    "postgres" | "aurora-postgresql",
//!   "host":      "<instance or cluster endpoint>",
//!   "username":  "<role>",
//!   "password":  "<password>",
//!   "dbname":    "<optional, defaults to postgres>",
//!   "port":      5432,
//!   "ssl":       true | "true" | "false" | ...,
//!   "masterarn": "<arn of the master secret>"
//! }
//! ```
//!
//! Validation happens once, in [`CredentialPayload::from_map`]. Everything
//! downstream of the accessor works with the typed record. Keys this crate
//! does not understand are carried along untouched so that a new version
//! written by the create step differs from its source only in `username`
//! and `password`.

use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::error::{RotationError, RotationResult};

/// Port used when the payload has none
pub const DEFAULT_PORT: u16 = 5432;

/// Database used when the payload has none
pub const DEFAULT_DBNAME: &str = "postgres";

const REQUIRED_FIELDS: [&str; 4] = ["host", "username", "password", "engine"];

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Single-instance PostgreSQL (`postgres`)
    Postgres,
    /// Clustered PostgreSQL (`aurora-postgresql`)
    AuroraPostgresql,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Postgres => "postgres",
            Engine::AuroraPostgresql => "aurora-postgresql",
        }
    }

    /// Whether topology is described at cluster level
    pub fn is_clustered(&self) -> bool {
        matches!(self, Engine::AuroraPostgresql)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Engine::Postgres),
            "aurora-postgresql" => Ok(Engine::AuroraPostgresql),
            other => Err(RotationError::UnsupportedEngine {
                engine: other.to_string(),
            }),
        }
    }
}

/// Raw value of the optional `ssl` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SslSetting {
    /// JSON boolean
    Flag(bool),
    /// JSON string, interpreted case-insensitively
    Text(String),
    /// Any other JSON type
    Unrecognized,
}

impl SslSetting {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(flag) => SslSetting::Flag(*flag),
            Value::String(text) => SslSetting::Text(text.clone()),
            _ => SslSetting::Unrecognized,
        }
    }
}

/// Validated contents of one secret version
///
/// Used for both the rotated (child) credential and the master credential;
/// only the former is required to carry `masterarn`.
#[derive(Debug, Clone)]
pub struct CredentialPayload {
    pub engine: Engine,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    password: SecretString,
    pub dbname: Option<String>,
    pub ssl: Option<SslSetting>,
    pub master_arn: Option<String>,
    /// Original JSON minus the password
    fields: Map<String, Value>,
}

impl CredentialPayload {
    /// Parse and validate a secret string.
    pub fn from_json(secret_id: &str, raw: &str) -> RotationResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| RotationError::MalformedSecret {
                secret_id: secret_id.to_string(),
                reason: format!("invalid JSON: {e}"),
            })?;

        match value {
            Value::Object(map) => Self::from_map(secret_id, map),
            _ => Err(RotationError::MalformedSecret {
                secret_id: secret_id.to_string(),
                reason: "secret string is not a JSON object".to_string(),
            }),
        }
    }

    /// Validate an already-decoded JSON object.
    pub fn from_map(secret_id: &str, mut fields: Map<String, Value>) -> RotationResult<Self> {
        for field in REQUIRED_FIELDS {
            if !fields.contains_key(field) {
                return Err(RotationError::missing_field(field));
            }
        }

        let malformed = |reason: String| RotationError::MalformedSecret {
            secret_id: secret_id.to_string(),
            reason,
        };
        let string_field = |fields: &Map<String, Value>, key: &str| match fields.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(malformed(format!("'{key}' must be a string"))),
        };

        let engine_raw = string_field(&fields, "engine")?;
        let engine = engine_raw.parse::<Engine>()?;
        let host = string_field(&fields, "host")?;
        let username = string_field(&fields, "username")?;
        let password = match fields.remove("password") {
            Some(Value::String(s)) => SecretString::from(s),
            _ => return Err(malformed("'password' must be a string".to_string())),
        };

        let port = match fields.get("port") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| malformed(format!("'port' out of range: {n}")))?,
            ),
            Some(Value::String(s)) => Some(
                s.trim()
                    .parse::<u16>()
                    .map_err(|_| malformed(format!("'port' is not a number: {s}")))?,
            ),
            Some(_) => return Err(malformed("'port' must be a number".to_string())),
        };

        let dbname = match fields.get("dbname") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(malformed("'dbname' must be a string".to_string())),
        };

        let master_arn = match fields.get("masterarn") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(malformed("'masterarn' must be a string".to_string())),
        };

        let ssl = fields.get("ssl").map(SslSetting::from_value);

        Ok(Self {
            engine,
            host,
            port,
            username,
            password,
            dbname,
            ssl,
            master_arn,
            fields,
        })
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Port to connect to, defaulting to 5432
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Database to connect to, defaulting to `postgres`
    pub fn dbname_or_default(&self) -> &str {
        self.dbname.as_deref().unwrap_or(DEFAULT_DBNAME)
    }

    /// Same payload under a different identity
    pub fn with_credentials(mut self, username: String, password: SecretString) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// Replace (or clear) the target database
    pub fn with_dbname(mut self, dbname: Option<String>) -> Self {
        match &dbname {
            Some(name) => {
                self.fields
                    .insert("dbname".to_string(), Value::String(name.clone()));
            }
            None => {
                self.fields.remove("dbname");
            }
        }
        self.dbname = dbname;
        self
    }

    /// Serialize back to a secret string
    pub fn to_secret_string(&self) -> SecretString {
        let mut fields = self.fields.clone();
        fields.insert(
            "username".to_string(),
            Value::String(self.username.clone()),
        );
        fields.insert(
            "password".to_string(),
            Value::String(self.password.expose_secret().to_string()),
        );
        SecretString::from(Value::Object(fields).to_string())
    }
}
