//! `pgrotate`: run one step of a PostgreSQL credential rotation.
//!
//! ```text
//! pgrotate --secret-id arn:aws:secretsmanager:...:secret:app --token $TOKEN --step createSecret
//! pgrotate --event event.json
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use pgrotate_log::Format;
use pgrotate_rotation::aws::{AwsConfig, RdsTopology, SecretsManagerStore};
use pgrotate_rotation::config::RotationConfig;
use pgrotate_rotation::coordinator::{Outcome, RotationCoordinator};
use pgrotate_rotation::postgres::PgClient;
use pgrotate_rotation::stage::RotationRequest;
use pgrotate_rotation::RotationError;

/// Run one step of an alternating-user PostgreSQL credential rotation.
#[derive(Debug, Parser)]
#[command(name = "pgrotate", version, long_about = None)]
struct Cli {
    /// ARN or name of the secret being rotated.
    #[arg(long, env = "PGROTATE_SECRET_ID", required_unless_present = "event")]
    secret_id: Option<String>,

    /// Version id of the pending secret version.
    #[arg(long, env = "PGROTATE_TOKEN", required_unless_present = "event")]
    token: Option<String>,

    /// createSecret, setSecret, testSecret or finishSecret.
    #[arg(long, env = "PGROTATE_STEP", required_unless_present = "event")]
    step: Option<String>,

    /// Rotation event JSON ({"SecretId", "ClientRequestToken", "Step"}); `-` reads stdin.
    #[arg(long, value_name = "FILE")]
    event: Option<PathBuf>,

    /// AWS region.
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Override the AWS endpoint, e.g. http://localhost:4566.
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Log output: pretty, compact or json.
    #[arg(long)]
    log_format: Option<Format>,
}

impl Cli {
    fn request(&self) -> Result<RotationRequest> {
        if let Some(path) = &self.event {
            return read_event(path);
        }
        match (&self.secret_id, &self.token, &self.step) {
            (Some(secret_id), Some(token), Some(step)) => {
                Ok(RotationRequest::new(secret_id, token, step))
            }
            _ => Err(anyhow!(
                "--secret-id, --token and --step are required without --event"
            )),
        }
    }
}

fn read_event(path: &Path) -> Result<RotationRequest> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read event from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Event is not a rotation event")
}

async fn run(cli: Cli) -> Result<Outcome> {
    let request = cli.request()?;
    let config = RotationConfig::from_env().context("Invalid rotation configuration")?;

    let sdk = AwsConfig {
        region: cli.region,
        endpoint_url: cli.endpoint_url,
    }
    .load()
    .await;

    let coordinator = RotationCoordinator::new(
        Arc::new(SecretsManagerStore::new(&sdk)),
        Arc::new(RdsTopology::new(&sdk)),
        Arc::new(PgClient::new()),
        config,
    );

    Ok(coordinator.handle(&request).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = pgrotate_log::Config::from_env().with_service("pgrotate");
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    let _guard = match pgrotate_log::init_with(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("pgrotate: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "Rotation step finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let kind = err
                .downcast_ref::<RotationError>()
                .map_or("cli", RotationError::kind);
            tracing::error!(error.kind = kind, error = %format!("{err:#}"), "Rotation step failed");
            ExitCode::FAILURE
        }
    }
}
