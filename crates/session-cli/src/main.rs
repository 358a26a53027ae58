//! Agency session CLI - drives the identity session and credential
//! provisioning stack from the command line.

mod env_host;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credential_provisioning::{HttpCredentialBackend, ProvisioningService};
use env_host::EnvTokenHost;
use identity_session::{extract_identity, AuthSessionController};
use session_config_and_utils::{init_logging, Config};
use session_orchestrator::{BearerApiClient, SessionOrchestrator};
use tracing::info;

/// Agency session command-line interface.
#[derive(Parser)]
#[command(name = "agency-session")]
#[command(about = "Identity session and downstream credential tooling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// JSON config file. Environment variables still take precedence.
    #[arg(short, long, global = true, env = "SESSION_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the display identity carried by a JWT
    Decode {
        /// Access token
        token: String,
    },
    /// Provision downstream credentials from AGENCY_CLIENT_ID / AGENCY_CLIENT_SECRET
    Provision,
    /// Run the session against SESSION_ACCESS_TOKEN and print the resulting view
    Session {
        /// Do not attempt a login when no session is found
        #[arg(long)]
        no_auto_login: bool,
    },
    /// GET a downstream API path with provisioned credentials
    Fetch {
        /// Path relative to the API base URL
        path: String,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::new(),
    };
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_orchestrator(config: &Config, auto_login: bool) -> Result<SessionOrchestrator> {
    let backend = HttpCredentialBackend::from_config(config)
        .context("failed to create credential backend")?;
    let credentials = ProvisioningService::new(Arc::new(backend));
    let auth = AuthSessionController::new(Arc::new(EnvTokenHost::from_env()));
    Ok(SessionOrchestrator::new(
        Arc::new(auth),
        Arc::new(credentials),
        auto_login,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(&config.log_level);
    info!(api_base_url = %config.api_base_url, "Configuration loaded");

    match cli.command {
        Commands::Decode { token } => {
            print_json(&extract_identity(&token))?;
        }
        Commands::Provision => {
            let backend = HttpCredentialBackend::from_config(&config)
                .context("failed to create credential backend")?;
            let service = ProvisioningService::new(Arc::new(backend));
            let result = service.initialize_from_env().await;
            print_json(&service.state())?;
            result.context("credential provisioning failed")?;
        }
        Commands::Session { no_auto_login } => {
            let orchestrator = build_orchestrator(&config, config.auto_login && !no_auto_login)?;
            orchestrator.start().await?;
            print_json(&orchestrator.view())?;
        }
        Commands::Fetch { path } => {
            let orchestrator = build_orchestrator(&config, false)?;
            orchestrator.start().await?;
            let client = BearerApiClient::from_config(&config)?;
            let body: serde_json::Value = orchestrator
                .fetch_json(&client, &path)
                .await
                .with_context(|| format!("request to {} failed", path))?;
            print_json(&body)?;
        }
    }

    Ok(())
}
