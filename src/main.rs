//! # StackSeek Connect Entry Point
//!
//! Runs the local OAuth callback server, or prints an authorize URL.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackseek_connect::{
    ConnectClient,
    config::ConfigLoader,
    identity::StaticIdentity,
    models::ProviderKind,
    notifier::TracingPresenter,
    server::run_server,
    telemetry,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "stackseek-connect", version, about = "Connect source-control repositories to StackSeek")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the OAuth callback server
    Serve,
    /// Print the authorize URL for a provider
    AuthorizeUrl {
        /// github, gitlab, bitbucket or azure_devops
        provider: ProviderKind,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        debug!(config = %redacted_json, "Effective configuration");
    }

    let identity = Arc::new(StaticIdentity::from_config(&config));
    let client = ConnectClient::init(config, identity, Arc::new(TracingPresenter))?;

    match cli.cmd {
        Command::Serve => {
            let shutdown_client = client.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown_client.dispose().await;
                }
            });
            run_server(client).await
        }
        Command::AuthorizeUrl { provider } => {
            let url = client.handler().begin(provider)?;
            println!("{}", url);
            Ok(())
        }
    }
}
