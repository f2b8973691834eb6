//! runner-fleet entry point.
//!
//! This binary is the composition root for the whole system:
//!
//! 1. **Parse configuration**: flags with environment fallbacks, validated
//!    once into [`fleet::FleetConfig`].
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or pretty fmt
//!    layer and, when configured, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: the GitHub webhook decoder and App token
//!    issuer, and the Compute Engine provider, injected into the controller
//!    components as port trait objects.
//! 4. **Serve**: the listener's HTTP surface until SIGINT or SIGTERM.

mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use controller::{Reaper, WebhookRouter};
use gce::{Credentials, GceComputeProvider, ServiceAccount};
use github::{GitHubAppCredentials, GitHubAppTokenIssuer, GitHubWebhookDecoder};
use listener::AppState;
use tracing::info;

use crate::config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _telemetry = telemetry::init(args.log_format)?;

    let config = args.fleet_config().context("invalid configuration")?;
    let decoder = GitHubWebhookDecoder::new(args.webhook_auth().context("invalid configuration")?);

    let app_credentials = GitHubAppCredentials::from_pem_file(
        args.app_id,
        args.app_installation_id,
        &args.app_private_key_path,
    )
    .context("failed to load GitHub App credentials")?;
    let issuer = GitHubAppTokenIssuer::new(app_credentials).with_api_base_url(&args.github_api_url);

    let credentials = match &args.gcp_credentials_path {
        Some(path) => Credentials::ServiceAccount(
            ServiceAccount::from_file(path).context("failed to load GCP credentials")?,
        ),
        None => Credentials::metadata(),
    };
    let compute = Arc::new(GceComputeProvider::new(&args.gcp_project, credentials));

    let router = WebhookRouter::new(&config, Arc::new(decoder), Arc::new(issuer), compute.clone());
    let reaper = Reaper::new(compute, config.instance.prefix.clone(), config.gc.ttl);

    info!(
        project = %args.gcp_project,
        zone = %config.instance.zone,
        prefix = %config.instance.prefix,
        allowed_repos = config.allowed_repos.len(),
        gc_ttl_secs = config.gc.ttl.as_secs(),
        "starting runner-fleet"
    );

    let state = AppState::new(Arc::new(router), Arc::new(reaper), config.gc.auth_token);
    listener::serve(args.listen_addr, state, shutdown_signal()).await?;

    info!("runner-fleet stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
