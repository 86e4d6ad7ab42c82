// src/main.rs

use std::fs;
use std::os::unix::fs::PermissionsExt;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod server;
mod sys;

use crate::config::AgentConfig;
use crate::server::HyperCommonsService;
use crate::server::hyper_commons::settings_agent_server::SettingsAgentServer;
use crate::sys::cleanup::prune_stale_configs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ==============================================================================
    // 1. Configuration & Logging
    // ==============================================================================

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::load()?;

    // Credentials a crashed run left on disk go before we accept any request.
    if let Err(e) = prune_stale_configs(&config.tmp_root).await {
        tracing::warn!(error = %e, "stale credential sweep failed");
    }

    // ==============================================================================
    // 2. Socket Initialization
    // ==============================================================================

    let socket_path = config.socket_path.clone();
    if let Some(socket_dir) = socket_path.parent() {
        fs::create_dir_all(socket_dir)?;
    }

    // Left over from a previous crash/run
    if socket_path.exists() {
        fs::remove_file(&socket_path)?;
    }

    let uds = UnixListener::bind(&socket_path)?;

    // 0o660: the agent and the host's group only.
    let mut perms = fs::metadata(&socket_path)?.permissions();
    perms.set_mode(0o660);
    fs::set_permissions(&socket_path, perms)?;

    let uds_stream = UnixListenerStream::new(uds);

    // ==============================================================================
    // 3. Service Start
    // ==============================================================================

    let service = HyperCommonsService::load(config).await?;

    tracing::info!(socket = ?socket_path, "hyper commons agent listening");

    Server::builder()
        .add_service(SettingsAgentServer::new(service))
        .serve_with_incoming_shutdown(uds_stream, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    let _ = fs::remove_file(&socket_path);
    Ok(())
}
