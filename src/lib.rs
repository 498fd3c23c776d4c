pub mod app;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod prompt;
mod providers;
pub mod relay;
pub mod server;
pub mod session;
pub mod settings;
pub mod ui;
pub mod vibes;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use app::ChatApp;
use config::Config;
use model_gateway::HostModelGateway;
use server::ChatServer;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    let cfg = Config::from_env();
    info!(
        provider = %cfg.model_provider,
        requested_model = ?cfg.requested_model,
        base_url = %cfg.model_base_url,
        timeout_secs = cfg.model_timeout_secs,
        custom_system_prompt = cfg.system_prompt.is_some(),
        bind_address = %cfg.bind_address,
        port = cfg.port,
        "loaded runtime configuration"
    );
    model::check_provider(&cfg)?;

    let timeout = Duration::from_secs(cfg.model_timeout_secs);
    let client = Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .context("Failed to initialize HTTP client")?;

    let app = Arc::new(ChatApp::from_config(
        HostModelGateway::new(client, cfg.clone()),
        &cfg,
    ));
    let server = ChatServer::bind(&cfg.bind_address, cfg.port).await?;
    info!(url = %format!("http://{}", server.local_addr()?), "chat UI listening");

    server.run(app, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}
