//! `convoy serve`: start the HTTP gateway.

use anyhow::{Context, Result};
use convoy_config::{AppConfig, WorkflowMode};
use tracing::info;

pub async fn run(mut config: AppConfig, port: Option<u16>, mode: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(mode) = mode {
        config.workflow.mode = mode.parse::<WorkflowMode>()?;
    }
    if !config.has_api_key() {
        anyhow::bail!("No API key configured. Set model.api_key, CONVOY_API_KEY, or OPENAI_API_KEY");
    }

    info!(
        host = %config.gateway.host,
        port = config.gateway.port,
        mode = ?config.workflow.mode,
        model = %config.model.model,
        "Starting convoy"
    );

    convoy_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Gateway stopped")
}
