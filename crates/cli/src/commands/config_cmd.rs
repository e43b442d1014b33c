//! `convoy init-config` and `convoy check-config`.

use anyhow::{Context, Result, bail};
use convoy_config::AppConfig;
use std::path::Path;

pub fn load(path: &Path) -> Result<AppConfig> {
    AppConfig::load_with_env(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote default config to {}", path.display());
    println!("Set model.api_key (or CONVOY_API_KEY) and transport.password before `convoy serve`.");
    Ok(())
}

/// Hard errors fail the command; missing secrets are only warnings.
pub fn check(path: &Path) -> Result<()> {
    let config = load(path)?;
    println!("Config OK: {}", path.display());

    for warning in warnings(&config) {
        println!("  warning: {warning}");
    }

    println!();
    println!("  Model:      {} ({})", config.model.model, config.model.api_url);
    println!("  Transport:  {}", config.transport.base_url);
    println!("  Gateway:    {}:{}", config.gateway.host, config.gateway.port);
    println!("  Workflow:   {:?} (id prefix {:?})", config.workflow.mode, config.workflow.id_prefix);
    println!(
        "  Agent:      history {}, tool iterations {}, activation {:?}",
        config.agent.max_history, config.agent.max_tool_iterations, config.agent.activation_token
    );
    Ok(())
}

fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (model.api_key, CONVOY_API_KEY, or OPENAI_API_KEY)");
    }
    if config.transport.password.is_none() {
        warnings.push("No transport password set (transport.password or CONVOY_TRANSPORT_PASSWORD)");
    }
    if config.transport.webhook_secret.is_none() {
        warnings.push("No webhook secret set, unsigned webhooks will be accepted");
    }
    warnings
}
