//! `moverelay run` — Discord relay.

use anyhow::Context;
use moverelay_agent::ReactAgentFactory;
use moverelay_chain::AptosRuntime;
use moverelay_channels::DiscordChannel;
use moverelay_core::channel::Channel;
use moverelay_providers::OpenAiCompatProvider;
use moverelay_relay::Relay;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    // Every secret is required before anything connects.
    config.require_private_key()?;
    config.require_bot_token()?;
    config.require_api_key()?;

    let runtime = AptosRuntime::from_config(&config.aptos)
        .context("Failed to initialize Aptos runtime")?;
    info!(address = %runtime.address(), tokens = runtime.catalog().len(), "Wallet loaded");
    let tools = Arc::new(moverelay_tools::default_registry(Arc::new(runtime)));

    let provider = OpenAiCompatProvider::from_config(&config.provider)
        .context("Failed to configure LLM provider")?;
    let factory = ReactAgentFactory::from_config(&config, Arc::new(provider), tools);

    let channel = Arc::new(DiscordChannel::from_config(&config.discord)?);
    let relay = Arc::new(Relay::from_config(
        &config,
        channel.clone(),
        Arc::new(factory),
    ));

    info!(model = %config.provider.model, "Starting Discord relay");
    tokio::select! {
        result = relay.run() => result.context("Discord relay stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    channel.stop().await?;
    Ok(())
}
