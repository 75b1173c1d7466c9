//! `moverelay withdraw` — Call the withdraw tool from the shell.

use anyhow::Context;
use moverelay_chain::AptosRuntime;
use moverelay_tools::EchelonWithdrawTool;
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: &Path, input: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    config.require_private_key()?;

    let runtime = AptosRuntime::from_config(&config.aptos)
        .context("Failed to initialize Aptos runtime")?;
    let tool = EchelonWithdrawTool::new(Arc::new(runtime));

    let envelope = tool.run(input).await;
    println!("{}", envelope.to_json());

    if !envelope.is_success() {
        anyhow::bail!("Withdrawal failed");
    }
    Ok(())
}
