//! `moverelay doctor` — Diagnose configuration.

use moverelay_chain::AptosAccount;
use moverelay_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    println!("🩺 MoveRelay Doctor — Configuration Diagnostics");
    println!("===============================================\n");

    let mut issues = 0;

    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file at {} — using defaults", config_path.display());
    }

    let config = match AppConfig::load_with_env(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config file and re-run.");
            return Ok(());
        }
    };

    match config.require_bot_token() {
        Ok(_) => println!("  ✅ Discord bot token set"),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    match config.require_private_key() {
        Ok(key) => match AptosAccount::from_private_key(key) {
            Ok(account) => println!("  ✅ Aptos account {}", account.address()),
            Err(e) => {
                println!("  ❌ Aptos private key unusable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    if config.provider.api_key.is_some() {
        println!(
            "  ✅ LLM key set ({} / {})",
            config.provider.name, config.provider.model
        );
    } else {
        println!("  ❌ No LLM key — set GOOGLE_API_KEY or provider.api_key");
        issues += 1;
    }

    println!("  ℹ️  Aptos node: {} ({})", config.aptos.node_url, config.aptos.network);
    if config.aptos.tokens.is_empty() {
        println!("  ⚠️  No [[aptos.tokens]] configured — withdrawals will find no tokens");
        issues += 1;
    } else {
        let symbols: Vec<&str> = config.aptos.tokens.iter().map(|t| t.symbol.as_str()).collect();
        println!("  ✅ {} token(s): {}", symbols.len(), symbols.join(", "));
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
