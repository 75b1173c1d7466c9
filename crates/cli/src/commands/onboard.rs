//! `moverelay onboard` — First-time setup.

use moverelay_config::{AppConfig, ENV_APTOS_PRIVATE_KEY, ENV_DISCORD_BOT_TOKEN};
use std::path::Path;

pub async fn run(config_path: &Path, force: bool) -> anyhow::Result<()> {
    println!("🔗 MoveRelay — First-Time Setup");
    println!("===============================\n");

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("✅ Created config directory: {}", dir.display());
    }

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("✅ Wrote config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Add your assets under [[aptos.tokens]] in the config file");
    println!("   2. Export {ENV_DISCORD_BOT_TOKEN}, {ENV_APTOS_PRIVATE_KEY} and GOOGLE_API_KEY");
    println!("   3. Run: moverelay doctor");
    println!("   4. Run: moverelay run\n");

    Ok(())
}
