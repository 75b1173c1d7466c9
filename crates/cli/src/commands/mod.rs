pub mod doctor;
pub mod onboard;
pub mod run;
pub mod withdraw;

use anyhow::Context;
use moverelay_config::AppConfig;
use std::path::Path;

/// Load `path` with environment overrides applied.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    AppConfig::load_with_env(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
