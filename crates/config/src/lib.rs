//! Configuration loading, validation, and management for MoveRelay.
//!
//! Loads configuration from `~/.moverelay/config.toml` with environment
//! variable overrides for secrets. Validates all settings at startup.

use moverelay_core::message::Role;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the Discord bot token.
pub const ENV_DISCORD_BOT_TOKEN: &str = "DISCORD_BOT_TOKEN";
/// Environment variable holding the Aptos account private key.
pub const ENV_APTOS_PRIVATE_KEY: &str = "APTOS_PRIVATE_KEY";
/// Environment variable holding the LLM provider key.
pub const ENV_LLM_API_KEY: &str = "GOOGLE_API_KEY";

/// The root configuration structure.
///
/// Maps directly to `~/.moverelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// Discord bot settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Chat relay settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Aptos account, node, and token catalog
    #[serde(default)]
    pub aptos: AptosConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name used in logs
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider_name() -> String {
    "gemini".into()
}
fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Checkpoint thread every relay invocation uses
    #[serde(default = "default_thread_id")]
    pub thread_id: String,

    /// System prompt prepended to every model call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum model steps per invocation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_thread_id() -> String {
    "Discord Bot".into()
}
fn default_max_iterations() -> u32 {
    25
}

/// The prompt the bot has always shipped with.
pub fn default_system_prompt() -> String {
    "You are a helpful agent that can interact onchain using the Move Agent Kit. You are \
empowered to interact onchain using your tools. If you ever need funds, you can request them from the \
faucet. Otherwise, you can provide your wallet details and request funds from the user. If there is a 5XX \
(internal) HTTP error code, ask the user to try again later. If someone asks you to do something you \
can't do with your currently available tools, you must say so, and encourage them to implement it \
themselves using the Move Agent Kit. For more information, please visit https://metamove.build/move-agent-kit. Be \
concise and helpful with your responses. Refrain from restating your tools' descriptions unless explicitly requested."
        .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            thread_id: default_thread_id(),
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Gateway reconnect attempts before the channel gives up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_max_reconnect_attempts() -> u32 {
    8
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Role recorded in history for the bot's own replies.
    ///
    /// Defaults to `user`: replies have always been stored as human
    /// messages and the agent's context depends on that shape.
    #[serde(default = "default_reply_role")]
    pub reply_role: Role,

    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_reply_role() -> Role {
    Role::User
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reply_role: default_reply_role(),
            history: HistoryConfig::default(),
        }
    }
}

/// Eviction limits for per-user conversation history. Unset = unbounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages_per_user: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_ttl_secs: Option<u64>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AptosConfig {
    #[serde(default = "default_network")]
    pub network: String,

    /// Fullnode REST endpoint (including `/v1`)
    #[serde(default = "default_node_url")]
    pub node_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    #[serde(default = "default_max_gas_amount")]
    pub max_gas_amount: u64,

    #[serde(default = "default_gas_unit_price")]
    pub gas_unit_price: u64,

    /// Seconds until a submitted transaction expires
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,

    /// Echelon lending market package address
    #[serde(default = "default_echelon_address")]
    pub echelon_address: String,

    /// Known assets, looked up by symbol or name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<TokenConfig>,
}

fn default_network() -> String {
    "mainnet".into()
}
fn default_node_url() -> String {
    "https://fullnode.mainnet.aptoslabs.com/v1".into()
}
fn default_max_gas_amount() -> u64 {
    20_000
}
fn default_gas_unit_price() -> u64 {
    100
}
fn default_expiration_secs() -> u64 {
    60
}
fn default_echelon_address() -> String {
    "0xc6bc659f1649553c1a3fa05d9727433dc03843baac29473c817d06d39e7621ba".into()
}

impl Default for AptosConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            node_url: default_node_url(),
            private_key: None,
            max_gas_amount: default_max_gas_amount(),
            gas_unit_price: default_gas_unit_price(),
            expiration_secs: default_expiration_secs(),
            echelon_address: default_echelon_address(),
            tokens: vec![],
        }
    }
}

impl std::fmt::Debug for AptosConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AptosConfig")
            .field("network", &self.network)
            .field("node_url", &self.node_url)
            .field("private_key", &redact(&self.private_key))
            .field("max_gas_amount", &self.max_gas_amount)
            .field("gas_unit_price", &self.gas_unit_price)
            .field("expiration_secs", &self.expiration_secs)
            .field("echelon_address", &self.echelon_address)
            .field("tokens", &self.tokens)
            .finish()
    }
}

/// A catalog entry in `[[aptos.tokens]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,

    pub pool_address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.moverelay/config.toml),
    /// then apply environment overrides.
    ///
    /// Environment variables (highest priority):
    /// - `DISCORD_BOT_TOKEN`, `APTOS_PRIVATE_KEY`
    /// - `GOOGLE_API_KEY`, falling back to `MOVERELAY_API_KEY`
    /// - `MOVERELAY_MODEL`, `APTOS_NODE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production). Secrets from the environment win over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_DISCORD_BOT_TOKEN) {
            self.discord.bot_token = Some(token);
        }
        if let Some(key) = lookup(ENV_APTOS_PRIVATE_KEY) {
            self.aptos.private_key = Some(key);
        }
        if let Some(key) = lookup(ENV_LLM_API_KEY).or_else(|| lookup("MOVERELAY_API_KEY")) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup("MOVERELAY_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("APTOS_NODE_URL") {
            self.aptos.node_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".moverelay")
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if !matches!(self.relay.reply_role, Role::User | Role::Assistant) {
            return Err(ConfigError::ValidationError(
                "relay.reply_role must be \"user\" or \"assistant\"".into(),
            ));
        }

        if self.relay.history.max_messages_per_user == Some(0) {
            return Err(ConfigError::ValidationError(
                "relay.history.max_messages_per_user must be > 0 when set".into(),
            ));
        }

        for token in &self.aptos.tokens {
            if token.symbol.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "aptos.tokens entries need a symbol".into(),
                ));
            }
            if token.pool_address.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "aptos.tokens.{}: pool_address is required",
                    token.symbol
                )));
            }
        }

        Ok(())
    }

    /// The Aptos private key, or the startup error its absence causes.
    pub fn require_private_key(&self) -> Result<&str, ConfigError> {
        self.aptos
            .private_key
            .as_deref()
            .ok_or(ConfigError::MissingSecret(ENV_APTOS_PRIVATE_KEY))
    }

    /// The Discord bot token, or the startup error its absence causes.
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.discord
            .bot_token
            .as_deref()
            .ok_or(ConfigError::MissingSecret(ENV_DISCORD_BOT_TOKEN))
    }

    /// The LLM provider key, or the startup error its absence causes.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.provider
            .api_key
            .as_deref()
            .ok_or(ConfigError::MissingSecret(ENV_LLM_API_KEY))
    }

    /// Generate a default config TOML string (for `onboard` command),
    /// followed by a commented token catalog entry.
    pub fn default_toml() -> String {
        let config = Self::default();
        let mut out = toml::to_string_pretty(&config).unwrap_or_default();
        out.push_str(TOKEN_CATALOG_EXAMPLE);
        out
    }
}

/// Withdrawals only see tokens listed here; `pool_address` is the Echelon
/// market holding the position.
const TOKEN_CATALOG_EXAMPLE: &str = r#"
# Tokens the withdraw tool can find, by symbol or name.
#
# [[aptos.tokens]]
# symbol = "APT"
# name = "Aptos Coin"
# token_address = "0x1::aptos_coin::AptosCoin"
# pool_address = "0x<echelon APT market address>"
# decimals = 8
#
# [[aptos.tokens]]
# symbol = "USDT"
# name = "Tether USD"
# token_address = "0x357b0b74bc833e95a115ad22604854d6b0fca151cecd94111770e5d6ffc9dc2b"
# pool_address = "0x<echelon USDT market address>"
# decimals = 6
"#;

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing {0} environment variable")]
    MissingSecret(&'static str),
}
