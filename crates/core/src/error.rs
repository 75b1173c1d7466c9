//! Error types for the MoveRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for MoveRelay operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    /// The platform rejected the session in a way that retrying cannot fix
    /// (bad token, disallowed intents).
    #[error("Fatal channel error: {0}")]
    Fatal(String),

    #[error("Invalid gateway payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent construction failed: {0}")]
    Construction(String),

    #[error("Provider failed during agent step: {0}")]
    Provider(#[from] ProviderError),

    #[error("Agent stopped after {0} steps without a final answer")]
    RecursionLimit(u32),
}

/// An error raised by the blockchain runtime.
///
/// `code` mirrors the machine-readable code some runtime failures carry
/// (Aptos `error_code` / `vm_error_code`). Callers that need a code for
/// every failure fall back to their own sentinel when it is `None`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ChainError {
    pub message: String,
    pub code: Option<String>,
}

impl ChainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}
