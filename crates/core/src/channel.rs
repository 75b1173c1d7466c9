//! Channel trait: the abstraction over chat platforms.
//!
//! A Channel connects MoveRelay to a messaging platform. It yields inbound
//! events (readiness, messages) and sends replies back.

use crate::error::ChannelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// The channel this message belongs to
    pub channel_id: ChannelId,

    /// Platform-specific ID of this message (used for threaded replies)
    pub message_id: String,

    /// Sender identifier (platform-specific user ID)
    pub sender_id: String,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// Whether the sender is an automated account
    #[serde(default)]
    pub sender_is_bot: bool,

    /// The text content
    pub content: String,

    /// The chat/DM identifier within the channel
    pub chat_id: String,

    /// Whether this arrived in a one-to-one direct message
    #[serde(default)]
    pub is_direct: bool,
}

/// An event yielded by a running channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The platform session is established.
    Ready { bot_name: String },

    /// An inbound message was created.
    Message(ChannelMessage),
}

/// The core Channel trait.
///
/// Implementations handle platform-specific connection logic, message
/// formatting, and authentication.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "discord").
    fn name(&self) -> &str;

    /// Unique ID for this channel instance.
    fn id(&self) -> &ChannelId;

    /// Start listening for inbound events.
    ///
    /// Returns a receiver that yields events until the channel stops or
    /// hits an unrecoverable error (delivered as the final `Err`).
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChannelEvent, ChannelError>>,
        ChannelError,
    >;

    /// Send a message to a specific chat, optionally as a reply.
    async fn send(
        &self,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> std::result::Result<(), ChannelError>;

    /// Send a typing indicator (if the platform supports it).
    async fn send_typing(&self, _chat_id: &str) -> std::result::Result<(), ChannelError> {
        Ok(()) // No-op default
    }

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check: is the channel configured and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
