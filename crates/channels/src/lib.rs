//! Chat channel implementations for MoveRelay.
//!
//! Each channel connects to a chat platform and relays messages to/from
//! the agent. Channels are trait-based and platform-agnostic.
//!
//! Available channels:
//! - **Discord**: Gateway WebSocket for inbound events, REST for replies

pub mod discord;

pub use discord::DiscordChannel;
