//! # MoveRelay Core
//!
//! Domain types, traits, and error definitions shared by every MoveRelay
//! crate. The chat platform, the LLM agent, and the blockchain runtime are
//! all consumed through traits defined here, so the relay and the tool
//! adapter can be tested against scripted stand-ins.
//!
//! ## Seams
//!
//! - [`Channel`]: a chat platform that yields events and accepts replies
//! - [`ConversationalAgent`] / [`AgentFactory`]: the agent capability
//! - [`Tool`] / [`ToolRegistry`]: capabilities exposed to the agent
//! - [`Provider`]: an LLM backend used by the bundled agent
//! - [`ChainRuntime`]: asset lookup and transaction submission

pub mod agent;
pub mod chain;
pub mod channel;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentChunk, AgentFactory, AgentInput, AgentStream, ConversationalAgent, ThreadConfig};
pub use chain::{ChainRuntime, TokenDetails, TokenInfo};
pub use channel::{Channel, ChannelEvent, ChannelId, ChannelMessage};
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
