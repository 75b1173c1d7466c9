//! Agent capability: the conversational agent the relay talks to.
//!
//! The agent is consumed as an opaque streaming capability: it takes the
//! accumulated conversation plus a thread configuration and yields one
//! chunk per graph step. A chunk is either an `agent` step (the model
//! spoke, possibly requesting tools) or a `tools` step (tool results).

use crate::error::AgentError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input state for one agent invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInput {
    pub messages: Vec<Message>,
}

/// Per-invocation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Checkpoint thread the invocation reads from and writes to.
    pub thread_id: String,
}

impl ThreadConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
        }
    }
}

/// One step of agent output.
///
/// Serializes as `{"agent":{"messages":[...]}}` or
/// `{"tools":{"messages":[...]}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentChunk {
    /// The model produced a message.
    Agent { messages: Vec<Message> },

    /// Tools were executed; one message per tool call.
    Tools { messages: Vec<Message> },
}

impl AgentChunk {
    /// Text of the first message of an `agent` step, if this is one.
    pub fn agent_content(&self) -> Option<&str> {
        match self {
            Self::Agent { messages } => messages.first().map(|m| m.content.as_str()),
            Self::Tools { .. } => None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Self::Agent { messages } | Self::Tools { messages } => messages,
        }
    }
}

/// Receiver side of an agent stream.
pub type AgentStream = tokio::sync::mpsc::Receiver<std::result::Result<AgentChunk, AgentError>>;

/// A conversational agent that streams step chunks.
#[async_trait]
pub trait ConversationalAgent: Send + Sync {
    /// Run the agent over `input` and stream its steps.
    async fn stream(
        &self,
        input: AgentInput,
        config: ThreadConfig,
    ) -> std::result::Result<AgentStream, AgentError>;
}

/// Builds agents on demand. The relay asks for one agent per request.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self) -> std::result::Result<Arc<dyn ConversationalAgent>, AgentError>;
}
