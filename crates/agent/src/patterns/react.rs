//! ReAct pattern: model call → tool execution → model call, until the
//! model answers without requesting tools.
//!
//! Each step is streamed as an [`AgentChunk`]:
//! - `Agent` carries the assistant message the model produced
//! - `Tools` carries one tool-result message per requested call
//!
//! Thread state is loaded from the checkpointer before the first step and
//! written back after the last one.

use crate::checkpoint::{Checkpointer, MemoryCheckpointer, merge_messages};
use async_trait::async_trait;
use moverelay_core::agent::{AgentChunk, AgentInput, AgentStream, ConversationalAgent, ThreadConfig};
use moverelay_core::error::AgentError;
use moverelay_core::message::{Message, MessageToolCall};
use moverelay_core::provider::{Provider, ProviderRequest};
use moverelay_core::tool::{ToolCall, ToolRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Buffered chunks per stream.
const STREAM_BUFFER: usize = 32;

/// A tool-calling agent.
#[derive(Clone)]
pub struct ReactAgent {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_iterations: u32,
    checkpointer: Arc<dyn Checkpointer>,
}

impl ReactAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations: 25,
            checkpointer: Arc::new(MemoryCheckpointer::new()),
        }
    }

    /// Set max model steps per invocation.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    /// Drive the loop, sending chunks to `tx`. Returns the final thread
    /// state, which is checkpointed even when the loop fails.
    async fn run(
        &self,
        mut messages: Vec<Message>,
        tx: &mpsc::Sender<Result<AgentChunk, AgentError>>,
    ) -> Vec<Message> {
        let tool_definitions = self.tools.definitions();

        for iteration in 1..=self.max_iterations {
            debug!(iteration, messages = messages.len(), "Agent step");

            let mut request_messages = Vec::with_capacity(messages.len() + 1);
            if !self.system_prompt.is_empty() {
                request_messages.push(Message::system(&self.system_prompt));
            }
            request_messages.extend(messages.iter().cloned());

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: request_messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = match self.provider.complete(request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(provider = self.provider.name(), error = %e, "Provider call failed");
                    let _ = tx.send(Err(AgentError::Provider(e))).await;
                    return messages;
                }
            };

            let assistant = response.message;
            let tool_calls = assistant.tool_calls.clone();
            messages.push(assistant.clone());

            if tx
                .send(Ok(AgentChunk::Agent {
                    messages: vec![assistant],
                }))
                .await
                .is_err()
            {
                debug!("Agent stream receiver dropped");
                return messages;
            }

            if tool_calls.is_empty() {
                info!(iterations = iteration, "Agent finished");
                return messages;
            }

            debug!(tool_count = tool_calls.len(), "Executing tool calls");
            let mut results = Vec::with_capacity(tool_calls.len());
            for tc in &tool_calls {
                results.push(self.execute_tool(tc).await);
            }
            messages.extend(results.iter().cloned());

            if tx
                .send(Ok(AgentChunk::Tools { messages: results }))
                .await
                .is_err()
            {
                debug!("Agent stream receiver dropped");
                return messages;
            }
        }

        warn!(max_iterations = self.max_iterations, "Agent hit recursion limit");
        let _ = tx
            .send(Err(AgentError::RecursionLimit(self.max_iterations)))
            .await;
        messages
    }

    /// Execute one tool call. Failures become tool-result messages so the
    /// model can see and recover from them.
    async fn execute_tool(&self, tc: &MessageToolCall) -> Message {
        let call = ToolCall {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments: serde_json::from_str(&tc.arguments)
                .unwrap_or_else(|_| serde_json::Value::String(tc.arguments.clone())),
        };

        let output = match self.tools.execute(&call).await {
            Ok(result) => {
                debug!(tool = %tc.name, success = result.success, "Tool executed");
                result.output
            }
            Err(e) => {
                warn!(tool = %tc.name, error = %e, "Tool execution failed");
                format!("Error: {e}")
            }
        };

        let mut msg = Message::tool_result(&tc.id, output);
        msg.metadata
            .insert("tool_name".into(), serde_json::Value::String(tc.name.clone()));
        msg
    }
}

#[async_trait]
impl ConversationalAgent for ReactAgent {
    async fn stream(
        &self,
        input: AgentInput,
        config: ThreadConfig,
    ) -> Result<AgentStream, AgentError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let agent = self.clone();

        tokio::spawn(async move {
            let saved = agent.checkpointer.load(&config.thread_id).await;
            let messages = merge_messages(saved, input.messages);
            let final_state = agent.run(messages, &tx).await;
            agent.checkpointer.save(&config.thread_id, final_state).await;
        });

        Ok(rx)
    }
}
