//! Builds a fresh agent per relay request.

use crate::checkpoint::MemoryCheckpointer;
use crate::patterns::ReactAgent;
use async_trait::async_trait;
use moverelay_config::AppConfig;
use moverelay_core::agent::{AgentFactory, ConversationalAgent};
use moverelay_core::error::AgentError;
use moverelay_core::provider::Provider;
use moverelay_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::debug;

/// Shares one provider and tool registry; every agent it builds gets its
/// own empty checkpointer.
pub struct ReactAgentFactory {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    max_iterations: u32,
}

impl ReactAgentFactory {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
        temperature: f32,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature,
            max_tokens: None,
            system_prompt: system_prompt.into(),
            max_iterations: 25,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            provider,
            tools,
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_tokens: config.provider.max_tokens,
            system_prompt: config.agent.system_prompt.clone(),
            max_iterations: config.agent.max_iterations,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }
}

#[async_trait]
impl AgentFactory for ReactAgentFactory {
    async fn create(&self) -> Result<Arc<dyn ConversationalAgent>, AgentError> {
        if self.model.is_empty() {
            return Err(AgentError::Construction("No model configured".into()));
        }

        debug!(model = %self.model, tools = self.tools.len(), "Building agent");
        let agent = ReactAgent::new(
            self.provider.clone(),
            self.model.clone(),
            self.temperature,
            self.tools.clone(),
            self.system_prompt.clone(),
        )
        .with_max_iterations(self.max_iterations)
        .with_max_tokens(self.max_tokens)
        .with_checkpointer(Arc::new(MemoryCheckpointer::new()));

        Ok(Arc::new(agent))
    }
}
