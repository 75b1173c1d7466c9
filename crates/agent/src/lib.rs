//! The agent loop behind the chat relay.
//!
//! The agent follows a **Call → Act → Observe** cycle:
//!
//! 1. **Load** the thread's checkpointed messages and merge the new input
//! 2. **Send to LLM** with the system prompt and tool definitions
//! 3. **If tool calls**: execute them, stream the results, loop back to 2
//! 4. **If text only**: stream the answer and stop
//!
//! Every step is streamed to the caller as an `AgentChunk`.

pub mod checkpoint;
pub mod factory;
pub mod patterns;

pub use checkpoint::{Checkpointer, MemoryCheckpointer};
pub use factory::ReactAgentFactory;
pub use patterns::ReactAgent;
