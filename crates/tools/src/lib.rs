//! Agent tools for MoveRelay.
//!
//! Tools give the agent the ability to act on chain. Each one talks to the
//! blockchain only through `moverelay_core::ChainRuntime`.

pub mod amount;
pub mod echelon_withdraw;

use moverelay_core::chain::ChainRuntime;
use moverelay_core::tool::ToolRegistry;
use std::sync::Arc;

pub use echelon_withdraw::{EchelonWithdrawTool, ToolEnvelope};

/// Create the tool registry handed to every agent.
pub fn default_registry(runtime: Arc<dyn ChainRuntime>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchelonWithdrawTool::new(runtime)));
    registry
}
