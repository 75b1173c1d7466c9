//! # MoveRelay Relay
//!
//! Listens to a chat [`Channel`](moverelay_core::Channel), keeps a
//! conversation history per sender, runs each direct message through a
//! freshly built agent, and replies with the agent's answer.

pub mod relay;
pub mod reply;
pub mod session;

pub use relay::{Relay, RelayError};
pub use reply::{ReplyAccumulator, extract_reply, substring_after_nth};
pub use session::{EvictionPolicy, SessionStore};
