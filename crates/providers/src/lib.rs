//! LLM provider implementations for MoveRelay.
//!
//! All providers implement the `moverelay_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
