//! Aptos runtime for MoveRelay.
//!
//! Implements `moverelay_core::ChainRuntime` against a fullnode's REST API:
//! key handling, token metadata views, and Echelon withdrawals.

pub mod account;
pub mod catalog;
pub mod client;
pub mod runtime;

pub use account::AptosAccount;
pub use catalog::TokenCatalog;
pub use client::AptosClient;
pub use runtime::AptosRuntime;
