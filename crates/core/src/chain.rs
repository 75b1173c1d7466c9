//! Chain runtime: asset lookup and transaction submission.
//!
//! The withdrawal tool only ever talks to the blockchain through this
//! trait. The bundled Aptos implementation lives in `moverelay-chain`.

use crate::error::ChainError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Catalog entry for a known asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Display name (e.g., "Tether USD")
    pub name: String,

    /// Ticker symbol (e.g., "USDT")
    pub symbol: String,

    /// On-chain address: a coin type (`0x1::aptos_coin::AptosCoin`) or a
    /// fungible-asset metadata object address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,

    /// Lending-market pool the asset is supplied to.
    pub pool_address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

/// Metadata fetched from chain for an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDetails {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

#[async_trait]
pub trait ChainRuntime: Send + Sync {
    /// Resolve an asset by its name or symbol.
    fn get_token_by_name(&self, name: &str) -> Option<TokenInfo>;

    /// Fetch metadata for a coin type or fungible-asset address.
    async fn get_token_details(&self, address: &str) -> Result<TokenDetails, ChainError>;

    /// Withdraw `amount` base units of `address` from the lending pool.
    ///
    /// `fungible_asset` selects the fungible-asset entry point; `false`
    /// selects the coin-standard entry point. Returns the transaction hash.
    async fn withdraw_token_with_echelon(
        &self,
        address: &str,
        amount: u64,
        pool_address: &str,
        fungible_asset: bool,
    ) -> Result<String, ChainError>;
}
