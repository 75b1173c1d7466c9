//! Known-asset catalog, looked up by symbol or display name.

use moverelay_config::TokenConfig;
use moverelay_core::chain::TokenInfo;

#[derive(Debug, Clone, Default)]
pub struct TokenCatalog {
    tokens: Vec<TokenInfo>,
}

impl TokenCatalog {
    pub fn new(tokens: Vec<TokenInfo>) -> Self {
        Self { tokens }
    }

    pub fn from_config(entries: &[TokenConfig]) -> Self {
        let tokens = entries
            .iter()
            .map(|t| TokenInfo {
                name: if t.name.is_empty() {
                    t.symbol.clone()
                } else {
                    t.name.clone()
                },
                symbol: t.symbol.clone(),
                token_address: t
                    .token_address
                    .clone()
                    .filter(|a| !a.trim().is_empty()),
                pool_address: t.pool_address.clone(),
                decimals: t.decimals,
            })
            .collect();
        Self { tokens }
    }

    /// Case-insensitive match on symbol first, then display name.
    pub fn find(&self, name: &str) -> Option<&TokenInfo> {
        let needle = name.trim();
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(needle))
            .or_else(|| self.tokens.iter().find(|t| t.name.eq_ignore_ascii_case(needle)))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, name: &str, address: Option<&str>) -> TokenConfig {
        TokenConfig {
            symbol: symbol.into(),
            name: name.into(),
            token_address: address.map(String::from),
            pool_address: format!("0xpool_{symbol}"),
            decimals: None,
        }
    }

    #[test]
    fn finds_by_symbol_case_insensitively() {
        let catalog = TokenCatalog::from_config(&[entry("USDT", "Tether USD", Some("0x357b"))]);
        let token = catalog.find("usdt").unwrap();
        assert_eq!(token.symbol, "USDT");
        assert_eq!(token.pool_address, "0xpool_USDT");
    }

    #[test]
    fn finds_by_display_name() {
        let catalog = TokenCatalog::from_config(&[entry("APT", "Aptos Coin", None)]);
        assert!(catalog.find("aptos coin").is_some());
        assert!(catalog.find("DOGE").is_none());
    }

    #[test]
    fn blank_addresses_become_none_and_names_default_to_symbol() {
        let catalog = TokenCatalog::from_config(&[entry("WETH", "", Some("  "))]);
        let token = catalog.find("WETH").unwrap();
        assert_eq!(token.name, "WETH");
        assert!(token.token_address.is_none());
    }
}
