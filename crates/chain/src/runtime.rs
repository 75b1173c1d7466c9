//! `ChainRuntime` over an Aptos fullnode.

use crate::account::AptosAccount;
use crate::catalog::TokenCatalog;
use crate::client::{
    AptosClient, Ed25519Signature, EntryFunctionPayload, SubmitTransactionRequest,
    UserTransactionRequest,
};
use async_trait::async_trait;
use moverelay_config::AptosConfig;
use moverelay_core::chain::{ChainRuntime, TokenDetails, TokenInfo};
use moverelay_core::error::ChainError;
use tracing::{debug, info, warn};

const FA_METADATA_TYPE: &str = "0x1::fungible_asset::Metadata";

#[derive(Debug)]
pub struct AptosRuntime {
    client: AptosClient,
    account: AptosAccount,
    catalog: TokenCatalog,
    echelon_address: String,
    max_gas_amount: u64,
    gas_unit_price: u64,
    expiration_secs: u64,
}

impl AptosRuntime {
    pub fn new(client: AptosClient, account: AptosAccount, catalog: TokenCatalog) -> Self {
        let defaults = AptosConfig::default();
        Self {
            client,
            account,
            catalog,
            echelon_address: defaults.echelon_address,
            max_gas_amount: defaults.max_gas_amount,
            gas_unit_price: defaults.gas_unit_price,
            expiration_secs: defaults.expiration_secs,
        }
    }

    /// Build a runtime from config. Fails when no private key is set.
    pub fn from_config(config: &AptosConfig) -> Result<Self, ChainError> {
        let key = config.private_key.as_deref().ok_or_else(|| {
            ChainError::with_code("Missing APTOS_PRIVATE_KEY environment variable", "MISSING_KEY")
        })?;
        let account = AptosAccount::from_private_key(key)?;

        info!(
            network = %config.network,
            address = %account.address(),
            tokens = config.tokens.len(),
            "Aptos runtime initialized"
        );

        Ok(Self {
            client: AptosClient::new(config.node_url.clone()),
            account,
            catalog: TokenCatalog::from_config(&config.tokens),
            echelon_address: config.echelon_address.clone(),
            max_gas_amount: config.max_gas_amount,
            gas_unit_price: config.gas_unit_price,
            expiration_secs: config.expiration_secs,
        })
    }

    pub fn address(&self) -> &str {
        self.account.address()
    }

    pub fn catalog(&self) -> &TokenCatalog {
        &self.catalog
    }

    /// Read a single value from a token metadata view function.
    async fn metadata_view(
        &self,
        address: &str,
        field: &str,
    ) -> Result<serde_json::Value, ChainError> {
        let (function, type_args, args) = metadata_view_call(address, field);
        let type_refs: Vec<&str> = type_args.iter().map(String::as_str).collect();
        let values = self.client.view(&function, &type_refs, args).await?;
        values
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::new(format!("View {function} returned no value")))
    }

    async fn metadata_string(&self, address: &str, field: &str) -> Option<String> {
        match self.metadata_view(address, field).await {
            Ok(value) => value.as_str().map(String::from),
            Err(e) => {
                warn!(address, field, error = %e, "Token metadata lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ChainRuntime for AptosRuntime {
    fn get_token_by_name(&self, name: &str) -> Option<TokenInfo> {
        self.catalog.find(name).cloned()
    }

    async fn get_token_details(&self, address: &str) -> Result<TokenDetails, ChainError> {
        let (decimals, name, symbol) = tokio::join!(
            self.metadata_view(address, "decimals"),
            self.metadata_string(address, "name"),
            self.metadata_string(address, "symbol"),
        );
        let decimals = parse_decimals(&decimals?)?;

        debug!(address, decimals, ?name, ?symbol, "Fetched token details");
        Ok(TokenDetails {
            name,
            symbol,
            decimals: Some(decimals),
        })
    }

    async fn withdraw_token_with_echelon(
        &self,
        address: &str,
        amount: u64,
        pool_address: &str,
        fungible_asset: bool,
    ) -> Result<String, ChainError> {
        let payload = withdraw_payload(
            &self.echelon_address,
            address,
            amount,
            pool_address,
            fungible_asset,
        );
        let sender = self.account.address().to_string();
        let sequence_number = self.client.account_sequence_number(&sender).await?;
        let expiration = expiration_timestamp(chrono::Utc::now().timestamp(), self.expiration_secs);

        let transaction = UserTransactionRequest {
            sender,
            sequence_number: sequence_number.to_string(),
            max_gas_amount: self.max_gas_amount.to_string(),
            gas_unit_price: self.gas_unit_price.to_string(),
            expiration_timestamp_secs: expiration.to_string(),
            payload,
        };

        let signing_message = self.client.encode_submission(&transaction).await?;
        let signed = SubmitTransactionRequest {
            transaction,
            signature: Ed25519Signature {
                kind: "ed25519_signature".into(),
                public_key: self.account.public_key_hex(),
                signature: self.account.sign_hex(&signing_message),
            },
        };

        let hash = self.client.submit(&signed).await?;
        info!(hash = %hash, amount, pool_address, fungible_asset, "Withdraw submitted");

        let committed = self.client.wait_for_transaction(&hash).await?;
        if committed.success != Some(true) {
            let status = committed
                .vm_status
                .unwrap_or_else(|| "unknown VM status".to_string());
            return Err(ChainError::with_code(
                format!("Withdraw failed: {status}"),
                "TRANSACTION_FAILED",
            ));
        }

        info!(hash = %committed.hash, "Withdraw confirmed");
        Ok(committed.hash)
    }
}

/// Coin types (`addr::module::Struct`) go through `0x1::coin`; everything
/// else is treated as a fungible-asset metadata object.
/// Absolute expiry in unix seconds. Clock values before the epoch count
/// as zero and the sum saturates instead of wrapping.
fn expiration_timestamp(now_secs: i64, ttl_secs: u64) -> u64 {
    u64::try_from(now_secs).unwrap_or(0).saturating_add(ttl_secs)
}

fn metadata_view_call(address: &str, field: &str) -> (String, Vec<String>, Vec<serde_json::Value>) {
    if address.contains("::") {
        (
            format!("0x1::coin::{field}"),
            vec![address.to_string()],
            vec![],
        )
    } else {
        (
            format!("0x1::fungible_asset::{field}"),
            vec![FA_METADATA_TYPE.to_string()],
            vec![serde_json::Value::String(address.to_string())],
        )
    }
}

/// Decimals come back as a JSON number, though some nodes stringify them.
fn parse_decimals(value: &serde_json::Value) -> Result<u8, ChainError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed
        .and_then(|d| u8::try_from(d).ok())
        .ok_or_else(|| ChainError::new(format!("Invalid decimals value: {value}")))
}

/// Echelon entry function for a withdrawal.
pub fn withdraw_payload(
    echelon_address: &str,
    token_address: &str,
    amount: u64,
    pool_address: &str,
    fungible_asset: bool,
) -> EntryFunctionPayload {
    let arguments = vec![
        serde_json::Value::String(pool_address.to_string()),
        serde_json::Value::String(amount.to_string()),
    ];
    if fungible_asset {
        EntryFunctionPayload::new(
            format!("{echelon_address}::scripts::withdraw_fa"),
            vec![],
            arguments,
        )
    } else {
        EntryFunctionPayload::new(
            format!("{echelon_address}::scripts::withdraw"),
            vec![token_address.to_string()],
            arguments,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHELON: &str = "0xc6bc659f1649553c1a3fa05d9727433dc03843baac29473c817d06d39e7621ba";

    #[test]
    fn coin_withdraw_uses_type_argument() {
        let payload = withdraw_payload(
            ECHELON,
            "0x1::aptos_coin::AptosCoin",
            100_000_000,
            "0xpool",
            false,
        );
        assert_eq!(payload.function, format!("{ECHELON}::scripts::withdraw"));
        assert_eq!(payload.type_arguments, vec!["0x1::aptos_coin::AptosCoin"]);
        assert_eq!(
            payload.arguments,
            vec![serde_json::json!("0xpool"), serde_json::json!("100000000")]
        );
    }

    #[test]
    fn fungible_asset_withdraw_has_no_type_arguments() {
        let payload = withdraw_payload(ECHELON, "0x357b", 1_500_000, "0xpool", true);
        assert_eq!(payload.function, format!("{ECHELON}::scripts::withdraw_fa"));
        assert!(payload.type_arguments.is_empty());
        assert_eq!(payload.arguments[1], serde_json::json!("1500000"));
    }

    #[test]
    fn expiration_adds_ttl_to_clock() {
        assert_eq!(expiration_timestamp(1_700_000_000, 600), 1_700_000_600);
    }

    #[test]
    fn expiration_saturates_on_huge_ttl() {
        assert_eq!(expiration_timestamp(1_700_000_000, u64::MAX), u64::MAX);
        assert_eq!(expiration_timestamp(-5, 30), 30);
    }

    #[test]
    fn metadata_view_for_coin_type() {
        let (function, type_args, args) =
            metadata_view_call("0x1::aptos_coin::AptosCoin", "decimals");
        assert_eq!(function, "0x1::coin::decimals");
        assert_eq!(type_args, vec!["0x1::aptos_coin::AptosCoin"]);
        assert!(args.is_empty());
    }

    #[test]
    fn metadata_view_for_fungible_asset() {
        let (function, type_args, args) = metadata_view_call("0x357b", "symbol");
        assert_eq!(function, "0x1::fungible_asset::symbol");
        assert_eq!(type_args, vec![FA_METADATA_TYPE]);
        assert_eq!(args, vec![serde_json::json!("0x357b")]);
    }

    #[test]
    fn decimals_parse_from_number_or_string() {
        assert_eq!(parse_decimals(&serde_json::json!(8)).unwrap(), 8);
        assert_eq!(parse_decimals(&serde_json::json!("6")).unwrap(), 6);
        assert!(parse_decimals(&serde_json::json!(300)).is_err());
        assert!(parse_decimals(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn from_config_requires_private_key() {
        let config = AptosConfig::default();
        let err = AptosRuntime::from_config(&config).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("MISSING_KEY"));
    }

    #[test]
    fn catalog_lookup_goes_through_runtime() {
        let mut config = AptosConfig::default();
        config.private_key =
            Some("4d1f5b2a9c3e7f8061a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708".into());
        config.tokens.push(moverelay_config::TokenConfig {
            symbol: "APT".into(),
            name: "Aptos Coin".into(),
            token_address: Some("0x1::aptos_coin::AptosCoin".into()),
            pool_address: "0xpool".into(),
            decimals: Some(8),
        });
        let runtime = AptosRuntime::from_config(&config).unwrap();
        let token = runtime.get_token_by_name("apt").unwrap();
        assert_eq!(token.pool_address, "0xpool");
        assert!(runtime.get_token_by_name("nope").is_none());
        assert!(runtime.address().starts_with("0x"));
    }
}
