//! Echelon withdraw tool: pulls a supplied asset out of a lending position.
//!
//! The tool speaks a JSON-string contract: input is a JSON document with
//! `name`, `amount` and an optional `mint`; output is always a JSON
//! envelope with `status` of `success` or `error`. Failures never escape
//! as `Err`.

use crate::amount::{AmountError, to_base_units};
use async_trait::async_trait;
use moverelay_core::chain::ChainRuntime;
use moverelay_core::error::{ChainError, ToolError};
use moverelay_core::tool::{Tool, ToolResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const TOOL_NAME: &str = "echelon_withdraw_token";

/// Target used when neither the caller nor the catalog names an address.
pub const NATIVE_COIN: &str = "0x1::aptos_coin::AptosCoin";

const DEFAULT_DECIMALS: u8 = 8;
const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

const DESCRIPTION: &str = r#"this tool can be used to withdraw APT, tokens or fungible asset from a position

  if you want to withdraw APT, add "0x1::aptos_coin::AptosCoin" as mint
  if no mint is provided, send the mint blank. mint is optional in this case

  Inputs ( input is a JSON string ):
  name: string, eg "USDT" (required)
  amount: number, eg 1 or 0.01 (required)
  mint: string, eg "0xf22bede237a07e121b56d91a491eb7bcdfd1f5907926a9e58338f964a01b17fa::asset::USDT" (optional)
  "#;

/// Parsed tool input.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub name: String,
    pub amount: AmountInput,
    #[serde(default)]
    pub mint: Option<String>,
}

/// Amounts arrive as JSON numbers from most models, strings from some.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl AmountInput {
    fn as_decimal_string(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

/// The only two shapes the tool ever returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolEnvelope {
    Success {
        #[serde(rename = "withdrawTokenTransactionHash")]
        withdraw_token_transaction_hash: String,
        token: EnvelopeToken,
    },
    Error {
        message: String,
        code: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeToken {
    pub name: Option<String>,
    pub decimals: Option<u8>,
}

impl ToolEnvelope {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","message":"{e}","code":"{UNKNOWN_ERROR}"}}"#)
        })
    }
}

/// Internal failure carrying an optional machine-readable code.
#[derive(Debug)]
struct Failure {
    message: String,
    code: Option<String>,
}

impl Failure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }
}

impl From<ChainError> for Failure {
    fn from(e: ChainError) -> Self {
        Self {
            message: e.message,
            code: e.code,
        }
    }
}

impl From<AmountError> for Failure {
    fn from(e: AmountError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}

pub struct EchelonWithdrawTool {
    runtime: Arc<dyn ChainRuntime>,
}

impl EchelonWithdrawTool {
    pub fn new(runtime: Arc<dyn ChainRuntime>) -> Self {
        Self { runtime }
    }

    /// Run the tool on a JSON-string input and return the JSON envelope.
    pub async fn call(&self, input: &str) -> String {
        self.run(input).await.to_json()
    }

    /// Same as [`call`](Self::call) but returns the typed envelope.
    pub async fn run(&self, input: &str) -> ToolEnvelope {
        match self.withdraw(input).await {
            Ok(envelope) => envelope,
            Err(failure) => {
                warn!(error = %failure.message, code = ?failure.code, "Echelon withdraw failed");
                ToolEnvelope::Error {
                    message: failure.message,
                    code: failure.code.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                }
            }
        }
    }

    async fn withdraw(&self, input: &str) -> Result<ToolEnvelope, Failure> {
        let request: WithdrawRequest = serde_json::from_str(input)?;

        let token = self
            .runtime
            .get_token_by_name(&request.name)
            .ok_or_else(|| Failure::new("Token not found"))?;

        let token_address = token.token_address.as_deref().unwrap_or("");
        let target = request
            .mint
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or(Some(token_address).filter(|a| !a.is_empty()))
            .unwrap_or(NATIVE_COIN)
            .to_string();

        let details = self.runtime.get_token_details(&target).await?;
        let amount = to_base_units(
            &request.amount.as_decimal_string(),
            details.decimals.unwrap_or(DEFAULT_DECIMALS),
        )?;
        let fungible_asset = is_fungible_asset_address(token_address);

        info!(
            token = %token.symbol,
            target = %target,
            amount,
            fungible_asset,
            "Withdrawing from Echelon"
        );

        let hash = self
            .runtime
            .withdraw_token_with_echelon(&target, amount, &token.pool_address, fungible_asset)
            .await?;

        Ok(ToolEnvelope::Success {
            withdraw_token_transaction_hash: hash,
            token: EnvelopeToken {
                name: details.name,
                decimals: details.decimals,
            },
        })
    }
}

/// Coin types have exactly three `::`-separated segments
/// (`address::module::Struct`); anything else is a fungible asset.
pub fn is_fungible_asset_address(token_address: &str) -> bool {
    token_address.split("::").count() != 3
}

/// Unwrap the shapes an agent may hand us into the raw JSON string.
fn input_string(arguments: &serde_json::Value) -> String {
    if let Some(s) = arguments.as_str() {
        return s.to_string();
    }
    if let Some(map) = arguments.as_object()
        && let (1, Some(serde_json::Value::String(s))) = (map.len(), map.get("input"))
    {
        return s.clone();
    }
    arguments.to_string()
}

#[async_trait]
impl Tool for EchelonWithdrawTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Token symbol, e.g. \"USDT\""
                },
                "amount": {
                    "type": "number",
                    "description": "Amount to withdraw in human-readable units, e.g. 1 or 0.01"
                },
                "mint": {
                    "type": "string",
                    "description": "Token address; leave blank to use the catalog entry"
                }
            },
            "required": ["name", "amount"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let envelope = self.run(&input_string(&arguments)).await;
        Ok(ToolResult {
            call_id: String::new(),
            success: envelope.is_success(),
            output: envelope.to_json(),
            data: serde_json::to_value(&envelope).ok(),
        })
    }
}
