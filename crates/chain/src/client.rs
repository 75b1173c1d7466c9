//! Minimal Aptos fullnode REST client.
//!
//! Covers exactly what the runtime needs: account sequence numbers, view
//! functions, JSON transaction encoding/submission, and confirmation.

use moverelay_core::error::ChainError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to re-issue `wait_by_hash` before giving up.
const WAIT_ATTEMPTS: u32 = 10;

/// An entry-function payload in JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFunctionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<serde_json::Value>,
}

impl EntryFunctionPayload {
    pub fn new(
        function: impl Into<String>,
        type_arguments: Vec<String>,
        arguments: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            kind: "entry_function_payload".into(),
            function: function.into(),
            type_arguments,
            arguments,
        }
    }
}

/// An unsigned transaction. All u64 fields travel as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTransactionRequest {
    pub sender: String,
    pub sequence_number: String,
    pub max_gas_amount: String,
    pub gas_unit_price: String,
    pub expiration_timestamp_secs: String,
    pub payload: EntryFunctionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ed25519Signature {
    #[serde(rename = "type")]
    pub kind: String,
    pub public_key: String,
    pub signature: String,
}

/// A signed transaction ready for `POST /transactions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTransactionRequest {
    #[serde(flatten)]
    pub transaction: UserTransactionRequest,
    pub signature: Ed25519Signature,
}

/// The parts of a committed transaction the runtime inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct CommittedTransaction {
    #[serde(rename = "type")]
    pub kind: String,
    pub hash: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub vm_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    sequence_number: String,
}

#[derive(Debug, Deserialize)]
struct PendingTransaction {
    hash: String,
}

/// Error body returned by the fullnode on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    vm_error_code: Option<u64>,
}

#[derive(Debug)]
pub struct AptosClient {
    base_url: String,
    client: reqwest::Client,
}

impl AptosClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current sequence number of `address`.
    pub async fn account_sequence_number(&self, address: &str) -> Result<u64, ChainError> {
        let data: AccountData = self.get(&format!("/accounts/{address}")).await?;
        data.sequence_number
            .parse()
            .map_err(|e| ChainError::new(format!("Invalid sequence number: {e}")))
    }

    /// Call a view function and return its result values.
    pub async fn view(
        &self,
        function: &str,
        type_arguments: &[&str],
        arguments: Vec<serde_json::Value>,
    ) -> Result<Vec<serde_json::Value>, ChainError> {
        let body = serde_json::json!({
            "function": function,
            "type_arguments": type_arguments,
            "arguments": arguments,
        });
        self.post("/view", &body).await
    }

    /// Ask the node for the BCS signing message of a JSON transaction.
    pub async fn encode_submission(
        &self,
        request: &UserTransactionRequest,
    ) -> Result<Vec<u8>, ChainError> {
        let encoded: String = self.post("/transactions/encode_submission", request).await?;
        hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| ChainError::new(format!("Invalid signing message from node: {e}")))
    }

    /// Submit a signed transaction; returns its hash.
    pub async fn submit(&self, request: &SubmitTransactionRequest) -> Result<String, ChainError> {
        let pending: PendingTransaction = self.post("/transactions", request).await?;
        debug!(hash = %pending.hash, "Transaction submitted");
        Ok(pending.hash)
    }

    /// Block until `hash` leaves the mempool.
    pub async fn wait_for_transaction(&self, hash: &str) -> Result<CommittedTransaction, ChainError> {
        for attempt in 1..=WAIT_ATTEMPTS {
            let txn: CommittedTransaction = self
                .get(&format!("/transactions/wait_by_hash/{hash}"))
                .await?;
            if txn.kind != "pending_transaction" {
                return Ok(txn);
            }
            debug!(hash, attempt, "Transaction still pending");
        }
        Err(ChainError::with_code(
            format!("Transaction {hash} still pending after {WAIT_ATTEMPTS} waits"),
            "TRANSACTION_TIMEOUT",
        ))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::with_code(e.to_string(), "NETWORK_ERROR"))?;
        Self::decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ChainError::with_code(e.to_string(), "NETWORK_ERROR"))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ChainError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::with_code(e.to_string(), "NETWORK_ERROR"))?;

        if !(200..300).contains(&status) {
            warn!(status, body = %body, "Aptos node returned error");
            return Err(error_from_body(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ChainError::new(format!("Failed to parse node response: {e}")))
    }
}

/// Map a non-2xx node response to a `ChainError`, keeping the node's
/// machine-readable code when it sent one.
pub(crate) fn error_from_body(status: u16, body: &str) -> ChainError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => {
            let code = err
                .error_code
                .or_else(|| err.vm_error_code.map(|c| c.to_string()));
            ChainError {
                message: err.message,
                code,
            }
        }
        Err(_) => ChainError::with_code(
            format!("Aptos node returned HTTP {status}: {body}"),
            format!("HTTP_{status}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_keeps_error_code() {
        let err = error_from_body(
            404,
            r#"{"message":"Account not found by Address(0x1)","error_code":"account_not_found","vm_error_code":null}"#,
        );
        assert_eq!(err.message, "Account not found by Address(0x1)");
        assert_eq!(err.code.as_deref(), Some("account_not_found"));
    }

    #[test]
    fn error_body_falls_back_to_vm_code() {
        let err = error_from_body(400, r#"{"message":"Move abort","vm_error_code":4016}"#);
        assert_eq!(err.code.as_deref(), Some("4016"));
    }

    #[test]
    fn unparseable_error_body_uses_http_status() {
        let err = error_from_body(502, "Bad Gateway");
        assert!(err.message.contains("502"));
        assert_eq!(err.code.as_deref(), Some("HTTP_502"));
    }

    #[test]
    fn submit_request_flattens_transaction() {
        let request = SubmitTransactionRequest {
            transaction: UserTransactionRequest {
                sender: "0xabc".into(),
                sequence_number: "7".into(),
                max_gas_amount: "20000".into(),
                gas_unit_price: "100".into(),
                expiration_timestamp_secs: "1700000000".into(),
                payload: EntryFunctionPayload::new(
                    "0x1::aptos_account::transfer",
                    vec![],
                    vec![serde_json::json!("0xdef"), serde_json::json!("1")],
                ),
            },
            signature: Ed25519Signature {
                kind: "ed25519_signature".into(),
                public_key: "0x01".into(),
                signature: "0x02".into(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sender"], "0xabc");
        assert_eq!(json["sequence_number"], "7");
        assert_eq!(json["payload"]["type"], "entry_function_payload");
        assert_eq!(json["signature"]["type"], "ed25519_signature");
    }

    #[test]
    fn committed_transaction_parses() {
        let txn: CommittedTransaction = serde_json::from_str(
            r#"{"type":"user_transaction","hash":"0xfeed","success":false,"vm_status":"Move abort in 0x1::coin: EINSUFFICIENT_BALANCE"}"#,
        )
        .unwrap();
        assert_eq!(txn.success, Some(false));
        assert!(txn.vm_status.unwrap().contains("EINSUFFICIENT_BALANCE"));
    }
}
