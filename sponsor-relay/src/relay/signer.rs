//! Signer relay client
//!
//! The signer relay holds the fee-payer key. It co-signs a transaction
//! (`signTransaction`) or co-signs and broadcasts it (`signAndSendTransaction`).

use anyhow::Context;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::SponsorError;
use crate::transaction::{self, SIGNATURE_LEN};

/// Status used when the relay answers HTTP 200 with a JSON-RPC error
const RPC_ERROR_STATUS: u16 = 400;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

/// Transaction as returned by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Base58 signature of the fee payer (the transaction id)
    pub signature: String,
    /// Base64 fully-signed transaction, when the relay returned it
    pub transaction: Option<String>,
}

impl SignedTransaction {
    /// Raw bytes of the signed transaction
    pub fn bytes(&self) -> Result<Vec<u8>, SponsorError> {
        let encoded = self.transaction.as_deref().ok_or_else(|| {
            SponsorError::Internal(anyhow::anyhow!(
                "Relay did not return a signed transaction"
            ))
        })?;
        general_purpose::STANDARD
            .decode(encoded)
            .context("Relay returned an invalid base64 transaction")
            .map_err(SponsorError::Internal)
    }
}

/// JSON-RPC client for the signer relay
#[derive(Clone)]
pub struct SignerRelayClient {
    client: Client,
    endpoint: String,
}

impl SignerRelayClient {
    /// Creates a new relay client
    ///
    /// # Arguments
    ///
    /// * `endpoint` - JSON-RPC URL of the relay
    /// * `timeout` - Per-request timeout
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Co-signs the transaction without broadcasting it
    pub async fn sign_transaction(&self, transaction: &str) -> Result<SignedTransaction, SponsorError> {
        self.call("signTransaction", transaction).await
    }

    /// Co-signs and broadcasts the transaction through the relay
    pub async fn sign_and_send_transaction(
        &self,
        transaction: &str,
    ) -> Result<SignedTransaction, SponsorError> {
        self.call("signAndSendTransaction", transaction).await
    }

    async fn call(&self, method: &str, transaction: &str) -> Result<SignedTransaction, SponsorError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params: vec![transaction],
        };

        info!("Forwarding transaction to relay {} ({})", self.endpoint, method);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach relay at {}", self.endpoint))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read relay response")?;
        debug!("Relay responded with status {}", status.as_u16());

        if !status.is_success() {
            return Err(SponsorError::Relay {
                status: status.as_u16(),
                message: if body.is_empty() {
                    "No response".to_string()
                } else {
                    body
                },
            });
        }

        let response: JsonRpcResponse =
            serde_json::from_str(&body).context("Failed to parse relay response")?;

        if let Some(error) = response.error {
            let message = error
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(SponsorError::Relay {
                status: RPC_ERROR_STATUS,
                message,
            });
        }

        parse_sign_result(response.result.unwrap_or(serde_json::Value::Null))
    }
}

/// Extracts the signature (and signed transaction) from a relay result
///
/// The relay answers either with the signed transaction as a string, or with
/// an object carrying `signed_transaction` and/or `signature`.
pub fn parse_sign_result(result: serde_json::Value) -> Result<SignedTransaction, SponsorError> {
    let (encoded, signature) = match &result {
        serde_json::Value::String(encoded) => (Some(encoded.as_str()), None),
        serde_json::Value::Object(fields) => (
            fields.get("signed_transaction").and_then(|v| v.as_str()),
            fields.get("signature").and_then(|v| v.as_str()),
        ),
        _ => (None, None),
    };

    if let Some(encoded) = encoded {
        // A bare string may be the base58 signature itself; a signed
        // transaction is far longer than 64 bytes in either encoding
        if signature.is_none() && is_base58_signature(encoded) {
            return Ok(SignedTransaction {
                signature: encoded.to_string(),
                transaction: None,
            });
        }
        if let Some(signature) = signature_from_transaction(encoded) {
            return Ok(SignedTransaction {
                signature,
                transaction: Some(encoded.to_string()),
            });
        }
    }

    match signature {
        Some(signature) if is_base58_signature(signature) => Ok(SignedTransaction {
            signature: signature.to_string(),
            transaction: None,
        }),
        _ => Err(SponsorError::Internal(anyhow::anyhow!(
            "Unexpected relay response format"
        ))),
    }
}

fn signature_from_transaction(encoded: &str) -> Option<String> {
    let bytes = general_purpose::STANDARD.decode(encoded).ok()?;
    transaction::first_signature(&bytes).ok()
}

fn is_base58_signature(value: &str) -> bool {
    bs58::decode(value)
        .into_vec()
        .map(|bytes| bytes.len() == SIGNATURE_LEN)
        .unwrap_or(false)
}
