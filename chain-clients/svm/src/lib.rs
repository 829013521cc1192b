//! SVM Client Module
//!
//! This module provides a client for reading ledger state from Solana RPC nodes
//! via their JSON-RPC API. It covers account lookups, token balances,
//! token-account discovery and signature status polling.

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC error code returned when a queried account does not exist.
pub const ACCOUNT_NOT_FOUND_CODE: i64 = -32602;

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// SVM JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// SVM JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Results that carry a slot context (`{"context": {...}, "value": ...}`)
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

/// Ledger commitment level used for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    /// True if this level is at least as strong as `other`.
    pub fn at_least(&self, other: Commitment) -> bool {
        self.rank() >= other.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            Commitment::Processed => 0,
            Commitment::Confirmed => 1,
            Commitment::Finalized => 2,
        }
    }
}

/// Raw account as returned by the RPC with `base64` encoding
#[derive(Debug, Deserialize)]
struct RawAccount {
    lamports: u64,
    owner: String,
    data: (String, String),
    #[serde(default)]
    executable: bool,
}

/// Decoded account state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Lamports held by the account (rent deposit for token accounts)
    pub lamports: u64,
    /// Owning program (base58)
    pub owner: String,
    /// Raw account data
    pub data: Vec<u8>,
    /// Whether the account holds a program
    pub executable: bool,
}

impl TryFrom<RawAccount> for AccountInfo {
    type Error = anyhow::Error;

    fn try_from(raw: RawAccount) -> Result<Self> {
        let (encoded, encoding) = raw.data;
        if encoding != "base64" {
            anyhow::bail!("Unexpected account data encoding: {}", encoding);
        }
        let data = general_purpose::STANDARD
            .decode(encoded)
            .context("Failed to decode account data from base64")?;
        Ok(Self {
            lamports: raw.lamports,
            owner: raw.owner,
            data,
            executable: raw.executable,
        })
    }
}

/// Account keyed by its address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedAccount {
    pub pubkey: String,
    pub account: AccountInfo,
}

#[derive(Debug, Deserialize)]
struct RawKeyedAccount {
    pubkey: String,
    account: RawAccount,
}

/// Token balance from getTokenAccountBalance
#[derive(Debug, Clone, Deserialize)]
struct RawTokenAmount {
    amount: String,
    decimals: u8,
}

/// Token balance in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    /// Raw amount in the token's smallest unit
    pub amount: u64,
    pub decimals: u8,
}

/// Blockhash from getLatestBlockhash
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlockhash {
    /// Base58 blockhash
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

/// Status of a submitted transaction signature
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: Option<u64>,
    /// Transaction error, `None` when the transaction succeeded
    pub err: Option<serde_json::Value>,
    /// "processed", "confirmed" or "finalized" (JSON-RPC uses camelCase)
    #[serde(rename = "confirmationStatus")]
    pub confirmation_status: Option<Commitment>,
}

impl SignatureStatus {
    /// True once the transaction reached at least `commitment`.
    pub fn reached(&self, commitment: Commitment) -> bool {
        self.confirmation_status
            .map(|status| status.at_least(commitment))
            .unwrap_or(false)
    }
}

/// Error raised by an RPC node, kept typed so callers can branch on the code.
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error: {} (code: {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

// ============================================================================
// SVM CLIENT IMPLEMENTATION
// ============================================================================

/// Client for reading Solana ledger state via JSON-RPC
#[derive(Clone)]
pub struct SvmClient {
    /// HTTP client for making requests
    client: Client,
    /// Base URL of the RPC node (e.g., "http://127.0.0.1:8899")
    base_url: String,
}

impl SvmClient {
    /// Creates a new SVM client for the given RPC URL
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - Base URL of the RPC node
    ///
    /// # Returns
    ///
    /// * `Ok(SvmClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create client
    pub fn new(rpc_url: &str) -> Result<Self> {
        Self::with_timeout(rpc_url, Duration::from_secs(30))
    }

    /// Creates a new SVM client with an explicit request timeout
    pub fn with_timeout(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy() // Avoid macOS system-configuration issues in tests
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: rpc_url.to_string(),
        })
    }

    /// Sends one JSON-RPC call and returns its `result` field.
    ///
    /// JSON-RPC errors are returned as a typed [`RpcError`] inside the
    /// `anyhow::Error` so callers can downcast and inspect the code.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        debug!("Sending {} request to {}", method, self.base_url);

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "HTTP {} from {} for {}: {}",
                status.as_u16(),
                self.base_url,
                method,
                body
            );
        }

        let response: JsonRpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response from {}", method, self.base_url))?;

        if let Some(error) = response.error {
            return Err(anyhow::Error::new(RpcError {
                code: error.code,
                message: error.message,
            })
            .context(format!("{} failed at {}", method, self.base_url)));
        }

        Ok(response.result)
    }

    /// Queries an account using getAccountInfo
    ///
    /// # Arguments
    ///
    /// * `pubkey` - Account address (base58)
    /// * `commitment` - Commitment level of the read
    ///
    /// # Returns
    ///
    /// * `Ok(Some(AccountInfo))` - Account exists
    /// * `Ok(None)` - Account does not exist on the ledger
    /// * `Err(anyhow::Error)` - Failed to query the account
    pub async fn get_account_info(
        &self,
        pubkey: &str,
        commitment: Commitment,
    ) -> Result<Option<AccountInfo>> {
        let params = vec![
            serde_json::json!(pubkey),
            serde_json::json!({"encoding": "base64", "commitment": commitment.as_str()}),
        ];

        let result: WithContext<Option<RawAccount>> = self
            .call("getAccountInfo", params)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No result in getAccountInfo response"))?;

        result.value.map(AccountInfo::try_from).transpose()
    }

    /// Queries the token balance of a token account using getTokenAccountBalance
    ///
    /// # Returns
    ///
    /// * `Ok(TokenAmount)` - Balance in base units
    /// * `Err(anyhow::Error)` - Failed to query the balance (including unknown accounts,
    ///   reported by the node as a JSON-RPC error with [`ACCOUNT_NOT_FOUND_CODE`])
    pub async fn get_token_account_balance(
        &self,
        pubkey: &str,
        commitment: Commitment,
    ) -> Result<TokenAmount> {
        let params = vec![
            serde_json::json!(pubkey),
            serde_json::json!({"commitment": commitment.as_str()}),
        ];

        let result: WithContext<RawTokenAmount> = self
            .call("getTokenAccountBalance", params)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No result in getTokenAccountBalance response"))?;

        // Amounts arrive as decimal strings so the full u64 range survives JSON
        let amount = result
            .value
            .amount
            .parse::<u64>()
            .with_context(|| format!("Invalid token amount '{}'", result.value.amount))?;

        Ok(TokenAmount {
            amount,
            decimals: result.value.decimals,
        })
    }

    /// Lists the token accounts of `owner` held under `program_id`
    pub async fn get_token_accounts_by_owner(
        &self,
        owner: &str,
        program_id: &str,
        commitment: Commitment,
    ) -> Result<Vec<KeyedAccount>> {
        let params = vec![
            serde_json::json!(owner),
            serde_json::json!({"programId": program_id}),
            serde_json::json!({"encoding": "base64", "commitment": commitment.as_str()}),
        ];

        let result: WithContext<Vec<RawKeyedAccount>> = self
            .call("getTokenAccountsByOwner", params)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No result in getTokenAccountsByOwner response"))?;

        result
            .value
            .into_iter()
            .map(|keyed| {
                Ok(KeyedAccount {
                    account: AccountInfo::try_from(keyed.account)
                        .with_context(|| format!("Invalid account data for {}", keyed.pubkey))?,
                    pubkey: keyed.pubkey,
                })
            })
            .collect()
    }

    /// Fetches the blockhash new transactions should be built against
    pub async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<LatestBlockhash> {
        let params = vec![serde_json::json!({"commitment": commitment.as_str()})];

        let result: WithContext<LatestBlockhash> = self
            .call("getLatestBlockhash", params)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No result in getLatestBlockhash response"))?;

        Ok(result.value)
    }

    /// Queries the status of one transaction signature using getSignatureStatuses
    ///
    /// # Returns
    ///
    /// * `Ok(Some(SignatureStatus))` - The node has seen the transaction
    /// * `Ok(None)` - Unknown signature (not landed yet, or dropped)
    /// * `Err(anyhow::Error)` - Failed to query the status
    pub async fn get_signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>> {
        let params = vec![
            serde_json::json!([signature]),
            serde_json::json!({"searchTransactionHistory": false}),
        ];

        let result: WithContext<Vec<Option<SignatureStatus>>> = self
            .call("getSignatureStatuses", params)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No result in getSignatureStatuses response"))?;

        Ok(result.value.into_iter().next().flatten())
    }

    /// Returns the base URL of this client
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// True if `error` carries the node's "account not found" JSON-RPC error.
pub fn is_account_not_found(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<RpcError>()
        .map(|rpc| rpc.code == ACCOUNT_NOT_FOUND_CODE && rpc.message.contains("could not find account"))
        .unwrap_or(false)
}
