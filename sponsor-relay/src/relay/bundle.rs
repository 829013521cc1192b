//! Block-builder bundle submission

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SendBundleRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [Vec<&'a str>; 1],
}

#[derive(Debug, Deserialize)]
struct SendBundleResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

/// Client for `sendBundle` JSON-RPC endpoints
#[derive(Clone)]
pub struct BlockBuilderClient {
    client: Client,
}

impl BlockBuilderClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Submits a single-transaction bundle to one endpoint
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Bundle submission URL
    /// * `transaction` - Base58-encoded signed transaction
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Bundle id assigned by the builder
    /// * `Err(anyhow::Error)` - Transport failure, HTTP error or JSON-RPC error
    pub async fn send_bundle(&self, endpoint: &str, transaction: &str) -> Result<String> {
        let request = SendBundleRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "sendBundle",
            params: [vec![transaction]],
        };

        debug!("Submitting bundle to {}", endpoint);

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .context("request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {}: {}", status.as_u16(), body);
        }

        let response: SendBundleResponse = response.json().await.context("invalid response")?;

        if let Some(error) = response.error {
            let message = error
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            anyhow::bail!("{}", message);
        }

        response
            .result
            .ok_or_else(|| anyhow::anyhow!("no bundle id in response"))
    }
}
