//! Ledger RPC client used to disburse test funds

use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Lamports per whole SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Credits a wallet with test funds.
///
/// Implementations report every failure as [`FaucetError::Downstream`]; the
/// caller does not retry.
#[async_trait]
pub trait Disburser: Send + Sync {
    /// Credit `address` with `lamports` and return the transaction signature.
    async fn disburse(&self, address: &str, lamports: u64) -> FaucetResult<String>;
}

/// Check that `address` is a base58-encoded 32 byte public key
pub fn parse_public_key(address: &str) -> FaucetResult<[u8; 32]> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| FaucetError::Downstream(format!("Invalid public key input: {}", e)))?;

    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        FaucetError::Downstream(format!(
            "Invalid public key input: expected 32 bytes, got {}",
            bytes.len()
        ))
    })
}

/// JSON-RPC client for a Solana-compatible ledger
pub struct SolanaRpcClient {
    rpc_url: String,
    commitment: String,
    client: reqwest::Client,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: String, commitment: String, timeout: Duration) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaucetError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            rpc_url,
            commitment,
            client,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> FaucetResult<serde_json::Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FaucetError::Downstream(format!("Request failed: {}", e)))?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FaucetError::Downstream(format!("Invalid response: {}", e)))?;

        if let Some(error) = json.get("error") {
            return Err(FaucetError::Downstream(error.to_string()));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| FaucetError::Downstream("Response has no result".to_string()))
    }
}

#[async_trait]
impl Disburser for SolanaRpcClient {
    async fn disburse(&self, address: &str, lamports: u64) -> FaucetResult<String> {
        parse_public_key(address)?;

        let result = self
            .call(
                "requestAirdrop",
                serde_json::json!([address, lamports, { "commitment": self.commitment }]),
            )
            .await?;

        let signature = result
            .as_str()
            .ok_or_else(|| FaucetError::Downstream(format!("Unexpected airdrop result: {}", result)))?
            .to_string();

        debug!(wallet = address, lamports, %signature, "Airdrop requested");
        Ok(signature)
    }
}
