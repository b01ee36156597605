use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

use rusty_wallet_core::{SolanaRpc, WalletError};

use crate::config::WalletBridgeConfig;

/// JSON-RPC `sendTransaction` against a regular Solana node.
#[derive(Debug, Clone)]
pub struct HttpSolanaRpc {
    url: String,
    client: reqwest::Client,
}

impl HttpSolanaRpc {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| WalletError::Transport(format!("solana rpc client init failed: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn from_config(config: &WalletBridgeConfig) -> Result<Self, WalletError> {
        Self::new(config.solana_rpc_url.clone(), config.http_timeout_ms)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("solana rpc request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| WalletError::Transport(format!("solana rpc json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(WalletError::Transport(format!(
                "solana rpc status {status}: {body}"
            )));
        }
        if let Some(err) = body.get("error") {
            return Err(WalletError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("solana rpc error")
                    .to_owned(),
                data: err.get("data").cloned(),
            });
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| WalletError::Transport("solana rpc missing result".to_owned()))
    }
}

#[async_trait]
impl SolanaRpc for HttpSolanaRpc {
    async fn send_raw_transaction(&self, transaction: &[u8]) -> Result<String, WalletError> {
        let encoded = B64.encode(transaction);
        let result = self
            .call(
                "sendTransaction",
                json!([encoded, {"encoding": "base64", "preflightCommitment": "confirmed"}]),
            )
            .await?;
        let signature = result
            .as_str()
            .ok_or_else(|| WalletError::Transport("sendTransaction result must be a string".to_owned()))?;
        debug!(signature, "transaction submitted");
        Ok(signature.to_owned())
    }
}
