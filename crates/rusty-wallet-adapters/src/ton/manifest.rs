use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rusty_wallet_core::{ManifestFetcher, WalletError};

use crate::config::WalletBridgeConfig;

/// The fields of `tonconnect-manifest.json` the wallet relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_use_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
}

impl AppManifest {
    pub fn parse(raw: &Value) -> Result<Self, WalletError> {
        let manifest: Self = serde_json::from_value(raw.clone())
            .map_err(|e| WalletError::Validation(format!("invalid manifest: {e}")))?;
        if manifest.url.is_empty() || manifest.name.is_empty() {
            return Err(WalletError::Validation(
                "manifest url and name must be non-empty".to_owned(),
            ));
        }
        Ok(manifest)
    }
}

#[derive(Debug, Clone)]
pub struct HttpManifestFetcher {
    client: reqwest::Client,
}

impl HttpManifestFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| WalletError::Transport(format!("manifest client init failed: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &WalletBridgeConfig) -> Result<Self, WalletError> {
        Self::new(config.http_timeout_ms)
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    /// Transport failures and non-2xx statuses are `Transport`; a body that
    /// is not JSON is `Validation`.
    async fn fetch(&self, url: &str) -> Result<Value, WalletError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("manifest request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::Transport(format!(
                "manifest fetch returned status {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| WalletError::Validation(format!("manifest is not json: {e}")))
    }
}
