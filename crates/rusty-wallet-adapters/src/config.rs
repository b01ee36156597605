use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How cross-context messages reach the page. Mobile WebView bridges deliver
/// messages with an empty origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Browser,
    MobileWebView,
}

impl RuntimeKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "browser" => Some(RuntimeKind::Browser),
            "mobile" | "mobile-webview" | "webview" => Some(RuntimeKind::MobileWebView),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfoConfig {
    pub name: String,
    pub icon: String,
    pub rdns: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfConfig {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kib: 65_536,
            argon2_iterations: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TonDeviceInfo {
    pub platform: String,
    pub app_name: String,
    pub app_version: String,
    pub max_protocol_version: u32,
    pub features: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct WalletBridgeConfig {
    pub page_origin: String,
    pub runtime: RuntimeKind,
    pub default_evm_chain_id: String,
    pub eip6963: ProviderInfoConfig,
    pub solana_rpc_url: String,
    pub solana_chains: Vec<String>,
    pub ton_max_protocol_version: u32,
    pub ton_device_info: TonDeviceInfo,
    pub http_timeout_ms: u64,
    pub kdf: KdfConfig,
}

impl Default for WalletBridgeConfig {
    fn default() -> Self {
        Self {
            page_origin: "https://localhost".to_owned(),
            runtime: RuntimeKind::Browser,
            default_evm_chain_id: "0x1".to_owned(),
            eip6963: ProviderInfoConfig {
                name: "Rusty Wallet".to_owned(),
                icon: "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciLz4="
                    .to_owned(),
                rdns: "io.rustywallet".to_owned(),
            },
            solana_rpc_url: "https://api.mainnet-beta.solana.com".to_owned(),
            solana_chains: vec!["solana:mainnet".to_owned()],
            ton_max_protocol_version: 2,
            ton_device_info: TonDeviceInfo {
                platform: "browser".to_owned(),
                app_name: "rusty-wallet".to_owned(),
                app_version: env!("CARGO_PKG_VERSION").to_owned(),
                max_protocol_version: 2,
                features: vec![
                    Value::String("SendTransaction".to_owned()),
                    serde_json::json!({"name": "SendTransaction", "maxMessages": 4}),
                ],
            },
            http_timeout_ms: 15_000,
            kdf: KdfConfig::default(),
        }
    }
}

impl WalletBridgeConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(origin) = std::env::var("RUSTY_WALLET_PAGE_ORIGIN") {
            cfg.page_origin = origin;
        }
        if let Some(runtime) = std::env::var("RUSTY_WALLET_RUNTIME")
            .ok()
            .and_then(|raw| RuntimeKind::parse(&raw))
        {
            cfg.runtime = runtime;
        }
        if let Ok(chain_id) = std::env::var("RUSTY_WALLET_EVM_CHAIN_ID") {
            cfg.default_evm_chain_id = chain_id;
        }
        if let Ok(url) = std::env::var("RUSTY_WALLET_SOLANA_RPC_URL") {
            cfg.solana_rpc_url = url;
        }
        if let Some(timeout) = std::env::var("RUSTY_WALLET_HTTP_TIMEOUT_MS")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            cfg.http_timeout_ms = timeout;
        }
        cfg
    }
}
