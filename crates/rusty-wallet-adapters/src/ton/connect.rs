use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use rusty_wallet_core::{ManifestFetcher, WalletError};

use crate::config::{TonDeviceInfo, WalletBridgeConfig};
use crate::events::{listener, EventEmitter, Listener, Unsubscribe};

use super::manifest::AppManifest;
use super::TonProvider;

pub mod error_codes {
    pub const UNKNOWN_ERROR: u16 = 0;
    pub const BAD_REQUEST: u16 = 1;
    pub const MANIFEST_NOT_FOUND: u16 = 2;
    pub const MANIFEST_CONTENT_ERROR: u16 = 3;
    pub const UNKNOWN_APP: u16 = 100;
    pub const USER_REJECTS: u16 = 300;
    pub const METHOD_NOT_SUPPORTED: u16 = 400;
}

use error_codes::*;

const WALLET_EVENT: &str = "wallet-event";
const SUPPORTED_APP_METHODS: [&str; 3] = ["sendTransaction", "signData", "disconnect"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct TonConnectError {
    pub message: String,
    pub code: u16,
}

impl TonConnectError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl From<WalletError> for TonConnectError {
    fn from(err: WalletError) -> Self {
        let code = match &err {
            WalletError::UserRejected => USER_REJECTS,
            WalletError::InvalidRequest(_) | WalletError::ProtocolVersionUnsupported { .. } => {
                BAD_REQUEST
            }
            WalletError::UnsupportedMethod(_) => METHOD_NOT_SUPPORTED,
            WalletError::Rpc { code, .. } => match u16::try_from(*code) {
                Ok(c @ (BAD_REQUEST | UNKNOWN_APP | USER_REJECTS | METHOD_NOT_SUPPORTED)) => c,
                _ => UNKNOWN_ERROR,
            },
            _ => UNKNOWN_ERROR,
        };
        let message = match err {
            WalletError::Rpc { message, .. } => message,
            other => other.to_string(),
        };
        Self { message, code }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum ConnectItem {
    #[serde(rename = "ton_addr")]
    TonAddr,
    #[serde(rename = "ton_proof")]
    TonProof { payload: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub manifest_url: String,
    pub items: Vec<ConnectItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

impl From<TonConnectError> for ErrorPayload {
    fn from(err: TonConnectError) -> Self {
        Self {
            code: err.code,
            message: err.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectEventSuccess {
    pub items: Vec<Value>,
    pub device: TonDeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectEvent {
    Connect { id: u64, payload: ConnectEventSuccess },
    ConnectError { id: u64, payload: ErrorPayload },
}

impl ConnectEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, ConnectEvent::ConnectError { .. })
    }

    pub fn error_code(&self) -> Option<u16> {
        match self {
            ConnectEvent::ConnectError { payload, .. } => Some(payload.code),
            ConnectEvent::Connect { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRequest {
    pub method: String,
    pub params: Vec<String>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WalletResponse {
    Success { id: String, result: Value },
    Error { id: String, error: ErrorPayload },
}

/// Events delivered to `listen` subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalletEvent {
    Connect { id: u64, payload: ConnectEventSuccess },
    ConnectError { id: u64, payload: ErrorPayload },
    Disconnect { id: u64, payload: Value },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub name: String,
    pub app_name: String,
    pub image: String,
    pub platforms: Vec<String>,
}

type SharedConnect = Shared<BoxFuture<'static, ConnectEvent>>;

struct BridgeShared {
    provider: TonProvider,
    manifests: Arc<dyn ManifestFetcher>,
    device: TonDeviceInfo,
    next_event_id: AtomicU64,
    listeners: Arc<EventEmitter>,
    in_flight_connect: Mutex<Option<SharedConnect>>,
}

/// TonConnect bridge surface over [`TonProvider`]. Every failure reaches the
/// dApp as a coded event or response, never as a raw error.
#[derive(Clone)]
pub struct TonConnect {
    shared: Arc<BridgeShared>,
    max_protocol_version: u32,
    wallet_info: WalletInfo,
}

impl TonConnect {
    pub fn new(
        provider: TonProvider,
        manifests: Arc<dyn ManifestFetcher>,
        config: &WalletBridgeConfig,
    ) -> Self {
        let shared = Arc::new(BridgeShared {
            provider,
            manifests,
            device: config.ton_device_info.clone(),
            next_event_id: AtomicU64::new(1),
            listeners: Arc::new(EventEmitter::new()),
            in_flight_connect: Mutex::new(None),
        });

        // Background-pushed disconnects reach listeners as wallet events.
        let weak = Arc::downgrade(&shared);
        shared.provider.events().on(
            "disconnected",
            listener(move |_| {
                if let Some(shared) = weak.upgrade() {
                    shared.emit_disconnect();
                }
            }),
        );

        Self {
            shared,
            max_protocol_version: config.ton_max_protocol_version,
            wallet_info: WalletInfo {
                name: config.eip6963.name.clone(),
                app_name: config.ton_device_info.app_name.clone(),
                image: config.eip6963.icon.clone(),
                platforms: vec![config.ton_device_info.platform.clone()],
            },
        }
    }

    pub fn device_info(&self) -> &TonDeviceInfo {
        &self.shared.device
    }

    pub fn wallet_info(&self) -> &WalletInfo {
        &self.wallet_info
    }

    pub fn protocol_version(&self) -> u32 {
        self.max_protocol_version
    }

    /// Versions newer than supported are refused without contacting the
    /// background.
    pub async fn connect(&self, protocol_version: u32, request: ConnectRequest) -> ConnectEvent {
        if protocol_version > self.max_protocol_version {
            warn!(
                requested = protocol_version,
                supported = self.max_protocol_version,
                "rejecting tonconnect protocol version"
            );
            let err: TonConnectError = WalletError::ProtocolVersionUnsupported {
                requested: protocol_version,
                supported: self.max_protocol_version,
            }
            .into();
            return self.shared.connect_error(err);
        }
        match self.connect_request(protocol_version, request) {
            Ok(shared) => shared.await,
            Err(e) => self.shared.connect_error(e.into()),
        }
    }

    fn connect_request(
        &self,
        protocol_version: u32,
        request: ConnectRequest,
    ) -> Result<SharedConnect, WalletError> {
        let mut slot = self
            .shared
            .in_flight_connect
            .lock()
            .map_err(|e| WalletError::Transport(format!("tonconnect lock poisoned: {e}")))?;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        let shared = Arc::clone(&self.shared);
        let future = async move {
            let event = match shared.run_connect(protocol_version, request).await {
                Ok(items) => shared.connect_success(items),
                Err(e) => shared.connect_error(e),
            };
            if let Ok(mut slot) = shared.in_flight_connect.lock() {
                *slot = None;
            }
            event
        }
        .boxed()
        .shared();
        *slot = Some(future.clone());
        Ok(future)
    }

    pub async fn restore_connection(&self) -> ConnectEvent {
        match self.shared.provider.send("restoreConnection", Vec::new()).await {
            Ok(result) => self.shared.connect_success(items_of(result)),
            Err(e) => self.shared.connect_error(e.into()),
        }
    }

    /// Unknown methods are answered locally with `METHOD_NOT_SUPPORTED`.
    pub async fn send(&self, request: AppRequest) -> WalletResponse {
        if !SUPPORTED_APP_METHODS.contains(&request.method.as_str()) {
            return WalletResponse::Error {
                id: request.id,
                error: ErrorPayload {
                    code: METHOD_NOT_SUPPORTED,
                    message: format!("method {} is not supported", request.method),
                },
            };
        }
        let payload = json!({
            "method": request.method,
            "params": request.params,
            "id": request.id,
        });
        match self.shared.provider.send("send", vec![payload]).await {
            Ok(result) => WalletResponse::Success {
                id: request.id,
                result,
            },
            Err(e) => WalletResponse::Error {
                id: request.id,
                error: TonConnectError::from(e).into(),
            },
        }
    }

    pub async fn disconnect(&self) -> Result<(), TonConnectError> {
        self.shared.provider.send("disconnect", Vec::new()).await?;
        self.shared.emit_disconnect();
        Ok(())
    }

    /// Subscribes to wallet events. The returned closure unsubscribes.
    pub fn listen(&self, callback: impl Fn(WalletEvent) + Send + Sync + 'static) -> Unsubscribe {
        let wrapped: Listener = listener(move |raw| match serde_json::from_value(raw.clone()) {
            Ok(event) => callback(event),
            Err(e) => debug!("dropping malformed wallet event: {e}"),
        });
        self.shared.listeners.subscribe(WALLET_EVENT, wrapped)
    }
}

impl BridgeShared {
    fn next_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn run_connect(
        &self,
        protocol_version: u32,
        request: ConnectRequest,
    ) -> Result<Vec<Value>, TonConnectError> {
        let raw = self
            .manifests
            .fetch(&request.manifest_url)
            .await
            .map_err(|e| match e {
                WalletError::Validation(msg) => TonConnectError::new(MANIFEST_CONTENT_ERROR, msg),
                other => TonConnectError::new(MANIFEST_NOT_FOUND, other.to_string()),
            })?;
        let manifest = AppManifest::parse(&raw)
            .map_err(|e| TonConnectError::new(MANIFEST_CONTENT_ERROR, e.to_string()))?;
        info!(app = %manifest.name, "tonconnect connect request");

        let params = vec![
            json!(protocol_version),
            serde_json::to_value(&request)
                .map_err(|e| TonConnectError::new(BAD_REQUEST, e.to_string()))?,
            serde_json::to_value(&manifest)
                .map_err(|e| TonConnectError::new(MANIFEST_CONTENT_ERROR, e.to_string()))?,
        ];
        let result = self.provider.send("connect", params).await?;
        Ok(items_of(result))
    }

    fn connect_success(&self, items: Vec<Value>) -> ConnectEvent {
        ConnectEvent::Connect {
            id: self.next_id(),
            payload: ConnectEventSuccess {
                items,
                device: self.device.clone(),
            },
        }
    }

    fn connect_error(&self, err: TonConnectError) -> ConnectEvent {
        ConnectEvent::ConnectError {
            id: self.next_id(),
            payload: err.into(),
        }
    }

    fn emit_disconnect(&self) {
        let event = WalletEvent::Disconnect {
            id: self.next_id(),
            payload: json!({}),
        };
        match serde_json::to_value(&event) {
            Ok(raw) => {
                self.listeners.emit(WALLET_EVENT, &raw);
            }
            Err(e) => warn!("failed to encode disconnect event: {e}"),
        }
    }
}

/// Accepts either a bare item list or `{items: [...]}`.
fn items_of(result: Value) -> Vec<Value> {
    match result {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
