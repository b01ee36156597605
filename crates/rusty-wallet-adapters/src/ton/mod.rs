mod connect;
mod manifest;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use rusty_wallet_core::{Blockchain, MessageEvent, MessagePort, WalletError};

use crate::config::WalletBridgeConfig;
use crate::correlator::ProviderChannel;
use crate::envelope::OriginGuard;
use crate::events::EventEmitter;

pub use connect::{
    error_codes, AppRequest, ConnectEvent, ConnectEventSuccess, ConnectItem, ConnectRequest,
    ErrorPayload, TonConnect, TonConnectError, WalletEvent, WalletInfo, WalletResponse,
};
pub use manifest::{AppManifest, HttpManifestFetcher};

struct TonInner {
    channel: ProviderChannel,
    events: Arc<EventEmitter>,
}

/// Bare `send(method, ...params)` shim over the TVM channel. Pushed
/// notifications are re-emitted under their own name.
#[derive(Clone)]
pub struct TonProvider {
    inner: Arc<TonInner>,
}

impl TonProvider {
    pub fn new(channel: ProviderChannel) -> Self {
        Self {
            inner: Arc::new(TonInner {
                channel,
                events: Arc::new(EventEmitter::new()),
            }),
        }
    }

    pub fn from_config(config: &WalletBridgeConfig, port: Arc<dyn MessagePort>) -> Self {
        Self::new(ProviderChannel::new(
            Blockchain::Tvm,
            OriginGuard::from_config(config),
            port,
        ))
    }

    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.inner.events
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.channel.correlator().pending_count()
    }

    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, WalletError> {
        if method.is_empty() {
            return Err(WalletError::InvalidRequest(
                "method must be a non-empty string".to_owned(),
            ));
        }
        self.inner
            .channel
            .request(method, Value::Array(params))
            .await
    }

    pub fn handle_message(&self, event: &MessageEvent) {
        if let Some(notification) = self.inner.channel.accept(event) {
            debug!(name = %notification.name, "ton notification");
            self.inner
                .events
                .emit(&notification.name, &notification.data);
        }
    }
}
