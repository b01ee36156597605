use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

use rusty_wallet_core::{MessageEvent, MessagePort, WalletError, WireMessage};

use crate::config::WalletBridgeConfig;

fn window() -> Result<web_sys::Window, WalletError> {
    web_sys::window().ok_or_else(|| WalletError::Transport("no window in this context".to_owned()))
}

/// `href` of the current page, attached to outgoing requests.
pub fn page_href() -> Option<String> {
    web_sys::window().and_then(|w| w.location().href().ok())
}

/// [`MessagePort`] over `window.postMessage`, scoped to one target origin.
pub struct WindowMessagePort {
    target_origin: String,
}

impl WindowMessagePort {
    pub fn new(target_origin: impl Into<String>) -> Self {
        Self {
            target_origin: target_origin.into(),
        }
    }

    pub fn from_config(config: &WalletBridgeConfig) -> Self {
        Self::new(config.page_origin.clone())
    }
}

impl MessagePort for WindowMessagePort {
    fn post(&self, message: WireMessage) -> Result<(), WalletError> {
        let value = message
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| WalletError::Transport(format!("failed to encode message: {e}")))?;
        window()?
            .post_message(&value, &self.target_origin)
            .map_err(|e| WalletError::Transport(format!("postMessage failed: {e:?}")))
    }
}

/// Live `message` listener on the window. Dropping it uninstalls the
/// listener.
pub struct MessageListener {
    closure: Closure<dyn FnMut(web_sys::MessageEvent)>,
}

impl MessageListener {
    pub fn install(handler: impl Fn(MessageEvent) + 'static) -> Result<Self, WalletError> {
        let closure = Closure::<dyn FnMut(web_sys::MessageEvent)>::new(
            move |event: web_sys::MessageEvent| {
                let data: Value = match serde_wasm_bindgen::from_value(event.data()) {
                    Ok(data) => data,
                    Err(e) => {
                        debug!("ignoring non-json message: {e}");
                        return;
                    }
                };
                handler(MessageEvent::new(event.origin(), data));
            },
        );
        window()?
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            .map_err(|e| WalletError::Transport(format!("failed to add message listener: {e:?}")))?;
        Ok(Self { closure })
    }
}

impl Drop for MessageListener {
    fn drop(&mut self) {
        if let Some(w) = web_sys::window() {
            let _ = w.remove_event_listener_with_callback(
                "message",
                self.closure.as_ref().unchecked_ref(),
            );
        }
    }
}
