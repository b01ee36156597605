use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use rusty_wallet_core::{
    BackgroundHandler, BackgroundRequest, Blockchain, Frame, MessagePort, NotificationFrame,
    ResponseFrame, WalletError, WireMessage,
};

use crate::envelope;

/// Privileged-side counterpart of the page correlators: answers request
/// frames through a [`BackgroundHandler`] and pushes notifications.
pub struct BackgroundEndpoint {
    handler: Arc<dyn BackgroundHandler>,
    port: Arc<dyn MessagePort>,
}

impl BackgroundEndpoint {
    pub fn new(handler: Arc<dyn BackgroundHandler>, port: Arc<dyn MessagePort>) -> Self {
        Self { handler, port }
    }

    /// Handles one message from the relay. Returns `Ok(false)` when the
    /// message is not a request on a known request channel.
    pub async fn handle_message(&self, message: WireMessage) -> Result<bool, WalletError> {
        let Some(Frame::Request(request)) = envelope::decode(&message) else {
            return Ok(false);
        };
        let Some(blockchain) = Blockchain::for_channel(&request.channel) else {
            warn!(channel = %request.channel, "request on unknown channel");
            return Ok(false);
        };
        if blockchain.channels().request != request.channel {
            return Ok(false);
        }

        debug!(id = request.id, method = %request.method, chain = blockchain.as_str(), "handling request");
        let outcome = self
            .handler
            .handle(BackgroundRequest {
                blockchain,
                method: request.method,
                params: request.params,
                href: request.href,
            })
            .await
            .map_err(|e| e.to_rpc_error());

        let response = Frame::Response(ResponseFrame {
            channel: blockchain.channels().response.to_owned(),
            id: request.id,
            outcome,
        });
        self.port.post(envelope::encode(&response))?;
        Ok(true)
    }

    pub fn push_notification(
        &self,
        blockchain: Blockchain,
        name: &str,
        data: Value,
    ) -> Result<(), WalletError> {
        let frame = Frame::Notification(NotificationFrame {
            channel: blockchain.channels().notification.to_owned(),
            name: name.to_owned(),
            data,
        });
        self.port.post(envelope::encode(&frame))
    }
}
