use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use rusty_wallet_core::{Blockchain, MessageEvent, MessagePort, WalletError, WireMessage};

use crate::envelope::OriginGuard;

/// Pass-through running in the isolated relay context. It never looks at
/// `detail`; routing is by channel name only.
pub struct ContextRelay {
    guard: OriginGuard,
    page: Arc<dyn MessagePort>,
    background: Arc<dyn MessagePort>,
    // request channel -> response channel
    forward: HashMap<String, String>,
    // notification channel -> response channel
    reverse: HashMap<String, String>,
}

impl ContextRelay {
    pub fn new(
        guard: OriginGuard,
        page: Arc<dyn MessagePort>,
        background: Arc<dyn MessagePort>,
    ) -> Self {
        Self {
            guard,
            page,
            background,
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    /// One forward and one reverse pair per blockchain family.
    pub fn for_all_blockchains(
        guard: OriginGuard,
        page: Arc<dyn MessagePort>,
        background: Arc<dyn MessagePort>,
    ) -> Self {
        Blockchain::ALL
            .into_iter()
            .fold(Self::new(guard, page, background), |relay, chain| {
                let set = chain.channels();
                relay
                    .forward(set.request, set.response)
                    .reverse(set.notification, set.response)
            })
    }

    /// Requests on `request_channel` go page -> background unchanged, responses
    /// on `response_channel` come back unchanged.
    pub fn forward(mut self, request_channel: &str, response_channel: &str) -> Self {
        self.forward
            .insert(request_channel.to_owned(), response_channel.to_owned());
        self
    }

    /// Pushed notifications are re-tagged as `response_channel` so the page
    /// needs a single subscription per family.
    pub fn reverse(mut self, notification_channel: &str, response_channel: &str) -> Self {
        self.reverse
            .insert(notification_channel.to_owned(), response_channel.to_owned());
        self
    }

    pub fn on_page_message(&self, event: &MessageEvent) -> Result<bool, WalletError> {
        if !self.guard.is_valid_origin(event) {
            warn!(origin = %event.origin, "relay dropping message from untrusted origin");
            return Ok(false);
        }
        let Ok(message) = serde_json::from_value::<WireMessage>(event.data.clone()) else {
            return Ok(false);
        };
        if !self.forward.contains_key(&message.kind) {
            return Ok(false);
        }
        debug!(channel = %message.kind, "relaying page -> background");
        self.background.post(message)?;
        Ok(true)
    }

    pub fn on_background_message(&self, mut message: WireMessage) -> Result<bool, WalletError> {
        if self.forward.values().any(|response| *response == message.kind) {
            debug!(channel = %message.kind, "relaying background -> page");
            self.page.post(message)?;
            return Ok(true);
        }
        if let Some(response) = self.reverse.get(&message.kind) {
            debug!(from = %message.kind, to = %response, "relaying notification -> page");
            message.kind = response.clone();
            self.page.post(message)?;
            return Ok(true);
        }
        Ok(false)
    }
}
