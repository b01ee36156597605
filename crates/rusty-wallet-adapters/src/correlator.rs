use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use rusty_wallet_core::{
    Blockchain, ChannelSet, Frame, MessageEvent, MessagePort, NotificationFrame, RequestFrame,
    ResponseFrame, WalletError,
};

use crate::envelope::{self, OriginGuard};

type Resolver = oneshot::Sender<Result<Value, WalletError>>;

/// Matches responses to outstanding requests by id. There is no timeout here;
/// a request that never gets an answer stays pending.
pub struct RequestCorrelator {
    channels: ChannelSet,
    port: Arc<dyn MessagePort>,
    href: Option<String>,
    iframe_identifiers: Vec<String>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Resolver>>,
}

impl RequestCorrelator {
    pub fn new(channels: ChannelSet, port: Arc<dyn MessagePort>) -> Self {
        Self {
            channels,
            port,
            href: None,
            iframe_identifiers: Vec::new(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_page(mut self, href: impl Into<String>, iframe_identifiers: Vec<String>) -> Self {
        self.href = Some(href.into());
        self.iframe_identifiers = iframe_identifiers;
        self
    }

    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        // The resolver must exist before the frame leaves: a loopback transport
        // can answer inside `post`.
        self.pending
            .lock()
            .map_err(|e| WalletError::Transport(format!("correlator lock poisoned: {e}")))?
            .insert(id, tx);
        let _pending = PendingEntry {
            pending: &self.pending,
            id,
        };

        let frame = Frame::Request(RequestFrame {
            channel: self.channels.request.to_owned(),
            id,
            method: method.to_owned(),
            params,
            href: self.href.clone(),
            iframe_identifiers: self.iframe_identifiers.clone(),
        });
        debug!(id, method, channel = self.channels.request, "posting request");
        self.port.post(envelope::encode(&frame))?;

        rx.await.map_err(|_| {
            WalletError::Transport(format!("resolver for request {id} dropped without response"))
        })?
    }

    /// Resolves the matching request. Unknown ids (duplicate delivery, stale
    /// ids after a reload) are logged and dropped.
    pub fn handle_response(&self, frame: ResponseFrame) -> bool {
        let resolver = match self.pending.lock() {
            Ok(mut g) => g.remove(&frame.id),
            Err(e) => {
                warn!("correlator lock poisoned: {e}");
                return false;
            }
        };
        match resolver {
            Some(tx) => {
                let outcome = frame.outcome.map_err(WalletError::from_rpc_error);
                if tx.send(outcome).is_err() {
                    debug!(id = frame.id, "caller no longer awaiting response");
                }
                true
            }
            None => {
                warn!(id = frame.id, channel = %frame.channel, "discarding response with no pending request");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|g| g.len()).unwrap_or(0)
    }
}

/// Removes a request's resolver once its caller stops waiting, whether the
/// request was answered, failed to post, or the future was dropped.
struct PendingEntry<'a> {
    pending: &'a Mutex<HashMap<u64, Resolver>>,
    id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if let Ok(mut g) = self.pending.lock() {
            if g.remove(&self.id).is_some() {
                debug!(id = self.id, "request abandoned before a response arrived");
            }
        }
    }
}

/// Page-side endpoint of one blockchain family: outbound requests through the
/// correlator, inbound traffic filtered by origin and channel.
pub struct ProviderChannel {
    blockchain: Blockchain,
    guard: OriginGuard,
    correlator: RequestCorrelator,
}

impl ProviderChannel {
    pub fn new(blockchain: Blockchain, guard: OriginGuard, port: Arc<dyn MessagePort>) -> Self {
        let correlator = RequestCorrelator::new(blockchain.channels(), port)
            .with_page(guard.page_origin().to_owned(), Vec::new());
        Self {
            blockchain,
            guard,
            correlator,
        }
    }

    pub fn blockchain(&self) -> Blockchain {
        self.blockchain
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        self.correlator.request(method, params).await
    }

    /// Routes one inbound message. Responses resolve their request; pushed
    /// notifications (re-tagged onto the response channel by the relay) are
    /// handed back to the façade.
    pub fn accept(&self, event: &MessageEvent) -> Option<NotificationFrame> {
        if !self.guard.is_valid_origin(event) {
            warn!(origin = %event.origin, "dropping message from untrusted origin");
            return None;
        }
        let frame = envelope::decode_value(&event.data)?;
        if frame.channel() != self.correlator.channels.response {
            return None;
        }
        match frame {
            Frame::Response(response) => {
                self.correlator.handle_response(response);
                None
            }
            Frame::Notification(notification) => Some(notification),
            Frame::Request(_) => None,
        }
    }
}
