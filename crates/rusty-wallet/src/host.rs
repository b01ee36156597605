//! Page, relay and background contexts joined by in-process queues. This is
//! the only place the host touches message plumbing.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use rusty_wallet_adapters::{
    BackgroundEndpoint, ContextRelay, EvmProvider, HttpSolanaRpc, MultiProviderRouter,
    OriginGuard, SolanaProvider, TonProvider, WalletBridgeConfig,
};
use rusty_wallet_core::{BackgroundHandler, MessageEvent, MessagePort, WalletError, WireMessage};

/// [`MessagePort`] feeding an unbounded queue.
struct QueuePort {
    name: &'static str,
    tx: mpsc::UnboundedSender<WireMessage>,
}

impl MessagePort for QueuePort {
    fn post(&self, message: WireMessage) -> Result<(), WalletError> {
        self.tx
            .send(message)
            .map_err(|e| WalletError::Transport(format!("{} queue closed: {e}", self.name)))
    }
}

fn queue(name: &'static str) -> (Arc<QueuePort>, mpsc::UnboundedReceiver<WireMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(QueuePort { name, tx }), rx)
}

/// The page-side façades, wired to a running relay and wallet service.
pub struct PageProviders {
    pub ethereum: Arc<MultiProviderRouter>,
    pub solana: SolanaProvider,
    pub ton: TonProvider,
}

pub fn spawn(
    config: &WalletBridgeConfig,
    wallet: Arc<dyn BackgroundHandler>,
) -> Result<PageProviders, WalletError> {
    let (page_out, mut page_out_rx) = queue("page");
    let (to_page, mut to_page_rx) = queue("page inbox");
    let (to_background, mut to_background_rx) = queue("background");
    let (from_background, mut from_background_rx) = queue("relay");

    let evm = EvmProvider::from_config(config, page_out.clone())?;
    let rpc = Arc::new(HttpSolanaRpc::from_config(config)?);
    let solana = SolanaProvider::from_config(config, page_out.clone(), rpc);
    let ton = TonProvider::from_config(config, page_out);

    let relay = Arc::new(ContextRelay::for_all_blockchains(
        OriginGuard::from_config(config),
        to_page,
        to_background,
    ));
    let endpoint = BackgroundEndpoint::new(wallet, from_background);
    let origin = config.page_origin.clone();

    // page -> relay
    let page_relay = relay.clone();
    let page_origin = origin.clone();
    tokio::spawn(async move {
        while let Some(message) = page_out_rx.recv().await {
            let data = match serde_json::to_value(&message) {
                Ok(data) => data,
                Err(e) => {
                    warn!("dropping unencodable page message: {e}");
                    continue;
                }
            };
            if let Err(e) = page_relay.on_page_message(&MessageEvent::new(page_origin.clone(), data)) {
                warn!("relay rejected page message: {e}");
            }
        }
        debug!("page queue closed");
    });

    // relay -> background
    tokio::spawn(async move {
        while let Some(message) = to_background_rx.recv().await {
            if let Err(e) = endpoint.handle_message(message).await {
                warn!("background failed to answer: {e}");
            }
        }
        debug!("background queue closed");
    });

    // background -> relay
    tokio::spawn(async move {
        while let Some(message) = from_background_rx.recv().await {
            if let Err(e) = relay.on_background_message(message) {
                warn!("relay rejected background message: {e}");
            }
        }
        debug!("relay queue closed");
    });

    // relay -> page; every façade filters its own channels.
    let (page_evm, page_solana, page_ton) = (evm.clone(), solana.clone(), ton.clone());
    tokio::spawn(async move {
        while let Some(message) = to_page_rx.recv().await {
            let data = match serde_json::to_value(&message) {
                Ok(data) => data,
                Err(e) => {
                    warn!("dropping unencodable relay message: {e}");
                    continue;
                }
            };
            let event = MessageEvent::new(origin.clone(), data);
            if let Err(e) = page_evm.handle_message(&event) {
                warn!("ethereum provider failed on message: {e}");
            }
            if let Err(e) = page_solana.handle_message(&event) {
                warn!("solana provider failed on message: {e}");
            }
            page_ton.handle_message(&event);
        }
        debug!("page inbox closed");
    });

    Ok(PageProviders {
        ethereum: Arc::new(MultiProviderRouter::new(evm)),
        solana,
        ton,
    })
}
