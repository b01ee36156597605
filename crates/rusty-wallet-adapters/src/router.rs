use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use rusty_wallet_core::WalletError;

use crate::events::Listener;
use crate::evm::{Eip1193Provider, EvmProvider, RequestArguments};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveProvider {
    Own,
    /// Index into the competing provider list.
    Competing(usize),
}

struct RouterState {
    current: ActiveProvider,
    competing: Vec<Arc<dyn Eip1193Provider>>,
}

/// Live indirection behind the global EVM injection point. Reads always go
/// through [`MultiProviderRouter::current`], so a handoff is visible without
/// re-injecting anything.
pub struct MultiProviderRouter {
    own: EvmProvider,
    state: Mutex<RouterState>,
}

impl MultiProviderRouter {
    pub fn new(own: EvmProvider) -> Self {
        Self {
            own,
            state: Mutex::new(RouterState {
                current: ActiveProvider::Own,
                competing: Vec::new(),
            }),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, RouterState>, WalletError> {
        self.state
            .lock()
            .map_err(|e| WalletError::Transport(format!("router lock poisoned: {e}")))
    }

    pub fn own(&self) -> &EvmProvider {
        &self.own
    }

    /// Another wallet tried to claim the injection point. It is remembered,
    /// not activated. Returns its index.
    pub fn register_competing_provider(
        &self,
        provider: Arc<dyn Eip1193Provider>,
    ) -> Result<usize, WalletError> {
        let mut g = self.lock_state()?;
        g.competing.push(provider);
        let index = g.competing.len() - 1;
        debug!(index, "competing provider registered");
        Ok(index)
    }

    pub fn competing_count(&self) -> usize {
        self.lock_state().map(|g| g.competing.len()).unwrap_or(0)
    }

    pub fn active(&self) -> Result<ActiveProvider, WalletError> {
        Ok(self.lock_state()?.current)
    }

    pub fn current(&self) -> Result<Arc<dyn Eip1193Provider>, WalletError> {
        let g = self.lock_state()?;
        match g.current {
            ActiveProvider::Own => Ok(Arc::new(self.own.clone())),
            ActiveProvider::Competing(index) => g
                .competing
                .get(index)
                .cloned()
                .ok_or_else(|| WalletError::Validation(format!("no competing provider #{index}"))),
        }
    }

    /// Routes to competing provider `index`. Leaving our own façade copies
    /// every registered listener onto the target first.
    pub fn switch_provider(&self, index: usize) -> Result<Arc<dyn Eip1193Provider>, WalletError> {
        let (target, leaving_own) = {
            let mut g = self.lock_state()?;
            let target = g.competing.get(index).cloned().ok_or_else(|| {
                WalletError::InvalidRequest(format!("no competing provider #{index}"))
            })?;
            let leaving_own = g.current == ActiveProvider::Own;
            g.current = ActiveProvider::Competing(index);
            (target, leaving_own)
        };
        if leaving_own {
            let pairs = self.own.events().listener_pairs();
            info!(index, listeners = pairs.len(), "handing off to competing provider");
            for (event, listener) in pairs {
                target.on(&event, listener);
            }
        }
        Ok(target)
    }

    pub fn switch_to_own(&self) -> Result<(), WalletError> {
        self.lock_state()?.current = ActiveProvider::Own;
        Ok(())
    }

    /// Sends through the current provider. A handoff signalled mid-call is
    /// followed once and the call is retried on the chosen provider.
    pub async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        let provider = self.current()?;
        match provider.request(args.clone()).await {
            Err(WalletError::ProviderOverridden(index)) => {
                let target = self.switch_provider(index)?;
                target.request(args).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Eip1193Provider for MultiProviderRouter {
    async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        MultiProviderRouter::request(self, args).await
    }

    fn on(&self, event: &str, listener: Listener) {
        match self.current() {
            Ok(provider) => provider.on(event, listener),
            Err(e) => debug!("dropping listener registration: {e}"),
        }
    }

    fn remove_listener(&self, event: &str, listener: &Listener) -> bool {
        self.current()
            .map(|provider| provider.remove_listener(event, listener))
            .unwrap_or(false)
    }
}
