use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use rusty_wallet_core::{KeyringStore, KeyringsMetadata, WalletError};

#[derive(Default)]
struct Records {
    vaults: HashMap<String, String>,
    metadata: HashMap<String, KeyringsMetadata>,
}

/// Process-local [`KeyringStore`]. Extension builds back this with
/// `chrome.storage`; tests and the host binary use it directly.
#[derive(Default)]
pub struct InMemoryKeyringStore {
    records: Mutex<Records>,
}

impl InMemoryKeyringStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, WalletError> {
        self.records
            .lock()
            .map_err(|e| WalletError::Transport(format!("keyring store lock poisoned: {e}")))
    }
}

#[async_trait]
impl KeyringStore for InMemoryKeyringStore {
    async fn load_vault(&self, user_id: &str) -> Result<Option<String>, WalletError> {
        Ok(self.lock()?.vaults.get(user_id).cloned())
    }

    async fn save_vault(&self, user_id: &str, vault: String) -> Result<(), WalletError> {
        self.lock()?.vaults.insert(user_id.to_owned(), vault);
        Ok(())
    }

    async fn load_metadata(&self, user_id: &str) -> Result<Option<KeyringsMetadata>, WalletError> {
        Ok(self.lock()?.metadata.get(user_id).cloned())
    }

    async fn save_metadata(
        &self,
        user_id: &str,
        metadata: KeyringsMetadata,
    ) -> Result<(), WalletError> {
        self.lock()?.metadata.insert(user_id.to_owned(), metadata);
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), WalletError> {
        let mut g = self.lock()?;
        g.vaults.remove(user_id);
        g.metadata.remove(user_id);
        Ok(())
    }
}
