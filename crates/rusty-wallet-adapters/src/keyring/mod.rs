mod derive;
mod store;
mod vault;

use std::sync::Arc;

use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::SignerSync;
use ed25519_dalek::{Signer as _, SigningKey};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use rusty_wallet_core::{
    Blockchain, Keyring, KeyringStore, KeyringsMetadata, PersonalWallet, PublicKeyInfo,
    WalletError,
};

use crate::config::KdfConfig;
use crate::signers::payload;
use crate::solana::{fill_signature, WireLayout};

pub use derive::{
    default_path, ed25519_key, evm_signer, keyring_identifier, new_keyring, parse_path,
    path_indices, public_key_info, svm_address, tvm_address, EVM_DEFAULT_PATH, SVM_DEFAULT_PATH,
    TVM_DEFAULT_PATH,
};
pub use store::InMemoryKeyringStore;
pub use vault::{metadata_of, KeyringMap, SealedVault};

/// Encrypted per-user keyrings and the blockchain-specific sign operations
/// built on them.
pub struct KeyringService {
    store: Arc<dyn KeyringStore>,
    kdf: KdfConfig,
    // Serializes read-modify-write cycles on the vault.
    write_lock: AsyncMutex<()>,
}

impl KeyringService {
    pub fn new(store: Arc<dyn KeyringStore>, kdf: KdfConfig) -> Self {
        Self {
            store,
            kdf,
            write_lock: AsyncMutex::new(()),
        }
    }

    pub async fn has_keyrings(&self, user_id: &str) -> Result<bool, WalletError> {
        Ok(self.store.load_vault(user_id).await?.is_some())
    }

    /// Decrypts the whole vault. A wrong password is `Decrypt`.
    pub async fn get_user_keyrings(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<KeyringMap, WalletError> {
        let Some(sealed) = self.store.load_vault(user_id).await? else {
            return Ok(KeyringMap::new());
        };
        let opened = vault::open(password, &sealed, &self.kdf)?;

        // The index is stored in the clear; repair it if it drifted.
        let stored = self.store.load_metadata(user_id).await?.unwrap_or_default();
        if !opened.metadata_matches(&stored)? {
            warn!(user_id, "keyring metadata index out of sync with vault, rebuilding");
            self.store
                .save_metadata(user_id, metadata_of(&opened.keyrings))
                .await?;
        }
        Ok(opened.keyrings)
    }

    /// Adds `keyring` to the vault, creating the vault if needed. The
    /// identifier must be the one derived from the secret, and may never
    /// change type. Re-importing the same type leaves the stored secret
    /// untouched.
    pub async fn create_keyring(
        &self,
        user_id: &str,
        password: &str,
        keyring: Option<Keyring>,
    ) -> Result<(), WalletError> {
        let _guard = self.write_lock.lock().await;
        let mut keyrings = self.get_user_keyrings(user_id, password).await?;
        let vault_exists = self.has_keyrings(user_id).await?;

        if let Some(keyring) = keyring {
            let derived = keyring_identifier(keyring.kind, keyring.blockchain, &keyring.value)?;
            if derived != keyring.keyring_identifier {
                return Err(WalletError::Validation(format!(
                    "keyring identifier {} does not match its secret",
                    keyring.keyring_identifier
                )));
            }
            if let Some(existing) = keyrings.get(&keyring.keyring_identifier) {
                if existing.kind != keyring.kind {
                    return Err(WalletError::KeyringTypeMismatch {
                        identifier: keyring.keyring_identifier.clone(),
                        existing: existing.kind,
                        requested: keyring.kind,
                    });
                }
                debug!(identifier = %keyring.keyring_identifier, "keyring already present");
                if vault_exists {
                    return Ok(());
                }
            } else {
                info!(
                    identifier = %keyring.keyring_identifier,
                    blockchain = keyring.blockchain.as_str(),
                    "adding keyring"
                );
                keyrings.insert(keyring.keyring_identifier.clone(), keyring);
            }
        } else if vault_exists {
            return Ok(());
        }

        self.persist(user_id, password, &keyrings).await
    }

    pub async fn delete_keyrings(
        &self,
        user_id: &str,
        password: &str,
        identifiers: &[String],
    ) -> Result<(), WalletError> {
        let _guard = self.write_lock.lock().await;
        let mut keyrings = self.get_user_keyrings(user_id, password).await?;
        let before = keyrings.len();
        for id in identifiers {
            keyrings.remove(id);
        }
        info!(user_id, removed = before - keyrings.len(), "deleting keyrings");
        self.persist(user_id, password, &keyrings).await
    }

    /// Wipes vault and index without needing the password.
    pub async fn reset_keyrings(&self, user_id: &str) -> Result<(), WalletError> {
        let _guard = self.write_lock.lock().await;
        info!(user_id, "resetting keyrings");
        self.store.clear(user_id).await
    }

    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), WalletError> {
        let _guard = self.write_lock.lock().await;
        let keyrings = self.get_user_keyrings(user_id, old_password).await?;
        info!(user_id, "re-encrypting keyrings under new password");
        self.persist(user_id, new_password, &keyrings).await
    }

    pub async fn get_keyrings_metadata(
        &self,
        user_id: &str,
    ) -> Result<KeyringsMetadata, WalletError> {
        Ok(self.store.load_metadata(user_id).await?.unwrap_or_default())
    }

    /// Capability check against the unencrypted index.
    pub async fn has_keyring(&self, user_id: &str, identifier: &str) -> Result<bool, WalletError> {
        Ok(self.get_keyrings_metadata(user_id).await?.contains_key(identifier))
    }

    pub async fn get_public_key(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        blockchain: Blockchain,
    ) -> Result<PublicKeyInfo, WalletError> {
        let keyring = self.resolve(user_id, password, wallet).await?;
        public_key_info(&keyring, blockchain, wallet.derivation_path.as_deref())
    }

    async fn persist(
        &self,
        user_id: &str,
        password: &str,
        keyrings: &KeyringMap,
    ) -> Result<(), WalletError> {
        let (sealed, metadata) = vault::seal(password, keyrings, &self.kdf)?;
        self.store.save_vault(user_id, sealed).await?;
        self.store.save_metadata(user_id, metadata).await
    }

    /// Finds the keyring behind `wallet` and checks the declared type.
    async fn resolve(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
    ) -> Result<Keyring, WalletError> {
        let requested = wallet.wallet_type.keyring_type().ok_or_else(|| {
            WalletError::UnsupportedWalletType(format!(
                "{} wallets hold no local keyring",
                wallet.wallet_type
            ))
        })?;
        let identifier = wallet.keyring_identifier.as_deref().ok_or_else(|| {
            WalletError::KeyringNotFound(format!("wallet {} has no keyring identifier", wallet.address))
        })?;
        let mut keyrings = self.get_user_keyrings(user_id, password).await?;
        let keyring = keyrings
            .remove(identifier)
            .ok_or_else(|| WalletError::KeyringNotFound(identifier.to_owned()))?;
        if keyring.kind != requested {
            return Err(WalletError::KeyringTypeMismatch {
                identifier: identifier.to_owned(),
                existing: keyring.kind,
                requested,
            });
        }
        Ok(keyring)
    }

    async fn resolve_for(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        blockchain: Blockchain,
    ) -> Result<Keyring, WalletError> {
        let keyring = self.resolve(user_id, password, wallet).await?;
        if keyring.blockchain != blockchain {
            return Err(WalletError::Validation(format!(
                "keyring {} is a {} keyring",
                keyring.keyring_identifier,
                keyring.blockchain.as_str()
            )));
        }
        Ok(keyring)
    }

    async fn evm_signer_for(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
    ) -> Result<alloy::signers::local::PrivateKeySigner, WalletError> {
        let keyring = self.resolve_for(user_id, password, wallet, Blockchain::Evm).await?;
        let signer = evm_signer(&keyring, wallet.derivation_path.as_deref())?;
        let derived = signer.address().to_checksum(None);
        ensure_same_address(&derived, &wallet.address, true)?;
        Ok(signer)
    }

    async fn ed25519_for(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        blockchain: Blockchain,
    ) -> Result<SigningKey, WalletError> {
        let keyring = self.resolve_for(user_id, password, wallet, blockchain).await?;
        let key = ed25519_key(&keyring, wallet.derivation_path.as_deref())?;
        let derived = match blockchain {
            Blockchain::Svm => svm_address(&key.verifying_key()),
            _ => tvm_address(&key.verifying_key()),
        };
        ensure_same_address(&derived, &wallet.address, false)?;
        Ok(key)
    }

    pub async fn sign_evm_message(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Bytes, WalletError> {
        let signer = self.evm_signer_for(user_id, password, wallet).await?;
        let signature = signer
            .sign_message_sync(message)
            .map_err(|e| WalletError::Validation(format!("evm message signing failed: {e}")))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    pub async fn sign_evm_typed_data(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        typed_data: &Value,
    ) -> Result<Bytes, WalletError> {
        let hash = payload::typed_data_hash(&payload::parse_typed_data(typed_data)?)?;
        let signer = self.evm_signer_for(user_id, password, wallet).await?;
        let signature = signer
            .sign_hash_sync(&hash)
            .map_err(|e| WalletError::Validation(format!("typed data signing failed: {e}")))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    pub async fn sign_evm_transaction(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        tx: &TransactionRequest,
    ) -> Result<Bytes, WalletError> {
        let hash = payload::transaction_hash(tx)?;
        let signer = self.evm_signer_for(user_id, password, wallet).await?;
        let signature = signer
            .sign_hash_sync(&hash)
            .map_err(|e| WalletError::Validation(format!("transaction signing failed: {e}")))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    pub async fn sign_svm_message(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let key = self.ed25519_for(user_id, password, wallet, Blockchain::Svm).await?;
        Ok(key.sign(message).to_bytes().to_vec())
    }

    /// Returns the wire transaction with this wallet's slot signed.
    pub async fn sign_svm_transaction(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        transaction: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let layout = WireLayout::parse(transaction)?;
        let key = self.ed25519_for(user_id, password, wallet, Blockchain::Svm).await?;
        let signature = key.sign(layout.message(transaction));
        fill_signature(
            transaction,
            key.verifying_key().as_bytes(),
            &signature.to_bytes(),
        )
    }

    pub async fn sign_tvm_message(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let key = self.ed25519_for(user_id, password, wallet, Blockchain::Tvm).await?;
        Ok(key.sign(message).to_bytes().to_vec())
    }

    pub async fn sign_tvm_transaction(
        &self,
        user_id: &str,
        password: &str,
        wallet: &PersonalWallet,
        payload: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let key = self.ed25519_for(user_id, password, wallet, Blockchain::Tvm).await?;
        Ok(key.sign(payload).to_bytes().to_vec())
    }
}

/// A keyring that derives a different address than the wallet record
/// declares must never produce a signature.
fn ensure_same_address(derived: &str, declared: &str, case_insensitive: bool) -> Result<(), WalletError> {
    let same = if case_insensitive {
        derived.eq_ignore_ascii_case(declared)
    } else {
        derived == declared
    };
    if same {
        Ok(())
    } else {
        Err(WalletError::Validation(format!(
            "keyring derives {derived}, wallet declares {declared}"
        )))
    }
}
