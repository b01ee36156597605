use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::protocol::Blockchain;

/// Kind of secret material held by a keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyringType {
    SeedPhrase,
    PrivateKey,
}

/// Declared type of an application wallet. Hardware wallets carry no keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WalletType {
    SeedPhrase,
    PrivateKey,
    Ledger,
    Trezor,
}

impl WalletType {
    pub fn keyring_type(self) -> Option<KeyringType> {
        match self {
            WalletType::SeedPhrase => Some(KeyringType::SeedPhrase),
            WalletType::PrivateKey => Some(KeyringType::PrivateKey),
            WalletType::Ledger | WalletType::Trezor => None,
        }
    }

    pub fn is_hardware(self) -> bool {
        matches!(self, WalletType::Ledger | WalletType::Trezor)
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalletType::SeedPhrase => "SeedPhrase",
            WalletType::PrivateKey => "PrivateKey",
            WalletType::Ledger => "Ledger",
            WalletType::Trezor => "Trezor",
        };
        f.write_str(name)
    }
}

/// Secret material for one wallet. `keyring_identifier` is derived from the
/// secret and is the join key with [`PersonalWallet::keyring_identifier`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Keyring {
    #[zeroize(skip)]
    #[serde(rename = "type")]
    pub kind: KeyringType,
    #[zeroize(skip)]
    pub blockchain: Blockchain,
    #[zeroize(skip)]
    pub keyring_identifier: String,
    pub value: String,
}

impl Keyring {
    pub fn metadata(&self) -> KeyringMetadata {
        KeyringMetadata {
            kind: self.kind,
            blockchain: self.blockchain,
            keyring_identifier: self.keyring_identifier.clone(),
        }
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("kind", &self.kind)
            .field("blockchain", &self.blockchain)
            .field("keyring_identifier", &self.keyring_identifier)
            .field("value", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringMetadata {
    #[serde(rename = "type")]
    pub kind: KeyringType,
    pub blockchain: Blockchain,
    pub keyring_identifier: String,
}

/// Unencrypted per-user index, keyed by keyring identifier.
pub type KeyringsMetadata = BTreeMap<String, KeyringMetadata>;

/// Signing-relevant projection of an application wallet record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalWallet {
    pub address: String,
    #[serde(default)]
    pub keyring_identifier: Option<String>,
    #[serde(default)]
    pub derivation_path: Option<String>,
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    pub blockchain: Blockchain,
    /// Hex for EVM (uncompressed SEC1) and TVM, base58 for SVM.
    pub public_key: String,
    pub address: String,
}
