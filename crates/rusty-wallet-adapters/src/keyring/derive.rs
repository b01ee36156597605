use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use bip39::Mnemonic;
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use rusty_wallet_core::{Blockchain, Keyring, KeyringType, PublicKeyInfo, WalletError};

use crate::crypto::slip10_ed25519;

pub const EVM_DEFAULT_PATH: &str = "m/44'/60'/0'/0/0";
pub const SVM_DEFAULT_PATH: &str = "m/44'/501'/0'/0'";
pub const TVM_DEFAULT_PATH: &str = "m/44'/607'/0'";

pub fn default_path(blockchain: Blockchain) -> &'static str {
    match blockchain {
        Blockchain::Evm => EVM_DEFAULT_PATH,
        Blockchain::Svm => SVM_DEFAULT_PATH,
        Blockchain::Tvm => TVM_DEFAULT_PATH,
    }
}

/// Parses `m/44'/501'/0'` into `(index, hardened)` pairs.
pub fn parse_path(path: &str) -> Result<Vec<(u32, bool)>, WalletError> {
    let mut parts = path.split('/');
    if parts.next() != Some("m") {
        return Err(WalletError::Validation(format!(
            "derivation path must start with m/: {path}"
        )));
    }
    parts
        .map(|part| {
            let (digits, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(d) => (d, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|e| WalletError::Validation(format!("bad path segment {part:?}: {e}")))?;
            if index & 0x8000_0000 != 0 {
                return Err(WalletError::Validation(format!(
                    "path index out of range: {part}"
                )));
            }
            Ok((index, hardened))
        })
        .collect()
}

/// Hardware wallets and APDU framing need the raw BIP-32 indices.
pub fn path_indices(path: &str) -> Result<Vec<u32>, WalletError> {
    Ok(parse_path(path)?
        .into_iter()
        .map(|(i, hardened)| if hardened { i | 0x8000_0000 } else { i })
        .collect())
}

fn normalized_phrase(phrase: &str) -> Zeroizing<String> {
    Zeroizing::new(phrase.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub fn evm_signer(keyring: &Keyring, path: Option<&str>) -> Result<PrivateKeySigner, WalletError> {
    match keyring.kind {
        KeyringType::SeedPhrase => {
            let phrase = normalized_phrase(&keyring.value);
            MnemonicBuilder::<English>::default()
                .phrase(phrase.as_str())
                .derivation_path(path.unwrap_or(EVM_DEFAULT_PATH))
                .map_err(|e| WalletError::Validation(format!("invalid evm derivation path: {e}")))?
                .build()
                .map_err(|e| WalletError::Validation(format!("invalid seed phrase: {e}")))
        }
        KeyringType::PrivateKey => keyring
            .value
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| WalletError::Validation(format!("invalid evm private key: {e}"))),
    }
}

/// Ed25519 key for SVM and TVM keyrings. Seed phrases go through BIP-39 and
/// SLIP-0010; private keys are base58 (SVM) or hex (TVM).
pub fn ed25519_key(keyring: &Keyring, path: Option<&str>) -> Result<SigningKey, WalletError> {
    match keyring.kind {
        KeyringType::SeedPhrase => {
            let phrase = normalized_phrase(&keyring.value);
            let mnemonic = Mnemonic::parse_normalized(phrase.as_str())
                .map_err(|e| WalletError::Validation(format!("invalid seed phrase: {e}")))?;
            let seed = Zeroizing::new(mnemonic.to_seed(""));
            let path = path.unwrap_or_else(|| default_path(keyring.blockchain));
            let mut indices = Vec::new();
            for (index, hardened) in parse_path(path)? {
                if !hardened {
                    return Err(WalletError::Validation(format!(
                        "ed25519 derivation requires hardened segments: {path}"
                    )));
                }
                indices.push(index);
            }
            let secret = slip10_ed25519(seed.as_slice(), &indices)?;
            Ok(SigningKey::from_bytes(&secret))
        }
        KeyringType::PrivateKey => {
            let raw = Zeroizing::new(match keyring.blockchain {
                Blockchain::Svm => bs58::decode(keyring.value.trim())
                    .into_vec()
                    .map_err(|e| WalletError::Validation(format!("invalid base58 key: {e}")))?,
                _ => alloy::hex::decode(keyring.value.trim())
                    .map_err(|e| WalletError::Validation(format!("invalid hex key: {e}")))?,
            });
            signing_key_from_bytes(&raw)
        }
    }
}

/// Accepts a 32-byte seed or a 64-byte `secret || public` keypair.
fn signing_key_from_bytes(raw: &[u8]) -> Result<SigningKey, WalletError> {
    match raw.len() {
        32 => {
            let mut secret = Zeroizing::new([0u8; 32]);
            secret.copy_from_slice(raw);
            Ok(SigningKey::from_bytes(&secret))
        }
        64 => {
            let mut pair = Zeroizing::new([0u8; 64]);
            pair.copy_from_slice(raw);
            SigningKey::from_keypair_bytes(&pair)
                .map_err(|e| WalletError::Validation(format!("inconsistent ed25519 keypair: {e}")))
        }
        n => Err(WalletError::Validation(format!(
            "ed25519 private key must be 32 or 64 bytes, got {n}"
        ))),
    }
}

pub fn svm_address(key: &VerifyingKey) -> String {
    bs58::encode(key.as_bytes()).into_string()
}

/// Raw workchain-0 form. The user-friendly wallet-contract address is the
/// application's concern.
pub fn tvm_address(key: &VerifyingKey) -> String {
    format!("0:{}", alloy::hex::encode(Sha256::digest(key.as_bytes())))
}

pub fn public_key_info(
    keyring: &Keyring,
    blockchain: Blockchain,
    path: Option<&str>,
) -> Result<PublicKeyInfo, WalletError> {
    if keyring.blockchain != blockchain {
        return Err(WalletError::Validation(format!(
            "keyring {} belongs to {}, not {}",
            keyring.keyring_identifier,
            keyring.blockchain.as_str(),
            blockchain.as_str()
        )));
    }
    match blockchain {
        Blockchain::Evm => {
            let signer = evm_signer(keyring, path)?;
            let point = signer.credential().verifying_key().to_encoded_point(false);
            Ok(PublicKeyInfo {
                blockchain,
                public_key: alloy::hex::encode_prefixed(point.as_bytes()),
                address: signer.address().to_checksum(None),
            })
        }
        Blockchain::Svm => {
            let key = ed25519_key(keyring, path)?.verifying_key();
            Ok(PublicKeyInfo {
                blockchain,
                public_key: svm_address(&key),
                address: svm_address(&key),
            })
        }
        Blockchain::Tvm => {
            let key = ed25519_key(keyring, path)?.verifying_key();
            Ok(PublicKeyInfo {
                blockchain,
                public_key: alloy::hex::encode(key.as_bytes()),
                address: tvm_address(&key),
            })
        }
    }
}

/// First-account address on the default path. Stable for a given secret.
pub fn keyring_identifier(
    kind: KeyringType,
    blockchain: Blockchain,
    secret: &str,
) -> Result<String, WalletError> {
    let candidate = Keyring {
        kind,
        blockchain,
        keyring_identifier: String::new(),
        value: secret.to_owned(),
    };
    Ok(public_key_info(&candidate, blockchain, None)?.address)
}

pub fn new_keyring(
    kind: KeyringType,
    blockchain: Blockchain,
    secret: &str,
) -> Result<Keyring, WalletError> {
    Ok(Keyring {
        kind,
        blockchain,
        keyring_identifier: keyring_identifier(kind, blockchain, secret)?,
        value: secret.to_owned(),
    })
}
