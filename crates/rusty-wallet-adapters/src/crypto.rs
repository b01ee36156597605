use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use rusty_wallet_core::WalletError;

use crate::config::KdfConfig;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

const PBKDF2_ROUNDS: u32 = 600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    Argon2idV1,
    Pbkdf2HmacSha256V1,
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    #[zeroize(skip)]
    pub kdf_algorithm: KdfAlgorithm,
    pub enc_key: [u8; 32],
    pub mac_key: [u8; 32],
}

pub fn random_bytes<const N: usize>() -> Result<[u8; N], WalletError> {
    let mut out = [0u8; N];
    getrandom::getrandom(&mut out)
        .map_err(|e| WalletError::Transport(format!("random generation failed: {e}")))?;
    Ok(out)
}

/// Root key from the password, expanded into independent encryption and MAC
/// keys. `algorithm` pins the KDF when re-deriving for an existing vault.
pub fn derive_keys(
    password: &[u8],
    salt: &[u8; 16],
    kdf: &KdfConfig,
    algorithm: Option<KdfAlgorithm>,
) -> Result<DerivedKeys, WalletError> {
    let (root, kdf_algorithm) = derive_root_key(password, salt, kdf, algorithm)?;
    let hk = Hkdf::<Sha256>::new(None, root.as_slice());
    let mut keys = DerivedKeys {
        kdf_algorithm,
        enc_key: [0u8; 32],
        mac_key: [0u8; 32],
    };
    hk.expand(b"keyring_enc_v1", &mut keys.enc_key)
        .map_err(|_| WalletError::Validation("hkdf expand for keyring_enc_v1 failed".to_owned()))?;
    hk.expand(b"keyring_mac_v1", &mut keys.mac_key)
        .map_err(|_| WalletError::Validation("hkdf expand for keyring_mac_v1 failed".to_owned()))?;
    Ok(keys)
}

fn derive_root_key(
    password: &[u8],
    salt: &[u8; 16],
    kdf: &KdfConfig,
    algorithm: Option<KdfAlgorithm>,
) -> Result<(Zeroizing<[u8; 32]>, KdfAlgorithm), WalletError> {
    let mut root = Zeroizing::new([0u8; 32]);
    if algorithm != Some(KdfAlgorithm::Pbkdf2HmacSha256V1) {
        let argon = Params::new(
            kdf.argon2_memory_kib,
            kdf.argon2_iterations,
            kdf.argon2_parallelism,
            Some(32),
        )
        .map(|params| Argon2::new(Algorithm::Argon2id, Version::V0x13, params));
        match argon {
            Ok(argon) if argon.hash_password_into(password, salt, &mut root[..]).is_ok() => {
                return Ok((root, KdfAlgorithm::Argon2idV1));
            }
            _ if algorithm == Some(KdfAlgorithm::Argon2idV1) => {
                return Err(WalletError::Decrypt(
                    "argon2id unavailable for a vault sealed with it".to_owned(),
                ));
            }
            _ => {}
        }
    }

    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ROUNDS, &mut root[..]);
    Ok((root, KdfAlgorithm::Pbkdf2HmacSha256V1))
}

pub fn encrypt_aes_gcm(
    enc_key: &[u8; 32],
    nonce: [u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, WalletError> {
    let cipher = Aes256Gcm::new_from_slice(enc_key)
        .map_err(|e| WalletError::Validation(format!("aes-gcm init failed: {e}")))?;
    let nonce = Nonce::<aes_gcm::aead::consts::U12>::from(nonce);
    cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| WalletError::Transport(format!("aes-gcm encrypt failed: {e}")))
}

/// A tag mismatch (wrong password or tampered blob) is `Decrypt`.
pub fn decrypt_aes_gcm(
    enc_key: &[u8; 32],
    nonce: [u8; 12],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    let cipher = Aes256Gcm::new_from_slice(enc_key)
        .map_err(|e| WalletError::Validation(format!("aes-gcm init failed: {e}")))?;
    let nonce = Nonce::<aes_gcm::aead::consts::U12>::from(nonce);
    cipher
        .decrypt(&nonce, ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| WalletError::Decrypt("incorrect password or corrupted vault".to_owned()))
}

pub fn hmac_sha256(mac_key: &[u8; 32], payload: &[u8]) -> Result<[u8; 32], WalletError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| WalletError::Validation(format!("hmac init failed: {e}")))?;
    mac.update(payload);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

pub fn verify_hmac_sha256(
    mac_key: &[u8; 32],
    payload: &[u8],
    tag: &[u8],
) -> Result<bool, WalletError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| WalletError::Validation(format!("hmac init failed: {e}")))?;
    mac.update(payload);
    Ok(mac.verify_slice(tag).is_ok())
}

/// Key-sorted JSON so equal maps always MAC identically.
pub fn canonical_json_bytes(value: &serde_json::Value) -> Result<Vec<u8>, WalletError> {
    serde_json::to_vec(&sort_keys(value))
        .map_err(|e| WalletError::Validation(format!("canonical json serialization failed: {e}")))
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), sort_keys(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        _ => value.clone(),
    }
}

/// SLIP-0010 Ed25519 derivation. Every index is hardened.
pub fn slip10_ed25519(seed: &[u8], path: &[u32]) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(b"ed25519 seed")
        .map_err(|e| WalletError::Validation(format!("hmac init failed: {e}")))?;
    mac.update(seed);
    let mut node = Zeroizing::new([0u8; 64]);
    node.copy_from_slice(&mac.finalize().into_bytes());

    for index in path {
        let mut mac = <HmacSha512 as Mac>::new_from_slice(&node[32..])
            .map_err(|e| WalletError::Validation(format!("hmac init failed: {e}")))?;
        mac.update(&[0x00]);
        mac.update(&node[..32]);
        mac.update(&(index | 0x8000_0000).to_be_bytes());
        node.copy_from_slice(&mac.finalize().into_bytes());
    }

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&node[..32]);
    Ok(key)
}
