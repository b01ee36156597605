use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use rusty_wallet_core::{Keyring, KeyringsMetadata, WalletError};

use crate::config::KdfConfig;
use crate::crypto::{
    self, canonical_json_bytes, decrypt_aes_gcm, derive_keys, encrypt_aes_gcm, DerivedKeys,
    KdfAlgorithm,
};

pub type KeyringMap = BTreeMap<String, Keyring>;

const VAULT_VERSION: u8 = 1;

/// Persisted form of one user's keyrings. Everything except the ciphertext
/// is public.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedVault {
    pub version: u8,
    pub kdf: KdfAlgorithm,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
    /// HMAC over the canonical metadata index at seal time.
    pub metadata_mac: String,
}

pub struct OpenedVault {
    pub keyrings: KeyringMap,
    keys: DerivedKeys,
    metadata_mac: Vec<u8>,
}

impl OpenedVault {
    /// Whether `metadata` is the index this vault was sealed with.
    pub fn metadata_matches(&self, metadata: &KeyringsMetadata) -> Result<bool, WalletError> {
        let bytes = metadata_bytes(metadata)?;
        crypto::verify_hmac_sha256(&self.keys.mac_key, &bytes, &self.metadata_mac)
    }
}

pub fn metadata_of(keyrings: &KeyringMap) -> KeyringsMetadata {
    keyrings
        .iter()
        .map(|(id, k)| (id.clone(), k.metadata()))
        .collect()
}

fn metadata_bytes(metadata: &KeyringsMetadata) -> Result<Vec<u8>, WalletError> {
    let value = serde_json::to_value(metadata)
        .map_err(|e| WalletError::Validation(format!("metadata serialization failed: {e}")))?;
    canonical_json_bytes(&value)
}

/// Encrypts `keyrings` under a fresh salt and nonce. Returns the serialized
/// vault and the metadata index it was sealed with.
pub fn seal(
    password: &str,
    keyrings: &KeyringMap,
    kdf: &KdfConfig,
) -> Result<(String, KeyringsMetadata), WalletError> {
    let salt: [u8; 16] = crypto::random_bytes()?;
    let nonce: [u8; 12] = crypto::random_bytes()?;
    let keys = derive_keys(password.as_bytes(), &salt, kdf, None)?;

    let plaintext = Zeroizing::new(
        serde_json::to_vec(keyrings)
            .map_err(|e| WalletError::Validation(format!("vault serialization failed: {e}")))?,
    );
    let ciphertext = encrypt_aes_gcm(&keys.enc_key, nonce, &plaintext)?;
    let metadata = metadata_of(keyrings);
    let mac = crypto::hmac_sha256(&keys.mac_key, &metadata_bytes(&metadata)?)?;

    let sealed = SealedVault {
        version: VAULT_VERSION,
        kdf: keys.kdf_algorithm,
        salt: B64.encode(salt),
        nonce: B64.encode(nonce),
        ciphertext: B64.encode(ciphertext),
        metadata_mac: alloy::hex::encode(mac),
    };
    let serialized = serde_json::to_string(&sealed)
        .map_err(|e| WalletError::Validation(format!("vault serialization failed: {e}")))?;
    Ok((serialized, metadata))
}

pub fn open(password: &str, vault: &str, kdf: &KdfConfig) -> Result<OpenedVault, WalletError> {
    let sealed: SealedVault = serde_json::from_str(vault)
        .map_err(|e| WalletError::Decrypt(format!("vault is not readable: {e}")))?;
    if sealed.version != VAULT_VERSION {
        return Err(WalletError::Decrypt(format!(
            "unsupported vault version {}",
            sealed.version
        )));
    }
    let salt: [u8; 16] = decode_fixed(&sealed.salt, "salt")?;
    let nonce: [u8; 12] = decode_fixed(&sealed.nonce, "nonce")?;
    let ciphertext = B64
        .decode(&sealed.ciphertext)
        .map_err(|e| WalletError::Decrypt(format!("vault ciphertext is not base64: {e}")))?;

    let keys = derive_keys(password.as_bytes(), &salt, kdf, Some(sealed.kdf))?;
    let plaintext = decrypt_aes_gcm(&keys.enc_key, nonce, &ciphertext)?;
    let keyrings: KeyringMap = serde_json::from_slice(&plaintext)
        .map_err(|e| WalletError::Decrypt(format!("vault contents are corrupt: {e}")))?;
    let metadata_mac = alloy::hex::decode(&sealed.metadata_mac)
        .map_err(|e| WalletError::Decrypt(format!("vault mac is not hex: {e}")))?;

    Ok(OpenedVault {
        keyrings,
        keys,
        metadata_mac,
    })
}

fn decode_fixed<const N: usize>(raw: &str, field: &str) -> Result<[u8; N], WalletError> {
    let bytes = B64
        .decode(raw)
        .map_err(|e| WalletError::Decrypt(format!("vault {field} is not base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| WalletError::Decrypt(format!("vault {field} must be {N} bytes")))
}
