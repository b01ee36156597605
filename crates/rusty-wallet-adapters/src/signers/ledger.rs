use std::sync::Arc;

use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use serde_json::Value;
use tracing::{debug, warn};

use rusty_wallet_core::{
    Blockchain, EvmSigner, LedgerTransport, LedgerTransportFactory, PersonalWallet,
    SigningContext, SvmSigner, TvmSigner, WalletError,
};

use super::device::DeviceGuard;
use super::payload;
use crate::keyring::{default_path, path_indices, svm_address, tvm_address};
use crate::solana::{fill_signature, WireLayout, SIGNATURE_LEN};

pub const CLA: u8 = 0xE0;
pub const MAX_CHUNK: usize = 255;

pub const SW_OK: u16 = 0x9000;
pub const SW_USER_REJECTED: u16 = 0x6985;

pub mod eth {
    pub const GET_ADDRESS: u8 = 0x02;
    pub const SIGN_TX: u8 = 0x04;
    pub const SIGN_PERSONAL_MESSAGE: u8 = 0x08;
    pub const SIGN_EIP712_HASHED: u8 = 0x0C;
}

pub mod sol {
    pub const GET_PUBKEY: u8 = 0x05;
    pub const SIGN_MESSAGE: u8 = 0x06;
    pub const SIGN_OFFCHAIN: u8 = 0x07;
}

pub mod ton {
    pub const GET_ADDRESS: u8 = 0x05;
    pub const SIGN_TX: u8 = 0x06;
    pub const SIGN_DATA: u8 = 0x09;
}

const OFFCHAIN_DOMAIN: &[u8] = b"\xffsolana offchain";

/// `[count][index u32 BE]...`
pub fn serialize_path(path: &str) -> Result<Vec<u8>, WalletError> {
    let indices = path_indices(path)?;
    if indices.len() > 10 {
        return Err(WalletError::Validation(format!(
            "derivation path too deep for ledger: {path}"
        )));
    }
    let mut out = Vec::with_capacity(1 + indices.len() * 4);
    out.push(indices.len() as u8);
    for index in indices {
        out.extend_from_slice(&index.to_be_bytes());
    }
    Ok(out)
}

pub fn apdu(ins: u8, p1: u8, p2: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + data.len());
    out.extend_from_slice(&[CLA, ins, p1, p2, data.len() as u8]);
    out.extend_from_slice(data);
    out
}

/// Strips and checks the trailing status word.
pub fn check_status(response: &[u8]) -> Result<&[u8], WalletError> {
    if response.len() < 2 {
        return Err(WalletError::Transport(format!(
            "ledger response too short ({} bytes)",
            response.len()
        )));
    }
    let (body, sw) = response.split_at(response.len() - 2);
    match u16::from_be_bytes([sw[0], sw[1]]) {
        SW_OK => Ok(body),
        SW_USER_REJECTED => Err(WalletError::UserRejected),
        other => Err(WalletError::Transport(format!("ledger status 0x{other:04x}"))),
    }
}

/// How consecutive chunks of one command are flagged.
#[derive(Debug, Clone, Copy)]
enum Chunking {
    /// Ethereum and TON apps: `P1 = 0x00` first, `0x80` for continuations.
    FirstMore,
    /// Solana app: confirm in P1, `EXTEND`/`MORE` bits in P2.
    Extend,
}

fn chunk_params(chunking: Chunking, index: usize, last: bool) -> (u8, u8) {
    match chunking {
        Chunking::FirstMore => (if index == 0 { 0x00 } else { 0x80 }, 0x00),
        Chunking::Extend => {
            let mut p2 = 0;
            if index > 0 {
                p2 |= 0x01;
            }
            if !last {
                p2 |= 0x02;
            }
            (0x01, p2)
        }
    }
}

fn split_chunks(payload: &[u8], chunking: Chunking) -> Vec<(u8, u8, &[u8])> {
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![payload]
    } else {
        payload.chunks(MAX_CHUNK).collect()
    };
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let (p1, p2) = chunk_params(chunking, i, i + 1 == count);
            (p1, p2, chunk)
        })
        .collect()
}

/// Reads `v || r || s` as returned by the Ethereum app.
fn vrs(body: &[u8]) -> Result<(u8, &[u8], &[u8]), WalletError> {
    if body.len() < 65 {
        return Err(WalletError::Transport(format!(
            "ledger signature too short ({} bytes)",
            body.len()
        )));
    }
    Ok((body[0], &body[1..33], &body[33..65]))
}

fn ed25519_key(raw: &[u8]) -> Result<VerifyingKey, WalletError> {
    let bytes: [u8; 32] = raw
        .get(..32)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| WalletError::Transport("ledger returned a short public key".to_owned()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| WalletError::Transport(format!("ledger returned an invalid public key: {e}")))
}

fn signature_bytes(body: &[u8]) -> Result<Vec<u8>, WalletError> {
    body.get(..SIGNATURE_LEN)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| WalletError::Transport("ledger returned a short signature".to_owned()))
}

/// Off-chain message envelope expected by the Solana app.
fn offchain_message(message: &[u8]) -> Result<Vec<u8>, WalletError> {
    let len = u16::try_from(message.len()).map_err(|_| {
        WalletError::InvalidRequest("off-chain message exceeds 65535 bytes".to_owned())
    })?;
    let mut out = Vec::with_capacity(OFFCHAIN_DOMAIN.len() + 4 + message.len());
    out.extend_from_slice(OFFCHAIN_DOMAIN);
    out.push(0);
    out.push(if message.is_ascii() { 0 } else { 1 });
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(message);
    Ok(out)
}

fn ensure_device_address(expected: &str, actual: &str) -> Result<(), WalletError> {
    let matches = if expected.starts_with("0x") || expected.starts_with("0X") {
        expected.trim_start_matches("0x").trim_start_matches("0X").eq_ignore_ascii_case(
            actual.trim_start_matches("0x").trim_start_matches("0X"),
        )
    } else {
        expected == actual
    };
    if matches {
        Ok(())
    } else {
        warn!(expected, actual, "ledger reported a different account");
        Err(WalletError::DeviceMismatch {
            expected: expected.to_owned(),
            actual: actual.to_owned(),
        })
    }
}

/// Hardware backend over the Ledger Ethereum, Solana and TON apps. A fresh
/// transport is opened per operation and closed on every exit.
#[derive(Clone)]
pub struct LedgerSigner {
    transports: Arc<dyn LedgerTransportFactory>,
}

impl LedgerSigner {
    pub fn new(transports: Arc<dyn LedgerTransportFactory>) -> Self {
        Self { transports }
    }

    async fn open(&self) -> Result<DeviceGuard<dyn LedgerTransport>, WalletError> {
        Ok(DeviceGuard::new(self.transports.open().await?, "ledger"))
    }
}

async fn exchange(
    transport: &mut DeviceGuard<dyn LedgerTransport>,
    ins: u8,
    payload: &[u8],
    chunking: Chunking,
) -> Result<Vec<u8>, WalletError> {
    let mut last = Vec::new();
    for (p1, p2, chunk) in split_chunks(payload, chunking) {
        let response = transport.exchange(&apdu(ins, p1, p2, chunk)).await?;
        last = check_status(&response)?.to_vec();
    }
    Ok(last)
}

fn wallet_path(wallet: &PersonalWallet, blockchain: Blockchain) -> Result<Vec<u8>, WalletError> {
    serialize_path(
        wallet
            .derivation_path
            .as_deref()
            .unwrap_or_else(|| default_path(blockchain)),
    )
}

/// Ethereum app address check. Response is
/// `[pk_len][pk][addr_len][addr ascii hex]`.
async fn verify_eth(
    transport: &mut DeviceGuard<dyn LedgerTransport>,
    wallet: &PersonalWallet,
    path: &[u8],
) -> Result<(), WalletError> {
    let body = exchange(transport, eth::GET_ADDRESS, path, Chunking::FirstMore).await?;
    let pk_len = *body
        .first()
        .ok_or_else(|| WalletError::Transport("empty ledger address response".to_owned()))?
        as usize;
    let addr_len = *body
        .get(1 + pk_len)
        .ok_or_else(|| WalletError::Transport("truncated ledger address response".to_owned()))?
        as usize;
    let start = 2 + pk_len;
    let addr = body
        .get(start..start + addr_len)
        .ok_or_else(|| WalletError::Transport("truncated ledger address response".to_owned()))?;
    let addr = std::str::from_utf8(addr)
        .map_err(|e| WalletError::Transport(format!("ledger address is not ascii: {e}")))?;
    ensure_device_address(&wallet.address, &format!("0x{addr}"))
}

async fn verify_ed25519(
    transport: &mut DeviceGuard<dyn LedgerTransport>,
    wallet: &PersonalWallet,
    blockchain: Blockchain,
    path: &[u8],
) -> Result<(), WalletError> {
    let ins = match blockchain {
        Blockchain::Svm => sol::GET_PUBKEY,
        _ => ton::GET_ADDRESS,
    };
    let body = exchange(transport, ins, path, Chunking::FirstMore).await?;
    let key = ed25519_key(&body)?;
    let actual = match blockchain {
        Blockchain::Svm => svm_address(&key),
        _ => tvm_address(&key),
    };
    ensure_device_address(&wallet.address, &actual)
}

#[async_trait]
impl EvmSigner for LedgerSigner {
    async fn sign_message(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Bytes, WalletError> {
        let path = wallet_path(wallet, Blockchain::Evm)?;
        let mut transport = self.open().await?;
        verify_eth(&mut transport, wallet, &path).await?;

        let mut data = path;
        data.extend_from_slice(&(message.len() as u32).to_be_bytes());
        data.extend_from_slice(message);
        let body = exchange(&mut transport, eth::SIGN_PERSONAL_MESSAGE, &data, Chunking::FirstMore)
            .await?;
        let (v, r, s) = vrs(&body)?;
        Ok(payload::rsv_signature(r, s, v as u64)?.into())
    }

    async fn sign_typed_data(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        typed_data: &Value,
    ) -> Result<Bytes, WalletError> {
        let typed = payload::parse_typed_data(typed_data)?;
        let (domain, message) = payload::typed_data_parts(&typed)?;
        let path = wallet_path(wallet, Blockchain::Evm)?;
        let mut transport = self.open().await?;
        verify_eth(&mut transport, wallet, &path).await?;

        let mut data = path;
        data.extend_from_slice(domain.as_slice());
        data.extend_from_slice(message.as_slice());
        let body =
            exchange(&mut transport, eth::SIGN_EIP712_HASHED, &data, Chunking::FirstMore).await?;
        let (v, r, s) = vrs(&body)?;
        Ok(payload::rsv_signature(r, s, v as u64)?.into())
    }

    async fn sign_transaction(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        tx: &TransactionRequest,
    ) -> Result<Bytes, WalletError> {
        let preimage = payload::transaction_preimage(tx)?;
        // Legacy preimages are a bare RLP list; typed ones start with the type byte.
        let legacy = preimage.first().is_some_and(|b| *b >= 0xc0);
        let path = wallet_path(wallet, Blockchain::Evm)?;
        let mut transport = self.open().await?;
        verify_eth(&mut transport, wallet, &path).await?;

        let mut data = path;
        data.extend_from_slice(&preimage);
        let body = exchange(&mut transport, eth::SIGN_TX, &data, Chunking::FirstMore).await?;
        let (v, r, s) = vrs(&body)?;
        // The app returns only the low byte of an EIP-155 v.
        let parity = if legacy { (v as u64 + 1) % 2 } else { v as u64 };
        debug!(legacy, "ledger signed evm transaction");
        Ok(payload::rsv_signature(r, s, parity)?.into())
    }
}

#[async_trait]
impl SvmSigner for LedgerSigner {
    async fn sign_message(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let envelope = offchain_message(message)?;
        let path = wallet_path(wallet, Blockchain::Svm)?;
        let mut transport = self.open().await?;
        verify_ed25519(&mut transport, wallet, Blockchain::Svm, &path).await?;

        let mut data = vec![1u8];
        data.extend_from_slice(&path);
        data.extend_from_slice(&envelope);
        let body = exchange(&mut transport, sol::SIGN_OFFCHAIN, &data, Chunking::Extend).await?;
        signature_bytes(&body)
    }

    async fn sign_transaction(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        transaction: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let layout = WireLayout::parse(transaction)?;
        let path = wallet_path(wallet, Blockchain::Svm)?;
        let mut transport = self.open().await?;
        verify_ed25519(&mut transport, wallet, Blockchain::Svm, &path).await?;

        let mut data = vec![1u8];
        data.extend_from_slice(&path);
        data.extend_from_slice(layout.message(transaction));
        let body = exchange(&mut transport, sol::SIGN_MESSAGE, &data, Chunking::Extend).await?;
        let signature = signature_bytes(&body)?;
        drop(transport);

        let signer: [u8; 32] = bs58::decode(&wallet.address)
            .into_vec()
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                WalletError::Validation(format!("{} is not a solana address", wallet.address))
            })?;
        fill_signature(transaction, &signer, &signature)
    }
}

#[async_trait]
impl TvmSigner for LedgerSigner {
    async fn sign_message(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let path = wallet_path(wallet, Blockchain::Tvm)?;
        let mut transport = self.open().await?;
        verify_ed25519(&mut transport, wallet, Blockchain::Tvm, &path).await?;

        let mut data = path;
        data.extend_from_slice(message);
        let body = exchange(&mut transport, ton::SIGN_DATA, &data, Chunking::FirstMore).await?;
        signature_bytes(&body)
    }

    async fn sign_transaction(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        payload: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let path = wallet_path(wallet, Blockchain::Tvm)?;
        let mut transport = self.open().await?;
        verify_ed25519(&mut transport, wallet, Blockchain::Tvm, &path).await?;

        let mut data = path;
        data.extend_from_slice(payload);
        let body = exchange(&mut transport, ton::SIGN_TX, &data, Chunking::FirstMore).await?;
        signature_bytes(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_serializes_hardened_big_endian() {
        let bytes = serialize_path("m/44'/501'/0'").expect("path");
        assert_eq!(
            bytes,
            vec![3, 0x80, 0, 0, 44, 0x80, 0, 0x01, 0xf5, 0x80, 0, 0, 0]
        );
    }

    #[test]
    fn status_words_map_to_errors() {
        assert_eq!(check_status(&[1, 2, 0x90, 0x00]).expect("ok"), &[1, 2]);
        assert!(matches!(
            check_status(&[0x69, 0x85]),
            Err(WalletError::UserRejected)
        ));
        assert!(matches!(
            check_status(&[0x6a, 0x80]),
            Err(WalletError::Transport(_))
        ));
    }

    #[test]
    fn long_payloads_split_into_flagged_chunks() {
        let payload = vec![7u8; 600];
        let eth = split_chunks(&payload, Chunking::FirstMore);
        assert_eq!(eth.len(), 3);
        assert_eq!((eth[0].0, eth[1].0, eth[2].0), (0x00, 0x80, 0x80));
        assert_eq!(eth[2].2.len(), 600 - 2 * MAX_CHUNK);

        let sol = split_chunks(&payload, Chunking::Extend);
        assert_eq!(sol[0].1, 0x02);
        assert_eq!(sol[1].1, 0x03);
        assert_eq!(sol[2].1, 0x01);
    }

    #[test]
    fn evm_addresses_compare_case_insensitively() {
        assert!(ensure_device_address(
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        )
        .is_ok());
        assert!(matches!(
            ensure_device_address("0xaa", "0xbb"),
            Err(WalletError::DeviceMismatch { .. })
        ));
    }
}
