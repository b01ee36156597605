use serde::{Serialize, Serializer};

use rusty_wallet_core::WalletError;

pub const SIGNATURE_LEN: usize = 64;
pub const PUBKEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionVersion {
    Legacy,
    V0(u8),
}

/// Serialized the way the wallet standard lists them: `"legacy"` or `0`.
impl Serialize for TransactionVersion {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            TransactionVersion::Legacy => s.serialize_str("legacy"),
            TransactionVersion::V0(v) => s.serialize_u8(*v),
        }
    }
}

/// Layout of a serialized transaction: signature section followed by the
/// message. Offsets index into the original buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireLayout {
    pub version: TransactionVersion,
    pub signature_count: usize,
    pub signatures_start: usize,
    pub message_start: usize,
    pub required_signers: Vec<[u8; PUBKEY_LEN]>,
}

impl WireLayout {
    pub fn parse(tx: &[u8]) -> Result<Self, WalletError> {
        let (signature_count, signatures_start) = decode_compact_u16(tx, 0)?;
        let message_start = signatures_start + signature_count * SIGNATURE_LEN;
        if tx.len() <= message_start {
            return Err(malformed("truncated signature section"));
        }

        let mut cursor = message_start;
        let version = if tx[cursor] & 0x80 != 0 {
            let v = tx[cursor] & 0x7f;
            if v != 0 {
                return Err(malformed(&format!("unsupported message version {v}")));
            }
            cursor += 1;
            TransactionVersion::V0(v)
        } else {
            TransactionVersion::Legacy
        };

        let header = tx
            .get(cursor..cursor + 3)
            .ok_or_else(|| malformed("truncated message header"))?;
        let num_required = header[0] as usize;
        cursor += 3;

        let (key_count, keys_start) = decode_compact_u16(tx, cursor)?;
        if key_count < num_required {
            return Err(malformed("fewer account keys than required signers"));
        }
        if num_required != signature_count {
            return Err(malformed("signature count does not match header"));
        }
        let mut required_signers = Vec::with_capacity(num_required);
        for i in 0..num_required {
            let start = keys_start + i * PUBKEY_LEN;
            let key = tx
                .get(start..start + PUBKEY_LEN)
                .ok_or_else(|| malformed("truncated account keys"))?;
            let mut out = [0u8; PUBKEY_LEN];
            out.copy_from_slice(key);
            required_signers.push(out);
        }

        Ok(Self {
            version,
            signature_count,
            signatures_start,
            message_start,
            required_signers,
        })
    }

    /// Bytes covered by every signature.
    pub fn message<'a>(&self, tx: &'a [u8]) -> &'a [u8] {
        &tx[self.message_start..]
    }

    pub fn signer_index(&self, signer: &[u8; PUBKEY_LEN]) -> Option<usize> {
        self.required_signers.iter().position(|k| k == signer)
    }
}

/// Copies `tx` with `signature` written into `signer`'s slot.
pub fn fill_signature(
    tx: &[u8],
    signer: &[u8; PUBKEY_LEN],
    signature: &[u8],
) -> Result<Vec<u8>, WalletError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(WalletError::Validation(format!(
            "ed25519 signature must be {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }
    let layout = WireLayout::parse(tx)?;
    let index = layout.signer_index(signer).ok_or_else(|| {
        WalletError::Validation(format!(
            "{} is not a required signer of this transaction",
            bs58::encode(signer).into_string()
        ))
    })?;
    let mut out = tx.to_vec();
    let start = layout.signatures_start + index * SIGNATURE_LEN;
    out[start..start + SIGNATURE_LEN].copy_from_slice(signature);
    Ok(out)
}

/// Solana "shortvec" length prefix. Returns the value and the offset just
/// past it.
pub fn decode_compact_u16(buf: &[u8], offset: usize) -> Result<(usize, usize), WalletError> {
    let mut value = 0usize;
    for i in 0..3 {
        let byte = *buf
            .get(offset + i)
            .ok_or_else(|| malformed("truncated compact-u16"))?;
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, offset + i + 1));
        }
    }
    Err(malformed("compact-u16 longer than three bytes"))
}

pub fn encode_compact_u16(mut value: u16, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

fn malformed(reason: &str) -> WalletError {
    WalletError::InvalidRequest(format!("malformed solana transaction: {reason}"))
}
