use alloy::consensus::{SignableTransaction, TypedTransaction};
use alloy::dyn_abi::TypedData;
use alloy::primitives::{keccak256, B256};
use alloy::rpc::types::TransactionRequest;
use serde_json::Value;

use rusty_wallet_core::WalletError;

/// `eth_signTypedData_v4` payloads arrive either as an object or as the JSON
/// string dApps conventionally send.
pub fn parse_typed_data(raw: &Value) -> Result<TypedData, WalletError> {
    let parsed = match raw {
        Value::String(text) => serde_json::from_str(text),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| WalletError::InvalidRequest(format!("invalid typed data: {e}")))
}

pub fn typed_data_hash(typed: &TypedData) -> Result<B256, WalletError> {
    typed
        .eip712_signing_hash()
        .map_err(|e| WalletError::InvalidRequest(format!("typed data hashing failed: {e}")))
}

/// Domain separator and struct hash, for devices that sign EIP-712 in
/// hashed mode.
pub fn typed_data_parts(typed: &TypedData) -> Result<(B256, B256), WalletError> {
    let domain = typed.domain().separator();
    let message = typed
        .hash_struct()
        .map_err(|e| WalletError::InvalidRequest(format!("typed data hashing failed: {e}")))?;
    Ok((domain, message))
}

/// Unsigned encoding of the transaction (EIP-2718 type byte included for
/// typed transactions).
pub fn transaction_preimage(tx: &TransactionRequest) -> Result<Vec<u8>, WalletError> {
    let typed = tx.clone().build_typed_tx().map_err(|_| {
        WalletError::InvalidRequest("transaction request is missing required fields".to_owned())
    })?;
    Ok(match typed {
        TypedTransaction::Legacy(t) => t.encoded_for_signing(),
        TypedTransaction::Eip2930(t) => t.encoded_for_signing(),
        TypedTransaction::Eip1559(t) => t.encoded_for_signing(),
        TypedTransaction::Eip4844(t) => t.encoded_for_signing(),
        TypedTransaction::Eip7702(t) => t.encoded_for_signing(),
    })
}

pub fn transaction_hash(tx: &TransactionRequest) -> Result<B256, WalletError> {
    Ok(keccak256(transaction_preimage(tx)?))
}

/// Builds the 65-byte `r || s || v` form from device output. `v` may come
/// back as a recovery id, 27/28, or an EIP-155 value.
pub fn rsv_signature(r: &[u8], s: &[u8], v: u64) -> Result<Vec<u8>, WalletError> {
    if r.len() != 32 || s.len() != 32 {
        return Err(WalletError::Transport(format!(
            "device returned malformed signature (r {} bytes, s {} bytes)",
            r.len(),
            s.len()
        )));
    }
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        v if v >= 35 => (v - 35) % 2,
        other => {
            return Err(WalletError::Transport(format!(
                "device returned unexpected v {other}"
            )))
        }
    };
    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(r);
    out.extend_from_slice(s);
    out.push(27 + parity as u8);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mail() -> Value {
        json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "chainId", "type": "uint256"}
                ],
                "Mail": [{"name": "contents", "type": "string"}]
            },
            "primaryType": "Mail",
            "domain": {"name": "Ether Mail", "chainId": 1},
            "message": {"contents": "Hello, Bob!"}
        })
    }

    #[test]
    fn typed_data_accepts_string_or_object() {
        let as_object = parse_typed_data(&mail()).expect("object");
        let as_string = parse_typed_data(&Value::String(mail().to_string())).expect("string");
        assert_eq!(
            typed_data_hash(&as_object).expect("hash"),
            typed_data_hash(&as_string).expect("hash")
        );
        assert!(parse_typed_data(&json!(42)).is_err());
    }

    #[test]
    fn v_values_normalize_to_27_or_28() {
        let r = [1u8; 32];
        let s = [2u8; 32];
        assert_eq!(rsv_signature(&r, &s, 1).expect("recid")[64], 28);
        assert_eq!(rsv_signature(&r, &s, 27).expect("legacy")[64], 27);
        assert_eq!(rsv_signature(&r, &s, 37).expect("eip155")[64], 27);
        assert!(rsv_signature(&r[..31], &s, 27).is_err());
    }
}
