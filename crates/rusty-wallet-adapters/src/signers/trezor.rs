use std::sync::Arc;

use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::warn;

use rusty_wallet_core::{
    Blockchain, EvmSigner, PersonalWallet, SigningContext, SvmSigner, TrezorTransport,
    TrezorTransportFactory, WalletError,
};

use super::device::DeviceGuard;
use super::payload;
use crate::keyring::default_path;
use crate::solana::{fill_signature, WireLayout};

pub const ETHEREUM_GET_ADDRESS: &str = "ethereumGetAddress";
pub const ETHEREUM_SIGN_MESSAGE: &str = "ethereumSignMessage";
pub const ETHEREUM_SIGN_TYPED_DATA: &str = "ethereumSignTypedData";
pub const ETHEREUM_SIGN_TRANSACTION: &str = "ethereumSignTransaction";
pub const SOLANA_GET_ADDRESS: &str = "solanaGetAddress";
pub const SOLANA_SIGN_TRANSACTION: &str = "solanaSignTransaction";

/// Hardware backend over the Trezor bridge. EVM and Solana transactions
/// only; the bridge offers no Solana message signing and no TON app.
#[derive(Clone)]
pub struct TrezorSigner {
    transports: Arc<dyn TrezorTransportFactory>,
}

impl TrezorSigner {
    pub fn new(transports: Arc<dyn TrezorTransportFactory>) -> Self {
        Self { transports }
    }

    async fn open(&self) -> Result<DeviceGuard<dyn TrezorTransport>, WalletError> {
        Ok(DeviceGuard::new(self.transports.open().await?, "trezor"))
    }
}

/// Bridge responses come as `{success, payload}`. A failed call carries
/// `payload.error` and sometimes `payload.code`.
fn unwrap_payload(method: &str, response: Value) -> Result<Value, WalletError> {
    let Some(success) = response.get("success").and_then(Value::as_bool) else {
        return Ok(response);
    };
    let payload = response.get("payload").cloned().unwrap_or(Value::Null);
    if success {
        return Ok(payload);
    }
    let message = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown trezor error");
    let code = payload.get("code").and_then(Value::as_str).unwrap_or_default();
    if code == "Failure_ActionCancelled" || code == "Method_Cancel" || message.contains("ancelled") {
        return Err(WalletError::UserRejected);
    }
    Err(WalletError::Transport(format!("{method} failed: {message}")))
}

async fn call(
    transport: &mut DeviceGuard<dyn TrezorTransport>,
    method: &str,
    params: Value,
) -> Result<Value, WalletError> {
    let response = transport.call(method, params).await?;
    unwrap_payload(method, response)
}

fn str_field<'a>(value: &'a Value, field: &str, method: &str) -> Result<&'a str, WalletError> {
    value.get(field).and_then(Value::as_str).ok_or_else(|| {
        WalletError::Transport(format!("{method} response is missing {field}"))
    })
}

fn hex_field(value: &Value, field: &str, method: &str) -> Result<Vec<u8>, WalletError> {
    alloy::hex::decode(str_field(value, field, method)?)
        .map_err(|e| WalletError::Transport(format!("{method} returned bad {field}: {e}")))
}

fn wallet_path(wallet: &PersonalWallet, blockchain: Blockchain) -> String {
    wallet
        .derivation_path
        .clone()
        .unwrap_or_else(|| default_path(blockchain).to_owned())
}

async fn verify_address(
    transport: &mut DeviceGuard<dyn TrezorTransport>,
    method: &str,
    wallet: &PersonalWallet,
    path: &str,
) -> Result<(), WalletError> {
    let payload = call(transport, method, json!({"path": path, "showOnTrezor": false})).await?;
    let actual = str_field(&payload, "address", method)?;
    let matches = if method == ETHEREUM_GET_ADDRESS {
        actual.eq_ignore_ascii_case(&wallet.address)
    } else {
        actual == wallet.address
    };
    if !matches {
        warn!(expected = %wallet.address, actual, "trezor reported a different account");
        return Err(WalletError::DeviceMismatch {
            expected: wallet.address.clone(),
            actual: actual.to_owned(),
        });
    }
    Ok(())
}

fn quantity<T: std::fmt::LowerHex>(value: T) -> Value {
    Value::String(format!("{value:#x}"))
}

/// Bridge-shaped EVM transaction: hex quantities, legacy or EIP-1559 fees.
fn bridge_transaction(tx: &TransactionRequest) -> Result<Value, WalletError> {
    let missing = |field: &str| WalletError::InvalidRequest(format!("transaction is missing {field}"));
    let mut out = Map::new();
    if let Some(to) = tx.to.as_ref().and_then(|kind| kind.to()) {
        out.insert("to".into(), Value::String(to.to_checksum(None)));
    }
    out.insert("value".into(), quantity(tx.value.unwrap_or_default()));
    out.insert(
        "data".into(),
        Value::String(alloy::hex::encode_prefixed(
            tx.input.input().cloned().unwrap_or_default(),
        )),
    );
    out.insert("chainId".into(), json!(tx.chain_id.ok_or_else(|| missing("chainId"))?));
    out.insert("nonce".into(), quantity(tx.nonce.ok_or_else(|| missing("nonce"))?));
    out.insert("gasLimit".into(), quantity(tx.gas.ok_or_else(|| missing("gas"))?));
    match (tx.max_fee_per_gas, tx.max_priority_fee_per_gas, tx.gas_price) {
        (Some(max_fee), Some(priority), _) => {
            out.insert("maxFeePerGas".into(), quantity(max_fee));
            out.insert("maxPriorityFeePerGas".into(), quantity(priority));
        }
        (_, _, Some(price)) => {
            out.insert("gasPrice".into(), quantity(price));
        }
        _ => return Err(missing("gasPrice or maxFeePerGas")),
    }
    Ok(Value::Object(out))
}

fn parse_v(raw: &str) -> Result<u64, WalletError> {
    let digits = raw.trim_start_matches("0x");
    u64::from_str_radix(if digits.is_empty() { "0" } else { digits }, 16)
        .map_err(|e| WalletError::Transport(format!("trezor returned bad v {raw:?}: {e}")))
}

#[async_trait]
impl EvmSigner for TrezorSigner {
    async fn sign_message(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Bytes, WalletError> {
        let path = wallet_path(wallet, Blockchain::Evm);
        let mut transport = self.open().await?;
        verify_address(&mut transport, ETHEREUM_GET_ADDRESS, wallet, &path).await?;

        let payload = call(
            &mut transport,
            ETHEREUM_SIGN_MESSAGE,
            json!({"path": path, "message": alloy::hex::encode(message), "hex": true}),
        )
        .await?;
        Ok(hex_field(&payload, "signature", ETHEREUM_SIGN_MESSAGE)?.into())
    }

    async fn sign_typed_data(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        typed_data: &Value,
    ) -> Result<Bytes, WalletError> {
        let typed = payload::parse_typed_data(typed_data)?;
        let (domain, message) = payload::typed_data_parts(&typed)?;
        let data = serde_json::to_value(&typed)
            .map_err(|e| WalletError::InvalidRequest(format!("invalid typed data: {e}")))?;
        let path = wallet_path(wallet, Blockchain::Evm);
        let mut transport = self.open().await?;
        verify_address(&mut transport, ETHEREUM_GET_ADDRESS, wallet, &path).await?;

        let payload = call(
            &mut transport,
            ETHEREUM_SIGN_TYPED_DATA,
            json!({
                "path": path,
                "data": data,
                "metamask_v4_compat": true,
                "domain_separator_hash": alloy::hex::encode(domain),
                "message_hash": alloy::hex::encode(message),
            }),
        )
        .await?;
        Ok(hex_field(&payload, "signature", ETHEREUM_SIGN_TYPED_DATA)?.into())
    }

    async fn sign_transaction(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        tx: &TransactionRequest,
    ) -> Result<Bytes, WalletError> {
        let transaction = bridge_transaction(tx)?;
        let path = wallet_path(wallet, Blockchain::Evm);
        let mut transport = self.open().await?;
        verify_address(&mut transport, ETHEREUM_GET_ADDRESS, wallet, &path).await?;

        let payload = call(
            &mut transport,
            ETHEREUM_SIGN_TRANSACTION,
            json!({"path": path, "transaction": transaction}),
        )
        .await?;
        let r = hex_field(&payload, "r", ETHEREUM_SIGN_TRANSACTION)?;
        let s = hex_field(&payload, "s", ETHEREUM_SIGN_TRANSACTION)?;
        let v = parse_v(str_field(&payload, "v", ETHEREUM_SIGN_TRANSACTION)?)?;
        Ok(payload::rsv_signature(&r, &s, v)?.into())
    }
}

#[async_trait]
impl SvmSigner for TrezorSigner {
    async fn sign_message(
        &self,
        _ctx: SigningContext<'_>,
        _wallet: &PersonalWallet,
        _message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        Err(WalletError::UnsupportedMethod(
            "solana message signing is not available on trezor".to_owned(),
        ))
    }

    async fn sign_transaction(
        &self,
        _ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        transaction: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let layout = WireLayout::parse(transaction)?;
        let path = wallet_path(wallet, Blockchain::Svm);
        let mut transport = self.open().await?;
        verify_address(&mut transport, SOLANA_GET_ADDRESS, wallet, &path).await?;

        let payload = call(
            &mut transport,
            SOLANA_SIGN_TRANSACTION,
            json!({
                "path": path,
                "serializedTx": alloy::hex::encode(layout.message(transaction)),
            }),
        )
        .await?;
        let signature = hex_field(&payload, "signature", SOLANA_SIGN_TRANSACTION)?;
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
