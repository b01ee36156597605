mod features;
mod rpc;
mod siws;
mod transaction;

use std::sync::{Arc, Mutex, MutexGuard};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{SecondsFormat, Utc};
use futures::future::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use rusty_wallet_core::{Blockchain, MessageEvent, MessagePort, SolanaRpc, WalletError};

use crate::config::WalletBridgeConfig;
use crate::correlator::ProviderChannel;
use crate::envelope::OriginGuard;
use crate::events::{EventEmitter, Listener, Unsubscribe};
use crate::evm::SharedRequest;

pub use features::{
    FeatureRegistry, WalletFeature, SOLANA_SIGN_AND_SEND_TRANSACTION, SOLANA_SIGN_IN,
    SOLANA_SIGN_MESSAGE, SOLANA_SIGN_TRANSACTION, STANDARD_CONNECT, STANDARD_DISCONNECT,
    STANDARD_EVENTS,
};
pub use rpc::HttpSolanaRpc;
pub use siws::{format_sign_in_message, SignInInput};
pub use transaction::{
    decode_compact_u16, encode_compact_u16, fill_signature, TransactionVersion, WireLayout,
    PUBKEY_LEN, SIGNATURE_LEN,
};

pub const CHANGE_EVENT: &str = "change";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaAccount {
    pub address: String,
    pub public_key: Vec<u8>,
    pub chains: Vec<String>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignMessageOutput {
    pub signed_message: Vec<u8>,
    pub signature: Vec<u8>,
    pub signature_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignTransactionOutput {
    pub signed_transaction: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignAndSendTransactionOutput {
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutput {
    pub account: SolanaAccount,
    pub signed_message: Vec<u8>,
    pub signature: Vec<u8>,
    pub signature_type: &'static str,
}

struct SolanaState {
    account: Option<SolanaAccount>,
    in_flight_connect: Option<SharedRequest>,
}

struct SolanaInner {
    channel: ProviderChannel,
    events: Arc<EventEmitter>,
    rpc: Arc<dyn SolanaRpc>,
    features: FeatureRegistry,
    chains: Vec<String>,
    domain: String,
    state: Mutex<SolanaState>,
}

/// Wallet Standard façade for Solana dApps.
#[derive(Clone)]
pub struct SolanaProvider {
    inner: Arc<SolanaInner>,
}

impl SolanaProvider {
    pub fn new(
        channel: ProviderChannel,
        rpc: Arc<dyn SolanaRpc>,
        chains: Vec<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SolanaInner {
                channel,
                events: Arc::new(EventEmitter::new()),
                rpc,
                features: FeatureRegistry::standard(),
                chains,
                domain: domain.into(),
                state: Mutex::new(SolanaState {
                    account: None,
                    in_flight_connect: None,
                }),
            }),
        }
    }

    pub fn from_config(
        config: &WalletBridgeConfig,
        port: Arc<dyn MessagePort>,
        rpc: Arc<dyn SolanaRpc>,
    ) -> Self {
        let channel =
            ProviderChannel::new(Blockchain::Svm, OriginGuard::from_config(config), port);
        Self::new(
            channel,
            rpc,
            config.solana_chains.clone(),
            host_of(&config.page_origin),
        )
    }

    pub fn features(&self) -> &FeatureRegistry {
        &self.inner.features
    }

    pub fn chains(&self) -> &[String] {
        &self.inner.chains
    }

    pub fn accounts(&self) -> Result<Vec<SolanaAccount>, WalletError> {
        Ok(self.inner.account()?.into_iter().collect())
    }

    /// `standard:events`. Only `change` is ever emitted.
    pub fn on(&self, event: &str, listener: Listener) -> Unsubscribe {
        if event != CHANGE_EVENT {
            debug!(event, "subscription to an event the wallet never emits");
        }
        self.inner.events.subscribe(event, listener)
    }

    /// `standard:connect`. Returns the cached account without a round-trip
    /// when already connected.
    pub async fn connect(&self, silent: bool) -> Result<Vec<SolanaAccount>, WalletError> {
        if let Some(account) = self.inner.account()? {
            return Ok(vec![account]);
        }
        self.connect_request(silent)?.await?;
        self.accounts()
    }

    fn connect_request(&self, silent: bool) -> Result<SharedRequest, WalletError> {
        let mut g = self.inner.lock_state()?;
        if let Some(existing) = g.in_flight_connect.as_ref() {
            return Ok(existing.clone());
        }
        let inner = Arc::clone(&self.inner);
        let future = async move {
            let outcome = match inner
                .channel
                .request("connect", json!([{"silent": silent}]))
                .await
            {
                Ok(value) => {
                    let key = public_key_field(&value);
                    inner.apply_account(key.as_deref()).map(|_| value)
                }
                Err(e) => Err(e),
            };
            if let Ok(mut g) = inner.lock_state() {
                g.in_flight_connect = None;
            }
            outcome
        }
        .boxed()
        .shared();
        g.in_flight_connect = Some(future.clone());
        Ok(future)
    }

    /// `standard:disconnect`.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        self.inner.channel.request("disconnect", json!([])).await?;
        self.inner.apply_account(None)
    }

    async fn ensure_account(&self) -> Result<SolanaAccount, WalletError> {
        if let Some(account) = self.inner.account()? {
            return Ok(account);
        }
        self.connect(false)
            .await?
            .into_iter()
            .next()
            .ok_or(WalletError::Disconnected)
    }

    /// `solana:signMessage`.
    pub async fn sign_message(&self, message: &[u8]) -> Result<SignMessageOutput, WalletError> {
        let account = self.ensure_account().await?;
        let result = self
            .inner
            .channel
            .request(
                "signMessage",
                json!([{"address": account.address, "message": B64.encode(message)}]),
            )
            .await?;
        Ok(SignMessageOutput {
            signed_message: message.to_vec(),
            signature: bytes_field(&result, "signature")?,
            signature_type: "ed25519",
        })
    }

    /// `solana:signTransaction`.
    pub async fn sign_transaction(
        &self,
        transaction: &[u8],
        chain: Option<&str>,
    ) -> Result<SignTransactionOutput, WalletError> {
        let account = self.ensure_account().await?;
        let chain = self.resolve_chain(chain)?;
        let result = self
            .inner
            .channel
            .request(
                "signTransaction",
                json!([{
                    "address": account.address,
                    "transaction": B64.encode(transaction),
                    "chain": chain,
                }]),
            )
            .await?;
        Ok(SignTransactionOutput {
            signed_transaction: bytes_field(&result, "signedTransaction")?,
        })
    }

    /// `solana:signAndSendTransaction`: signs over the wallet channel, then
    /// submits through the chain RPC connection.
    pub async fn sign_and_send_transaction(
        &self,
        transaction: &[u8],
        chain: Option<&str>,
    ) -> Result<SignAndSendTransactionOutput, WalletError> {
        let signed = self.sign_transaction(transaction, chain).await?;
        let signature = self
            .inner
            .rpc
            .send_raw_transaction(&signed.signed_transaction)
            .await?;
        let signature = bs58::decode(&signature)
            .into_vec()
            .map_err(|e| WalletError::Transport(format!("rpc returned invalid signature: {e}")))?;
        Ok(SignAndSendTransactionOutput { signature })
    }

    /// `solana:signIn`: the SIWS text is built here and signed as a message.
    pub async fn sign_in(&self, mut input: SignInInput) -> Result<SignInOutput, WalletError> {
        let account = self.ensure_account().await?;
        if let Some(requested) = &input.address {
            if *requested != account.address {
                return Err(WalletError::InvalidRequest(format!(
                    "sign-in requested for {requested}, connected account is {}",
                    account.address
                )));
            }
        }
        let domain = input
            .domain
            .get_or_insert_with(|| self.inner.domain.clone())
            .clone();
        if input.issued_at.is_none() {
            input.issued_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        let text = format_sign_in_message(&domain, &account.address, &input);
        let signed = self.sign_message(text.as_bytes()).await?;
        Ok(SignInOutput {
            account,
            signed_message: signed.signed_message,
            signature: signed.signature,
            signature_type: signed.signature_type,
        })
    }

    fn resolve_chain(&self, chain: Option<&str>) -> Result<String, WalletError> {
        match chain {
            Some(chain) if self.inner.chains.iter().any(|c| c == chain) => Ok(chain.to_owned()),
            Some(chain) => Err(WalletError::InvalidRequest(format!(
                "unsupported solana chain {chain}"
            ))),
            None => self
                .inner
                .chains
                .first()
                .cloned()
                .ok_or_else(|| WalletError::Validation("no solana chain configured".to_owned())),
        }
    }

    pub fn handle_message(&self, event: &MessageEvent) -> Result<(), WalletError> {
        if let Some(notification) = self.inner.channel.accept(event) {
            self.handle_notification(&notification.name, &notification.data)?;
        }
        Ok(())
    }

    pub fn handle_notification(&self, name: &str, data: &Value) -> Result<(), WalletError> {
        match name {
            "connected" | "activeWalletUpdated" => {
                self.inner.apply_account(public_key_field(data).as_deref())
            }
            "disconnected" => self.inner.apply_account(None),
            other => {
                debug!(name = other, "ignoring unknown solana notification");
                Ok(())
            }
        }
    }
}

impl SolanaInner {
    fn lock_state(&self) -> Result<MutexGuard<'_, SolanaState>, WalletError> {
        self.state
            .lock()
            .map_err(|e| WalletError::Transport(format!("solana provider lock poisoned: {e}")))
    }

    fn account(&self) -> Result<Option<SolanaAccount>, WalletError> {
        Ok(self.lock_state()?.account.clone())
    }

    fn build_account(&self, address: &str) -> Result<SolanaAccount, WalletError> {
        let public_key = bs58::decode(address)
            .into_vec()
            .map_err(|e| WalletError::Validation(format!("invalid solana address: {e}")))?;
        if public_key.len() != PUBKEY_LEN {
            return Err(WalletError::Validation(format!(
                "solana public key must be {PUBKEY_LEN} bytes, got {}",
                public_key.len()
            )));
        }
        Ok(SolanaAccount {
            address: address.to_owned(),
            public_key,
            chains: self.chains.clone(),
            features: self.features.account_features(),
        })
    }

    /// Sets the active account and emits `change` only when it differs.
    fn apply_account(&self, address: Option<&str>) -> Result<(), WalletError> {
        let account = address.map(|a| self.build_account(a)).transpose()?;
        let changed = {
            let mut g = self.lock_state()?;
            if g.account == account {
                false
            } else {
                g.account = account.clone();
                true
            }
        };
        if changed {
            let accounts: Vec<SolanaAccount> = account.into_iter().collect();
            self.events
                .emit(CHANGE_EVENT, &json!({ "accounts": accounts }));
        }
        Ok(())
    }
}

fn public_key_field(value: &Value) -> Option<String> {
    value
        .get("publicKey")
        .unwrap_or(value)
        .as_str()
        .map(str::to_owned)
}

/// Reads a base64 byte field, accepting either `{key: "..."}` or a bare string.
fn bytes_field(value: &Value, key: &str) -> Result<Vec<u8>, WalletError> {
    let raw = value
        .get(key)
        .unwrap_or(value)
        .as_str()
        .ok_or_else(|| WalletError::Validation(format!("missing {key} in response")))?;
    B64.decode(raw)
        .map_err(|e| WalletError::Validation(format!("{key} is not valid base64: {e}")))
}

fn host_of(origin: &str) -> String {
    origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin)
        .trim_end_matches('/')
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_strips_scheme_and_slash() {
        assert_eq!(host_of("https://dapp.example/"), "dapp.example");
        assert_eq!(host_of("dapp.example"), "dapp.example");
    }

    #[test]
    fn bytes_field_accepts_object_or_string() {
        let encoded = B64.encode([1u8, 2, 3]);
        assert_eq!(
            bytes_field(&json!({"signature": encoded}), "signature").expect("object"),
            vec![1, 2, 3]
        );
        assert_eq!(
            bytes_field(&json!(encoded), "signature").expect("string"),
            vec![1, 2, 3]
        );
        assert!(bytes_field(&json!({"other": 1}), "signature").is_err());
    }
}
