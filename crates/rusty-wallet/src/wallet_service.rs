//! Privileged wallet side of the host: owns the keyrings and answers page
//! requests through the signer dispatchers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde_json::{json, Value};
use tracing::info;

use rusty_wallet_adapters::keyring::new_keyring;
use rusty_wallet_adapters::{KeyringService, SignerAssembly};
use rusty_wallet_core::{
    BackgroundHandler, BackgroundRequest, Blockchain, EvmSigner, KeyringType, PersonalWallet,
    SigningContext, SvmSigner, TvmSigner, WalletError, WalletType,
};

/// One unlocked user with a seed-phrase wallet on every blockchain.
pub struct WalletService {
    signers: SignerAssembly,
    user_id: String,
    password: String,
    evm: PersonalWallet,
    svm: PersonalWallet,
    tvm: PersonalWallet,
    chain_id: Mutex<String>,
}

impl WalletService {
    pub async fn bootstrap(
        keyrings: Arc<KeyringService>,
        user_id: &str,
        password: &str,
        phrase: &str,
        chain_id: &str,
    ) -> Result<Self, WalletError> {
        let evm = import(&keyrings, user_id, password, phrase, Blockchain::Evm).await?;
        let svm = import(&keyrings, user_id, password, phrase, Blockchain::Svm).await?;
        let tvm = import(&keyrings, user_id, password, phrase, Blockchain::Tvm).await?;

        Ok(Self {
            signers: SignerAssembly::mobile(keyrings),
            user_id: user_id.to_owned(),
            password: password.to_owned(),
            evm,
            svm,
            tvm,
            chain_id: Mutex::new(chain_id.to_owned()),
        })
    }

    fn ctx(&self) -> SigningContext<'_> {
        SigningContext::new(&self.user_id, &self.password)
    }

    fn chain_id(&self) -> Result<String, WalletError> {
        self.chain_id
            .lock()
            .map(|g| g.clone())
            .map_err(|e| WalletError::Transport(format!("wallet service lock poisoned: {e}")))
    }

    async fn handle_evm(&self, method: &str, params: &Value) -> Result<Value, WalletError> {
        match method {
            "eth_requestAccounts" => Ok(json!({
                "publicKey": self.evm.address,
                "chainId": self.chain_id()?,
            })),
            "eth_chainId" => Ok(json!(self.chain_id()?)),
            "wallet_switchEthereumChain" => {
                let chain = params[0]["chainId"]
                    .as_str()
                    .ok_or_else(|| WalletError::InvalidRequest("missing chainId".to_owned()))?;
                let mut g = self
                    .chain_id
                    .lock()
                    .map_err(|e| WalletError::Transport(format!("wallet service lock poisoned: {e}")))?;
                *g = chain.to_owned();
                Ok(Value::Null)
            }
            "personal_sign" => {
                let message = decode_hex_param(&params[0])?;
                let signature = self
                    .signers
                    .evm
                    .sign_message(self.ctx(), &self.evm, &message)
                    .await?;
                Ok(json!(signature.to_string()))
            }
            "eth_signTypedData_v4" => {
                let typed_data = match &params[1] {
                    Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
                        WalletError::InvalidRequest(format!("typed data is not json: {e}"))
                    })?,
                    other => other.clone(),
                };
                let signature = self
                    .signers
                    .evm
                    .sign_typed_data(self.ctx(), &self.evm, &typed_data)
                    .await?;
                Ok(json!(signature.to_string()))
            }
            other => Err(WalletError::UnsupportedMethod(other.to_owned())),
        }
    }

    async fn handle_svm(&self, method: &str, params: &Value) -> Result<Value, WalletError> {
        match method {
            "connect" => Ok(json!({"publicKey": self.svm.address})),
            "disconnect" => Ok(Value::Null),
            "signMessage" => {
                let message = decode_b64_param(&params[0]["message"])?;
                let signature = self
                    .signers
                    .svm
                    .sign_message(self.ctx(), &self.svm, &message)
                    .await?;
                Ok(json!({"signature": B64.encode(signature)}))
            }
            "signTransaction" => {
                let transaction = decode_b64_param(&params[0]["transaction"])?;
                let signed = self
                    .signers
                    .svm
                    .sign_transaction(self.ctx(), &self.svm, &transaction)
                    .await?;
                Ok(json!({"signedTransaction": B64.encode(signed)}))
            }
            other => Err(WalletError::UnsupportedMethod(other.to_owned())),
        }
    }

    async fn handle_tvm(&self, method: &str, params: &Value) -> Result<Value, WalletError> {
        match method {
            "connect" | "restoreConnection" => Ok(json!({
                "items": [{
                    "name": "ton_addr",
                    "address": self.tvm.address,
                    "network": "-239",
                }],
            })),
            "disconnect" => Ok(Value::Null),
            "send" => {
                let request = &params[0];
                let payload = request["params"][0].as_str().ok_or_else(|| {
                    WalletError::InvalidRequest("missing ton request payload".to_owned())
                })?;
                let signature = match request["method"].as_str() {
                    Some("signData") => {
                        self.signers
                            .tvm
                            .sign_message(self.ctx(), &self.tvm, payload.as_bytes())
                            .await?
                    }
                    Some("sendTransaction") => {
                        self.signers
                            .tvm
                            .sign_transaction(self.ctx(), &self.tvm, payload.as_bytes())
                            .await?
                    }
                    other => {
                        return Err(WalletError::UnsupportedMethod(
                            other.unwrap_or_default().to_owned(),
                        ))
                    }
                };
                Ok(json!(B64.encode(signature)))
            }
            other => Err(WalletError::UnsupportedMethod(other.to_owned())),
        }
    }
}

#[async_trait]
impl BackgroundHandler for WalletService {
    async fn handle(&self, request: BackgroundRequest) -> Result<Value, WalletError> {
        info!(
            chain = request.blockchain.as_str(),
            method = %request.method,
            href = request.href.as_deref().unwrap_or("-"),
            "wallet request"
        );
        match request.blockchain {
            Blockchain::Evm => self.handle_evm(&request.method, &request.params).await,
            Blockchain::Svm => self.handle_svm(&request.method, &request.params).await,
            Blockchain::Tvm => self.handle_tvm(&request.method, &request.params).await,
        }
    }
}

async fn import(
    keyrings: &KeyringService,
    user_id: &str,
    password: &str,
    phrase: &str,
    blockchain: Blockchain,
) -> Result<PersonalWallet, WalletError> {
    let keyring = new_keyring(KeyringType::SeedPhrase, blockchain, phrase)?;
    let identifier = keyring.keyring_identifier.clone();
    keyrings
        .create_keyring(user_id, password, Some(keyring))
        .await?;
    info!(chain = blockchain.as_str(), address = %identifier, "wallet ready");
    Ok(PersonalWallet {
        address: identifier.clone(),
        keyring_identifier: Some(identifier),
        derivation_path: None,
        wallet_type: WalletType::SeedPhrase,
    })
}

fn decode_hex_param(value: &Value) -> Result<Vec<u8>, WalletError> {
    let raw = value
        .as_str()
        .ok_or_else(|| WalletError::InvalidRequest("expected a hex string".to_owned()))?;
    alloy::hex::decode(raw).map_err(|e| WalletError::InvalidRequest(format!("bad hex: {e}")))
}

fn decode_b64_param(value: &Value) -> Result<Vec<u8>, WalletError> {
    let raw = value
        .as_str()
        .ok_or_else(|| WalletError::InvalidRequest("expected a base64 string".to_owned()))?;
    B64.decode(raw)
        .map_err(|e| WalletError::InvalidRequest(format!("bad base64: {e}")))
}
