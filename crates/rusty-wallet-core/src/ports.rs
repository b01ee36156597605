use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{KeyringType, KeyringsMetadata, PersonalWallet, WalletType};
use crate::protocol::{Blockchain, RpcErrorObject, WireMessage};

pub const USER_REJECTED_CODE: i64 = 4001;
pub const UNAUTHORIZED_CODE: i64 = 4100;
pub const UNSUPPORTED_METHOD_CODE: i64 = 4200;
pub const DISCONNECTED_CODE: i64 = 4900;
pub const INVALID_REQUEST_CODE: i64 = -32600;
pub const INTERNAL_ERROR_CODE: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider is disconnected")]
    Disconnected,
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("user rejected the request")]
    UserRejected,
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("keyring not found: {0}")]
    KeyringNotFound(String),
    #[error("unsupported wallet type: {0}")]
    UnsupportedWalletType(String),
    #[error("keyring {identifier} is already stored as {existing:?}, refusing {requested:?}")]
    KeyringTypeMismatch {
        identifier: String,
        existing: KeyringType,
        requested: KeyringType,
    },
    #[error("device address mismatch: expected {expected}, device reported {actual}")]
    DeviceMismatch { expected: String, actual: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol version {requested} unsupported, maximum is {supported}")]
    ProtocolVersionUnsupported { requested: u32, supported: u32 },
    #[error("provider overridden by competing provider #{0}")]
    ProviderOverridden(usize),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

impl WalletError {
    pub fn to_rpc_error(&self) -> RpcErrorObject {
        let code = match self {
            WalletError::Rpc { code, .. } => *code,
            WalletError::InvalidRequest(_) | WalletError::Validation(_) => INVALID_REQUEST_CODE,
            WalletError::Disconnected => DISCONNECTED_CODE,
            WalletError::UnsupportedMethod(_) => UNSUPPORTED_METHOD_CODE,
            WalletError::UserRejected => USER_REJECTED_CODE,
            WalletError::KeyringNotFound(_) | WalletError::Decrypt(_) => UNAUTHORIZED_CODE,
            _ => INTERNAL_ERROR_CODE,
        };
        let (message, data) = match self {
            WalletError::Rpc { message, data, .. } => (message.clone(), data.clone()),
            other => (other.to_string(), None),
        };
        RpcErrorObject {
            code,
            message,
            data,
        }
    }

    /// Maps an error object received over the wire back into the taxonomy.
    /// Codes without a dedicated variant are kept verbatim.
    pub fn from_rpc_error(err: RpcErrorObject) -> Self {
        match err.code {
            USER_REJECTED_CODE => WalletError::UserRejected,
            DISCONNECTED_CODE => WalletError::Disconnected,
            _ => WalletError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            },
        }
    }

    pub fn unsupported_wallet_type(blockchain: Blockchain, wallet_type: WalletType) -> Self {
        WalletError::UnsupportedWalletType(format!("{wallet_type} on {}", blockchain.as_str()))
    }
}

/// Outbound side of one context boundary (`window.postMessage`, a runtime port,
/// a WebView bridge).
pub trait MessagePort: Send + Sync {
    fn post(&self, message: WireMessage) -> Result<(), WalletError>;
}

/// Encrypted-at-rest persistence for keyrings. The vault blob is opaque to the
/// store; metadata is stored in the clear.
#[async_trait]
pub trait KeyringStore: Send + Sync {
    async fn load_vault(&self, user_id: &str) -> Result<Option<String>, WalletError>;
    async fn save_vault(&self, user_id: &str, vault: String) -> Result<(), WalletError>;
    async fn load_metadata(&self, user_id: &str) -> Result<Option<KeyringsMetadata>, WalletError>;
    async fn save_metadata(
        &self,
        user_id: &str,
        metadata: KeyringsMetadata,
    ) -> Result<(), WalletError>;
    async fn clear(&self, user_id: &str) -> Result<(), WalletError>;
}

/// Credentials accompanying a sign call. Hardware backends ignore them.
#[derive(Debug, Clone, Copy)]
pub struct SigningContext<'a> {
    pub user_id: &'a str,
    pub password: Option<&'a str>,
}

impl<'a> SigningContext<'a> {
    pub fn new(user_id: &'a str, password: &'a str) -> Self {
        Self {
            user_id,
            password: Some(password),
        }
    }

    pub fn hardware() -> Self {
        Self {
            user_id: "",
            password: None,
        }
    }

    pub fn require_password(&self) -> Result<&'a str, WalletError> {
        self.password
            .ok_or_else(|| WalletError::Validation("password required for local signing".to_owned()))
    }
}

#[async_trait]
pub trait EvmSigner: Send + Sync {
    /// EIP-191 personal message signature, 65 bytes `r || s || v`.
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Bytes, WalletError>;

    async fn sign_typed_data(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        typed_data: &Value,
    ) -> Result<Bytes, WalletError>;

    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        tx: &TransactionRequest,
    ) -> Result<Bytes, WalletError>;
}

#[async_trait]
pub trait SvmSigner: Send + Sync {
    /// Detached Ed25519 signature (64 bytes).
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError>;

    /// Returns the wire transaction with the wallet's signature slot filled.
    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        transaction: &[u8],
    ) -> Result<Vec<u8>, WalletError>;
}

#[async_trait]
pub trait TvmSigner: Send + Sync {
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError>;

    /// Signs a pre-serialized transfer payload produced by the application layer.
    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        payload: &[u8],
    ) -> Result<Vec<u8>, WalletError>;
}

/// An exclusively held hardware connection. `close` must be idempotent.
pub trait DeviceSession: Send {
    fn close(&mut self);
}

#[async_trait]
pub trait LedgerTransport: DeviceSession {
    /// Sends one APDU and returns the response including the trailing status word.
    async fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, WalletError>;
}

#[async_trait]
pub trait LedgerTransportFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn LedgerTransport>, WalletError>;
}

#[async_trait]
pub trait TrezorTransport: DeviceSession {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, WalletError>;
}

#[async_trait]
pub trait TrezorTransportFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn TrezorTransport>, WalletError>;
}

/// Regular Solana chain connection, independent of the wallet channel.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// Submits a signed wire transaction and returns its base58 signature.
    async fn send_raw_transaction(&self, transaction: &[u8]) -> Result<String, WalletError>;
}

#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, WalletError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundRequest {
    pub blockchain: Blockchain,
    pub method: String,
    pub params: Value,
    pub href: Option<String>,
}

/// The privileged wallet service answering page requests.
#[async_trait]
pub trait BackgroundHandler: Send + Sync {
    async fn handle(&self, request: BackgroundRequest) -> Result<Value, WalletError>;
}
