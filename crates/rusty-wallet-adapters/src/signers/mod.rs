mod device;
pub mod ledger;
mod local;
pub mod payload;
mod trezor;

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use rusty_wallet_core::{
    Blockchain, EvmSigner, LedgerTransportFactory, PersonalWallet, SigningContext, SvmSigner,
    TrezorTransportFactory, TvmSigner, WalletError, WalletType,
};

use crate::keyring::KeyringService;

pub use device::DeviceGuard;
pub use ledger::{apdu, check_status, serialize_path, LedgerSigner, CLA, MAX_CHUNK};
pub use local::LocalSigner;
pub use trezor::{
    TrezorSigner, ETHEREUM_GET_ADDRESS, ETHEREUM_SIGN_MESSAGE, ETHEREUM_SIGN_TRANSACTION,
    ETHEREUM_SIGN_TYPED_DATA, SOLANA_GET_ADDRESS, SOLANA_SIGN_TRANSACTION,
};

/// Routes a signing call to the backend registered for the wallet's
/// declared type.
pub struct SignerDispatcher<B: ?Sized> {
    blockchain: Blockchain,
    backends: BTreeMap<WalletType, Arc<B>>,
}

pub type EvmDispatcher = SignerDispatcher<dyn EvmSigner>;
pub type SvmDispatcher = SignerDispatcher<dyn SvmSigner>;
pub type TvmDispatcher = SignerDispatcher<dyn TvmSigner>;

impl<B: ?Sized> SignerDispatcher<B> {
    pub fn new(blockchain: Blockchain) -> Self {
        Self {
            blockchain,
            backends: BTreeMap::new(),
        }
    }

    pub fn with_backend(mut self, wallet_type: WalletType, backend: Arc<B>) -> Self {
        self.backends.insert(wallet_type, backend);
        self
    }

    pub fn blockchain(&self) -> Blockchain {
        self.blockchain
    }

    pub fn supports(&self, wallet_type: WalletType) -> bool {
        self.backends.contains_key(&wallet_type)
    }

    pub fn wallet_types(&self) -> Vec<WalletType> {
        self.backends.keys().copied().collect()
    }

    pub fn backend(&self, wallet_type: WalletType) -> Result<&Arc<B>, WalletError> {
        debug!(
            blockchain = self.blockchain.as_str(),
            %wallet_type,
            "dispatching sign request"
        );
        self.backends
            .get(&wallet_type)
            .ok_or_else(|| WalletError::unsupported_wallet_type(self.blockchain, wallet_type))
    }
}

#[async_trait]
impl EvmSigner for EvmDispatcher {
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Bytes, WalletError> {
        self.backend(wallet.wallet_type)?
            .sign_message(ctx, wallet, message)
            .await
    }

    async fn sign_typed_data(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        typed_data: &Value,
    ) -> Result<Bytes, WalletError> {
        self.backend(wallet.wallet_type)?
            .sign_typed_data(ctx, wallet, typed_data)
            .await
    }

    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        tx: &TransactionRequest,
    ) -> Result<Bytes, WalletError> {
        self.backend(wallet.wallet_type)?
            .sign_transaction(ctx, wallet, tx)
            .await
    }
}

#[async_trait]
impl SvmSigner for SvmDispatcher {
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        self.backend(wallet.wallet_type)?
            .sign_message(ctx, wallet, message)
            .await
    }

    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        transaction: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        self.backend(wallet.wallet_type)?
            .sign_transaction(ctx, wallet, transaction)
            .await
    }
}

#[async_trait]
impl TvmSigner for TvmDispatcher {
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        self.backend(wallet.wallet_type)?
            .sign_message(ctx, wallet, message)
            .await
    }

    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        payload: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        self.backend(wallet.wallet_type)?
            .sign_transaction(ctx, wallet, payload)
            .await
    }
}

/// One dispatcher per blockchain family.
pub struct SignerAssembly {
    pub evm: EvmDispatcher,
    pub svm: SvmDispatcher,
    pub tvm: TvmDispatcher,
}

impl SignerAssembly {
    /// Browser extension: local keyrings plus Ledger and Trezor. Trezor has
    /// no TON app, so TVM only gets Ledger.
    pub fn extension(
        keyrings: Arc<KeyringService>,
        ledger: Arc<dyn LedgerTransportFactory>,
        trezor: Arc<dyn TrezorTransportFactory>,
    ) -> Self {
        let local = Arc::new(LocalSigner::new(keyrings));
        let ledger = Arc::new(LedgerSigner::new(ledger));
        let trezor = Arc::new(TrezorSigner::new(trezor));
        Self {
            evm: EvmDispatcher::new(Blockchain::Evm)
                .with_backend(WalletType::SeedPhrase, local.clone())
                .with_backend(WalletType::PrivateKey, local.clone())
                .with_backend(WalletType::Ledger, ledger.clone())
                .with_backend(WalletType::Trezor, trezor.clone()),
            svm: SvmDispatcher::new(Blockchain::Svm)
                .with_backend(WalletType::SeedPhrase, local.clone())
                .with_backend(WalletType::PrivateKey, local.clone())
                .with_backend(WalletType::Ledger, ledger.clone())
                .with_backend(WalletType::Trezor, trezor),
            tvm: TvmDispatcher::new(Blockchain::Tvm)
                .with_backend(WalletType::SeedPhrase, local.clone())
                .with_backend(WalletType::PrivateKey, local)
                .with_backend(WalletType::Ledger, ledger),
        }
    }

    /// Mobile webview: software keyrings only.
    pub fn mobile(keyrings: Arc<KeyringService>) -> Self {
        let local = Arc::new(LocalSigner::new(keyrings));
        Self {
            evm: EvmDispatcher::new(Blockchain::Evm)
                .with_backend(WalletType::SeedPhrase, local.clone())
                .with_backend(WalletType::PrivateKey, local.clone()),
            svm: SvmDispatcher::new(Blockchain::Svm)
                .with_backend(WalletType::SeedPhrase, local.clone())
                .with_backend(WalletType::PrivateKey, local.clone()),
            tvm: TvmDispatcher::new(Blockchain::Tvm)
                .with_backend(WalletType::SeedPhrase, local.clone())
                .with_backend(WalletType::PrivateKey, local),
        }
    }
}
