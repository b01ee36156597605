use std::sync::Arc;

use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::Value;

use rusty_wallet_core::{
    EvmSigner, PersonalWallet, SigningContext, SvmSigner, TvmSigner, WalletError,
};

use crate::keyring::KeyringService;

/// Software signer backed by the encrypted keyring vault. One instance
/// serves every blockchain family.
#[derive(Clone)]
pub struct LocalSigner {
    keyrings: Arc<KeyringService>,
}

impl LocalSigner {
    pub fn new(keyrings: Arc<KeyringService>) -> Self {
        Self { keyrings }
    }
}

#[async_trait]
impl EvmSigner for LocalSigner {
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Bytes, WalletError> {
        let password = ctx.require_password()?;
        self.keyrings
            .sign_evm_message(ctx.user_id, password, wallet, message)
            .await
    }

    async fn sign_typed_data(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        typed_data: &Value,
    ) -> Result<Bytes, WalletError> {
        let password = ctx.require_password()?;
        self.keyrings
            .sign_evm_typed_data(ctx.user_id, password, wallet, typed_data)
            .await
    }

    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        tx: &TransactionRequest,
    ) -> Result<Bytes, WalletError> {
        let password = ctx.require_password()?;
        self.keyrings
            .sign_evm_transaction(ctx.user_id, password, wallet, tx)
            .await
    }
}

#[async_trait]
impl SvmSigner for LocalSigner {
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let password = ctx.require_password()?;
        self.keyrings
            .sign_svm_message(ctx.user_id, password, wallet, message)
            .await
    }

    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        transaction: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let password = ctx.require_password()?;
        self.keyrings
            .sign_svm_transaction(ctx.user_id, password, wallet, transaction)
            .await
    }
}

#[async_trait]
impl TvmSigner for LocalSigner {
    async fn sign_message(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let password = ctx.require_password()?;
        self.keyrings
            .sign_tvm_message(ctx.user_id, password, wallet, message)
            .await
    }

    async fn sign_transaction(
        &self,
        ctx: SigningContext<'_>,
        wallet: &PersonalWallet,
        payload: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        let password = ctx.require_password()?;
        self.keyrings
            .sign_tvm_transaction(ctx.user_id, password, wallet, payload)
            .await
    }
}
