//! rusty-wallet: runs the page providers, relay and wallet service in one
//! process and drives a short session across all three blockchains.

use std::sync::Arc;

use serde_json::json;

use rusty_wallet_adapters::ton::{ConnectItem, ConnectRequest};
use rusty_wallet_adapters::{
    HttpManifestFetcher, InMemoryKeyringStore, KeyringService, RequestArguments, TonConnect,
    WalletBridgeConfig,
};

mod host;
mod wallet_service;

use wallet_service::WalletService;

/// Well-known development mnemonic. Never holds funds.
const DEV_PHRASE: &str = "test test test test test test test test test test test junk";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting rusty-wallet host");

    let config = WalletBridgeConfig::from_env();
    let phrase = std::env::var("RUSTY_WALLET_DEMO_PHRASE").unwrap_or_else(|_| DEV_PHRASE.to_owned());
    let keyrings = Arc::new(KeyringService::new(
        Arc::new(InMemoryKeyringStore::new()),
        config.kdf,
    ));
    let wallet = WalletService::bootstrap(
        keyrings,
        "local-user",
        "local-password",
        &phrase,
        &config.default_evm_chain_id,
    )
    .await?;
    let page = host::spawn(&config, Arc::new(wallet))?;

    let accounts = page
        .ethereum
        .request(RequestArguments::without_params("eth_requestAccounts"))
        .await?;
    tracing::info!(%accounts, "ethereum connected");
    let address = accounts[0].clone();
    let signature = page
        .ethereum
        .request(RequestArguments::new(
            "personal_sign",
            json!([address, "0x68656c6c6f2072757374792077616c6c6574"]),
        ))
        .await?;
    tracing::info!(%signature, "personal_sign");

    let solana = page.solana.connect(false).await?;
    if let Some(account) = solana.first() {
        tracing::info!(address = %account.address, "solana connected");
    }
    let signed = page.solana.sign_message(b"hello rusty wallet").await?;
    tracing::info!(bytes = signed.signature.len(), "solana signMessage");

    let ton = TonConnect::new(
        page.ton.clone(),
        Arc::new(HttpManifestFetcher::from_config(&config)?),
        &config,
    );
    let event = match std::env::var("RUSTY_WALLET_TON_MANIFEST_URL") {
        Ok(manifest_url) => {
            ton.connect(
                ton.protocol_version(),
                ConnectRequest {
                    manifest_url,
                    items: vec![ConnectItem::TonAddr],
                },
            )
            .await
        }
        Err(_) => ton.restore_connection().await,
    };
    tracing::info!(event = %serde_json::to_value(&event)?, "tonconnect");

    tracing::info!("Session complete");
    Ok(())
}
