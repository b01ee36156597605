use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::transaction::TransactionVersion;

pub const STANDARD_CONNECT: &str = "standard:connect";
pub const STANDARD_DISCONNECT: &str = "standard:disconnect";
pub const STANDARD_EVENTS: &str = "standard:events";
pub const SOLANA_SIGN_AND_SEND_TRANSACTION: &str = "solana:signAndSendTransaction";
pub const SOLANA_SIGN_TRANSACTION: &str = "solana:signTransaction";
pub const SOLANA_SIGN_MESSAGE: &str = "solana:signMessage";
pub const SOLANA_SIGN_IN: &str = "solana:signIn";

const SUPPORTED_TX_VERSIONS: [TransactionVersion; 2] =
    [TransactionVersion::Legacy, TransactionVersion::V0(0)];

/// One capability advertised to the page, carrying its own version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletFeature {
    Connect { version: &'static str },
    Disconnect { version: &'static str },
    Events { version: &'static str },
    SignAndSendTransaction {
        version: &'static str,
        supported_transaction_versions: Vec<TransactionVersion>,
    },
    SignTransaction {
        version: &'static str,
        supported_transaction_versions: Vec<TransactionVersion>,
    },
    SignMessage { version: &'static str },
    SignIn { version: &'static str },
}

impl WalletFeature {
    pub fn name(&self) -> &'static str {
        match self {
            WalletFeature::Connect { .. } => STANDARD_CONNECT,
            WalletFeature::Disconnect { .. } => STANDARD_DISCONNECT,
            WalletFeature::Events { .. } => STANDARD_EVENTS,
            WalletFeature::SignAndSendTransaction { .. } => SOLANA_SIGN_AND_SEND_TRANSACTION,
            WalletFeature::SignTransaction { .. } => SOLANA_SIGN_TRANSACTION,
            WalletFeature::SignMessage { .. } => SOLANA_SIGN_MESSAGE,
            WalletFeature::SignIn { .. } => SOLANA_SIGN_IN,
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            WalletFeature::Connect { version }
            | WalletFeature::Disconnect { version }
            | WalletFeature::Events { version }
            | WalletFeature::SignAndSendTransaction { version, .. }
            | WalletFeature::SignTransaction { version, .. }
            | WalletFeature::SignMessage { version }
            | WalletFeature::SignIn { version } => version,
        }
    }

    /// Descriptor as the page sees it, without the callable.
    pub fn descriptor(&self) -> Value {
        match self {
            WalletFeature::SignAndSendTransaction {
                version,
                supported_transaction_versions,
            }
            | WalletFeature::SignTransaction {
                version,
                supported_transaction_versions,
            } => json!({
                "version": version,
                "supportedTransactionVersions": supported_transaction_versions,
            }),
            other => json!({"version": other.version()}),
        }
    }
}

/// Immutable feature map, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRegistry {
    features: BTreeMap<&'static str, WalletFeature>,
}

impl FeatureRegistry {
    pub fn standard() -> Self {
        let features = [
            WalletFeature::Connect { version: "1.0.0" },
            WalletFeature::Disconnect { version: "1.0.0" },
            WalletFeature::Events { version: "1.0.0" },
            WalletFeature::SignAndSendTransaction {
                version: "1.0.0",
                supported_transaction_versions: SUPPORTED_TX_VERSIONS.to_vec(),
            },
            WalletFeature::SignTransaction {
                version: "1.0.0",
                supported_transaction_versions: SUPPORTED_TX_VERSIONS.to_vec(),
            },
            WalletFeature::SignMessage { version: "1.0.0" },
            WalletFeature::SignIn { version: "1.0.0" },
        ];
        Self {
            features: features.into_iter().map(|f| (f.name(), f)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&WalletFeature> {
        self.features.get(name)
    }

    pub fn supports(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.features.keys().copied().collect()
    }

    /// Feature names an account advertises. Event and connection features
    /// are wallet-level, not account-level.
    pub fn account_features(&self) -> Vec<String> {
        self.features
            .keys()
            .filter(|name| name.starts_with("solana:"))
            .map(|name| (*name).to_owned())
            .collect()
    }

    pub fn descriptors(&self) -> Value {
        Value::Object(
            self.features
                .iter()
                .map(|(name, f)| ((*name).to_owned(), f.descriptor()))
                .collect(),
        )
    }
}
