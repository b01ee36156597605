pub mod background;
pub mod config;
pub mod correlator;
pub mod crypto;
pub mod envelope;
pub mod events;
pub mod evm;
pub mod keyring;
pub mod relay;
pub mod router;
pub mod signers;
pub mod solana;
pub mod ton;

#[cfg(target_arch = "wasm32")]
pub mod browser;

pub use background::BackgroundEndpoint;
pub use config::{KdfConfig, ProviderInfoConfig, RuntimeKind, TonDeviceInfo, WalletBridgeConfig};
pub use correlator::{ProviderChannel, RequestCorrelator};
pub use envelope::OriginGuard;
pub use events::{listener, EventEmitter, Listener, Unsubscribe};
pub use evm::{Eip1193Provider, Eip6963Announcer, EvmProvider, RequestArguments};
pub use keyring::{InMemoryKeyringStore, KeyringService};
pub use relay::ContextRelay;
pub use router::{ActiveProvider, MultiProviderRouter};
pub use signers::{
    EvmDispatcher, LedgerSigner, LocalSigner, SignerAssembly, SignerDispatcher, SvmDispatcher,
    TrezorSigner, TvmDispatcher,
};
pub use solana::{HttpSolanaRpc, SolanaProvider};
pub use ton::{HttpManifestFetcher, TonConnect, TonProvider};
