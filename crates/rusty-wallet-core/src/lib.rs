pub mod domain;
pub mod ports;
pub mod protocol;
pub mod state_machine;

pub use domain::{
    Keyring, KeyringMetadata, KeyringType, KeyringsMetadata, PersonalWallet, PublicKeyInfo,
    WalletType,
};
pub use ports::{
    BackgroundHandler, BackgroundRequest, DeviceSession, EvmSigner, KeyringStore,
    LedgerTransport, LedgerTransportFactory, ManifestFetcher, MessagePort, SigningContext,
    SolanaRpc, SvmSigner, TrezorTransport, TrezorTransportFactory, TvmSigner, WalletError,
    DISCONNECTED_CODE, INTERNAL_ERROR_CODE, INVALID_REQUEST_CODE, UNAUTHORIZED_CODE,
    UNSUPPORTED_METHOD_CODE, USER_REJECTED_CODE,
};
pub use protocol::{
    Blockchain, ChannelSet, Frame, MessageEvent, NotificationFrame, RequestFrame, ResponseFrame,
    RpcErrorObject, WireMessage,
};
pub use state_machine::{
    connection_transition, ConnectionAction, ConnectionState, StateTransition,
};
