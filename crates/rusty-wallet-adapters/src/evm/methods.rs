use serde_json::Value;

use rusty_wallet_core::WalletError;

/// The closed set of EIP-1193 methods the façade answers itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmMethod {
    Accounts,
    RequestAccounts,
    ChainId,
    NetVersion,
    EthSign,
    PersonalSign,
    SignTypedDataV4,
    SignTransaction,
    SendTransaction,
    SwitchEthereumChain,
    AddEthereumChain,
    RequestPermissions,
}

impl EvmMethod {
    pub fn parse(method: &str) -> Option<Self> {
        let parsed = match method {
            "eth_accounts" => EvmMethod::Accounts,
            "eth_requestAccounts" => EvmMethod::RequestAccounts,
            "eth_chainId" => EvmMethod::ChainId,
            "net_version" => EvmMethod::NetVersion,
            "eth_sign" => EvmMethod::EthSign,
            "personal_sign" => EvmMethod::PersonalSign,
            "eth_signTypedData_v4" => EvmMethod::SignTypedDataV4,
            "eth_signTransaction" => EvmMethod::SignTransaction,
            "eth_sendTransaction" => EvmMethod::SendTransaction,
            "wallet_switchEthereumChain" => EvmMethod::SwitchEthereumChain,
            "wallet_addEthereumChain" => EvmMethod::AddEthereumChain,
            "wallet_requestPermissions" => EvmMethod::RequestPermissions,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvmMethod::Accounts => "eth_accounts",
            EvmMethod::RequestAccounts => "eth_requestAccounts",
            EvmMethod::ChainId => "eth_chainId",
            EvmMethod::NetVersion => "net_version",
            EvmMethod::EthSign => "eth_sign",
            EvmMethod::PersonalSign => "personal_sign",
            EvmMethod::SignTypedDataV4 => "eth_signTypedData_v4",
            EvmMethod::SignTransaction => "eth_signTransaction",
            EvmMethod::SendTransaction => "eth_sendTransaction",
            EvmMethod::SwitchEthereumChain => "wallet_switchEthereumChain",
            EvmMethod::AddEthereumChain => "wallet_addEthereumChain",
            EvmMethod::RequestPermissions => "wallet_requestPermissions",
        }
    }

    pub fn requires_account(self) -> bool {
        matches!(
            self,
            EvmMethod::EthSign
                | EvmMethod::PersonalSign
                | EvmMethod::SignTypedDataV4
                | EvmMethod::SignTransaction
                | EvmMethod::SendTransaction
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Known(EvmMethod),
    /// Opaque read-only RPC relayed to the backend node.
    Passthrough,
    Unsupported,
}

pub fn classify(method: &str) -> Dispatch {
    if let Some(known) = EvmMethod::parse(method) {
        return Dispatch::Known(known);
    }
    if method.starts_with("eth_") || method.starts_with("web3_clientVersion") {
        return Dispatch::Passthrough;
    }
    Dispatch::Unsupported
}

/// Canonical `0x`-prefixed lowercase hex chain id from a number, hex string
/// or decimal string.
pub fn normalize_chain_id(value: &Value) -> Result<String, WalletError> {
    let id = if let Some(n) = value.as_u64() {
        n
    } else {
        let raw = value
            .as_str()
            .ok_or_else(|| WalletError::InvalidRequest("chain id must be string or number".to_owned()))?;
        parse_chain_id_str(raw)?
    };
    Ok(format!("{id:#x}"))
}

fn parse_chain_id_str(raw: &str) -> Result<u64, WalletError> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| WalletError::InvalidRequest(format!("invalid hex chain id: {e}")))
    } else {
        raw.parse()
            .map_err(|e| WalletError::InvalidRequest(format!("invalid chain id: {e}")))
    }
}

pub fn chain_id_to_decimal(chain_id: &str) -> Result<String, WalletError> {
    Ok(parse_chain_id_str(chain_id)?.to_string())
}

pub fn looks_like_address(value: &str) -> bool {
    let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Returns `(message, address)` for `personal_sign`. Some hosts send the
/// arguments swapped; the address is identified by matching the active
/// account first and by shape second.
pub fn order_personal_sign<'a>(
    first: &'a str,
    second: &'a str,
    active: Option<&str>,
) -> (&'a str, &'a str) {
    if let Some(active) = active {
        if second.eq_ignore_ascii_case(active) {
            return (first, second);
        }
        if first.eq_ignore_ascii_case(active) {
            return (second, first);
        }
    }
    if looks_like_address(first) && !looks_like_address(second) {
        return (second, first);
    }
    (first, second)
}
