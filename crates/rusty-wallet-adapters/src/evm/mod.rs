mod eip6963;
mod methods;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use rusty_wallet_core::{
    connection_transition, Blockchain, ConnectionAction, ConnectionState, MessageEvent,
    MessagePort, WalletError, DISCONNECTED_CODE,
};

use crate::config::WalletBridgeConfig;
use crate::correlator::ProviderChannel;
use crate::envelope::OriginGuard;
use crate::events::{EventEmitter, Listener};

pub use eip6963::{
    AnnounceProviderEvent, Eip6963Announcer, ProviderInfo, ANNOUNCE_PROVIDER_EVENT,
    REQUEST_PROVIDER_EVENT,
};
pub use methods::{
    chain_id_to_decimal, classify, looks_like_address, normalize_chain_id, order_personal_sign,
    Dispatch, EvmMethod,
};

pub type SharedRequest = Shared<BoxFuture<'static, Result<Value, WalletError>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn without_params(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Parses the untyped argument object a page passes to `request()`.
    pub fn from_value(raw: &Value) -> Result<Self, WalletError> {
        let obj = raw.as_object().ok_or_else(|| {
            WalletError::InvalidRequest("request arguments must be an object".to_owned())
        })?;
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| WalletError::InvalidRequest("method must be a string".to_owned()))?;
        let args = Self {
            method: method.to_owned(),
            params: obj.get("params").cloned(),
        };
        args.validate()?;
        Ok(args)
    }

    fn validate(&self) -> Result<(), WalletError> {
        if self.method.is_empty() {
            return Err(WalletError::InvalidRequest(
                "method must be a non-empty string".to_owned(),
            ));
        }
        match &self.params {
            None | Some(Value::Array(_)) | Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(WalletError::InvalidRequest(format!(
                "params must be an array or object, got {other}"
            ))),
        }
    }

    fn params_or_empty(&self) -> Value {
        self.params.clone().unwrap_or_else(|| json!([]))
    }
}

/// Minimal EIP-1193 surface shared by this façade, competing providers and
/// the router.
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, args: RequestArguments) -> Result<Value, WalletError>;
    fn on(&self, event: &str, listener: Listener);
    fn remove_listener(&self, event: &str, listener: &Listener) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcPayload {
    #[serde(default)]
    pub id: Value,
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Value,
    pub jsonrpc: String,
    pub result: Value,
}

fn jsonrpc_version() -> String {
    "2.0".to_owned()
}

struct EvmState {
    chain_id: String,
    current_address: Option<String>,
    connection: ConnectionState,
    overridden: bool,
    in_flight_connect: Option<SharedRequest>,
    in_flight_chain_switch: Option<SharedRequest>,
}

struct EvmInner {
    channel: ProviderChannel,
    events: EventEmitter,
    state: Mutex<EvmState>,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ConnectionUpdate {
    public_key: Option<String>,
    chain_id: Option<String>,
}

type Emissions = Vec<(&'static str, Value)>;

/// EIP-1193 façade for EVM dApps.
#[derive(Clone)]
pub struct EvmProvider {
    inner: Arc<EvmInner>,
}

impl EvmProvider {
    pub fn new(channel: ProviderChannel, default_chain_id: &str) -> Result<Self, WalletError> {
        let chain_id = normalize_chain_id(&Value::from(default_chain_id))?;
        Ok(Self {
            inner: Arc::new(EvmInner {
                channel,
                events: EventEmitter::new(),
                state: Mutex::new(EvmState {
                    chain_id,
                    current_address: None,
                    connection: ConnectionState::Disconnected,
                    overridden: false,
                    in_flight_connect: None,
                    in_flight_chain_switch: None,
                }),
            }),
        })
    }

    pub fn from_config(
        config: &WalletBridgeConfig,
        port: Arc<dyn MessagePort>,
    ) -> Result<Self, WalletError> {
        let channel = ProviderChannel::new(Blockchain::Evm, OriginGuard::from_config(config), port);
        Self::new(channel, &config.default_evm_chain_id)
    }

    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    pub fn chain_id(&self) -> Result<String, WalletError> {
        Ok(self.inner.lock_state()?.chain_id.clone())
    }

    pub fn selected_address(&self) -> Result<Option<String>, WalletError> {
        self.inner.active_address()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner
            .lock_state()
            .map(|g| g.connection)
            .unwrap_or_default()
    }

    pub fn is_overridden(&self) -> bool {
        self.inner.lock_state().map(|g| g.overridden).unwrap_or(false)
    }

    pub fn has_in_flight_connect(&self) -> bool {
        self.inner
            .lock_state()
            .map(|g| g.in_flight_connect.is_some())
            .unwrap_or(false)
    }

    pub fn has_in_flight_chain_switch(&self) -> bool {
        self.inner
            .lock_state()
            .map(|g| g.in_flight_chain_switch.is_some())
            .unwrap_or(false)
    }

    pub async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        args.validate()?;
        match classify(&args.method) {
            Dispatch::Known(method) => self.dispatch(method, args.params_or_empty()).await,
            Dispatch::Passthrough => {
                self.inner
                    .channel
                    .request(&args.method, args.params_or_empty())
                    .await
            }
            Dispatch::Unsupported => Err(WalletError::UnsupportedMethod(args.method)),
        }
    }

    async fn dispatch(&self, method: EvmMethod, params: Value) -> Result<Value, WalletError> {
        match method {
            EvmMethod::RequestAccounts => self.connect_request(false)?.await,
            EvmMethod::Accounts => self.accounts().await,
            EvmMethod::ChainId => Ok(Value::String(self.chain_id()?)),
            EvmMethod::NetVersion => Ok(Value::String(chain_id_to_decimal(&self.chain_id()?)?)),
            EvmMethod::RequestPermissions => {
                let accounts = self.connect_request(false)?.await?;
                Ok(json!([{
                    "parentCapability": "eth_accounts",
                    "caveats": [{"type": "restrictReturnedAccounts", "value": accounts}],
                }]))
            }
            EvmMethod::SwitchEthereumChain | EvmMethod::AddEthereumChain => {
                self.switch_chain(method, params).await
            }
            EvmMethod::EthSign
            | EvmMethod::PersonalSign
            | EvmMethod::SignTypedDataV4
            | EvmMethod::SignTransaction
            | EvmMethod::SendTransaction => self.sign(method, params).await,
        }
    }

    /// `eth_requestAccounts` without the prompt. Any failure other than a
    /// provider handoff reads as "no accounts".
    async fn accounts(&self) -> Result<Value, WalletError> {
        if let Some(address) = self.inner.active_address()? {
            return Ok(json!([address]));
        }
        match self.connect_request(true)?.await {
            Ok(accounts) => Ok(accounts),
            Err(e @ WalletError::ProviderOverridden(_)) => Err(e),
            Err(e) => {
                debug!("eth_accounts resolved empty: {e}");
                Ok(json!([]))
            }
        }
    }

    /// Returns the in-flight connection future, creating it if none exists.
    fn connect_request(&self, silent: bool) -> Result<SharedRequest, WalletError> {
        let mut g = self.inner.lock_state()?;
        if let Some(existing) = g.in_flight_connect.as_ref() {
            return Ok(existing.clone());
        }
        g.connection = connection_transition(g.connection, ConnectionAction::ConnectRequested).to;

        let inner = Arc::clone(&self.inner);
        let params = if silent {
            json!([{"silent": true}])
        } else {
            json!([])
        };
        let future = async move {
            let outcome = match inner
                .channel
                .request(EvmMethod::RequestAccounts.as_str(), params)
                .await
            {
                Ok(value) => inner.complete_connect(value),
                Err(e) => Err(e),
            };
            if outcome.is_err() {
                inner.transition(ConnectionAction::ConnectFailed);
            }
            inner.clear_in_flight(|s| &mut s.in_flight_connect);
            outcome
        }
        .boxed()
        .shared();
        g.in_flight_connect = Some(future.clone());
        Ok(future)
    }

    async fn switch_chain(&self, method: EvmMethod, params: Value) -> Result<Value, WalletError> {
        let requested = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .ok_or_else(|| WalletError::InvalidRequest(format!("{} requires chainId", method.as_str())))?;
        let requested = normalize_chain_id(requested)?;
        let Some(shared) = self.chain_switch_request(method, params, requested)? else {
            return Ok(Value::Null);
        };
        shared.await
    }

    /// `None` when already on the requested chain.
    fn chain_switch_request(
        &self,
        method: EvmMethod,
        params: Value,
        requested: String,
    ) -> Result<Option<SharedRequest>, WalletError> {
        let mut g = self.inner.lock_state()?;
        if g.chain_id == requested {
            return Ok(None);
        }
        if let Some(existing) = g.in_flight_chain_switch.as_ref() {
            return Ok(Some(existing.clone()));
        }
        let inner = Arc::clone(&self.inner);
        let future = async move {
            let outcome = match inner.channel.request(method.as_str(), params).await {
                Ok(_) => inner.apply_chain_id(requested).map(|_| Value::Null),
                Err(e) => Err(e),
            };
            inner.clear_in_flight(|s| &mut s.in_flight_chain_switch);
            outcome
        }
        .boxed()
        .shared();
        g.in_flight_chain_switch = Some(future.clone());
        Ok(Some(future))
    }

    async fn sign(&self, method: EvmMethod, params: Value) -> Result<Value, WalletError> {
        let active = self
            .inner
            .active_address()?
            .ok_or(WalletError::Disconnected)?;
        let params = match method {
            EvmMethod::PersonalSign => personal_sign_params(&params, &active)?,
            _ => params,
        };
        self.inner.channel.request(method.as_str(), params).await
    }

    pub async fn enable(&self) -> Result<Value, WalletError> {
        self.request(RequestArguments::without_params(
            EvmMethod::RequestAccounts.as_str(),
        ))
        .await
    }

    /// Legacy `send(method, params)`, resolving to the bare result.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value, WalletError> {
        self.request(RequestArguments {
            method: method.to_owned(),
            params,
        })
        .await
    }

    /// Legacy `send(payload)`, resolving to a JSON-RPC response object.
    pub async fn send_payload(&self, payload: JsonRpcPayload) -> Result<JsonRpcResponse, WalletError> {
        let result = self
            .request(RequestArguments {
                method: payload.method,
                params: payload.params,
            })
            .await?;
        Ok(JsonRpcResponse {
            id: payload.id,
            jsonrpc: payload.jsonrpc,
            result,
        })
    }

    /// Legacy node-style `sendAsync(payload, callback)`.
    pub async fn send_async<F>(&self, payload: JsonRpcPayload, callback: F)
    where
        F: FnOnce(Option<WalletError>, Option<JsonRpcResponse>) + Send,
    {
        match self.send_payload(payload).await {
            Ok(response) => callback(None, Some(response)),
            Err(e) => callback(Some(e), None),
        }
    }

    /// Entry point for every message delivered to the page.
    pub fn handle_message(&self, event: &MessageEvent) -> Result<(), WalletError> {
        if let Some(notification) = self.inner.channel.accept(event) {
            self.handle_notification(&notification.name, &notification.data)?;
        }
        Ok(())
    }

    pub fn handle_notification(&self, name: &str, data: &Value) -> Result<(), WalletError> {
        if self.is_overridden() {
            debug!(name, "provider overridden, ignoring notification");
            return Ok(());
        }
        match name {
            "connected" => {
                self.inner.apply_connected(parse_connection(data)?)?;
            }
            "disconnected" => self.inner.apply_disconnected()?,
            "chainIdUpdated" => {
                let raw = data.get("chainId").unwrap_or(data);
                self.inner.apply_chain_id(normalize_chain_id(raw)?)?;
            }
            "activeWalletUpdated" => {
                let address = data
                    .get("publicKey")
                    .unwrap_or(data)
                    .as_str()
                    .map(str::to_owned);
                self.inner.apply_active_wallet(address)?;
            }
            other => debug!(name = other, "ignoring unknown evm notification"),
        }
        Ok(())
    }
}

#[async_trait]
impl Eip1193Provider for EvmProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        EvmProvider::request(self, args).await
    }

    fn on(&self, event: &str, listener: Listener) {
        self.inner.events.on(event, listener);
    }

    fn remove_listener(&self, event: &str, listener: &Listener) -> bool {
        self.inner.events.off(event, listener)
    }
}

impl EvmInner {
    fn lock_state(&self) -> Result<MutexGuard<'_, EvmState>, WalletError> {
        self.state
            .lock()
            .map_err(|e| WalletError::Transport(format!("evm provider lock poisoned: {e}")))
    }

    fn active_address(&self) -> Result<Option<String>, WalletError> {
        Ok(self.lock_state()?.current_address.clone())
    }

    fn emit_all(&self, emissions: Emissions) {
        for (event, payload) in emissions {
            self.events.emit(event, &payload);
        }
    }

    fn transition(&self, action: ConnectionAction) {
        if let Ok(mut g) = self.lock_state() {
            g.connection = connection_transition(g.connection, action).to;
        }
    }

    fn clear_in_flight(&self, slot: impl FnOnce(&mut EvmState) -> &mut Option<SharedRequest>) {
        if let Ok(mut g) = self.lock_state() {
            *slot(&mut g) = None;
        }
    }

    fn complete_connect(&self, value: Value) -> Result<Value, WalletError> {
        if let Some(index) = value.get("overriddenBy").and_then(Value::as_u64) {
            self.lock_state()?.overridden = true;
            info!(index, "user chose a competing provider");
            return Err(WalletError::ProviderOverridden(index as usize));
        }
        let accounts = self.apply_connected(parse_connection(&value)?)?;
        Ok(json!(accounts))
    }

    fn apply_connected(&self, update: ConnectionUpdate) -> Result<Vec<String>, WalletError> {
        let mut emissions = Emissions::new();
        let address = update.public_key.map(|a| a.to_ascii_lowercase());
        {
            let mut g = self.lock_state()?;
            let transition = connection_transition(g.connection, ConnectionAction::ConnectSucceeded);
            g.connection = transition.to;
            let chain_id = update.chain_id.unwrap_or_else(|| g.chain_id.clone());
            if transition.changed() {
                emissions.push(("connect", json!({"chainId": chain_id})));
            }
            if g.chain_id != chain_id {
                g.chain_id = chain_id.clone();
                emissions.push(("chainChanged", Value::String(chain_id)));
            }
            if g.current_address != address {
                g.current_address = address.clone();
                emissions.push(("accountsChanged", json!(address.iter().collect::<Vec<_>>())));
            }
        }
        self.emit_all(emissions);
        Ok(address.into_iter().collect())
    }

    fn apply_chain_id(&self, chain_id: String) -> Result<(), WalletError> {
        let changed = {
            let mut g = self.lock_state()?;
            if g.chain_id == chain_id {
                false
            } else {
                g.chain_id = chain_id.clone();
                true
            }
        };
        if changed {
            self.events.emit("chainChanged", &Value::String(chain_id));
        }
        Ok(())
    }

    fn apply_active_wallet(&self, address: Option<String>) -> Result<(), WalletError> {
        let address = address.map(|a| a.to_ascii_lowercase());
        let changed = {
            let mut g = self.lock_state()?;
            if g.current_address == address {
                false
            } else {
                g.current_address = address.clone();
                true
            }
        };
        if changed {
            self.events
                .emit("accountsChanged", &json!(address.iter().collect::<Vec<_>>()));
        }
        Ok(())
    }

    fn apply_disconnected(&self) -> Result<(), WalletError> {
        let changed = {
            let mut g = self.lock_state()?;
            let transition = connection_transition(g.connection, ConnectionAction::Disconnect);
            g.connection = transition.to;
            let had_address = g.current_address.take().is_some();
            transition.changed() || had_address
        };
        if changed {
            self.events.emit(
                "disconnect",
                &json!({
                    "code": DISCONNECTED_CODE,
                    "message": "The provider is disconnected from all chains.",
                }),
            );
        }
        Ok(())
    }
}

fn parse_connection(value: &Value) -> Result<ConnectionUpdate, WalletError> {
    if let Some(accounts) = value.as_array() {
        return Ok(ConnectionUpdate {
            public_key: accounts.first().and_then(Value::as_str).map(str::to_owned),
            chain_id: None,
        });
    }
    let obj = value.as_object().ok_or_else(|| {
        WalletError::Validation(format!("unexpected connection payload: {value}"))
    })?;
    let public_key = obj
        .get("publicKey")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let chain_id = match obj.get("chainId") {
        Some(raw) if !raw.is_null() => Some(normalize_chain_id(raw)?),
        _ => None,
    };
    Ok(ConnectionUpdate {
        public_key,
        chain_id,
    })
}

fn personal_sign_params(params: &Value, active: &str) -> Result<Value, WalletError> {
    let items = params
        .as_array()
        .ok_or_else(|| WalletError::InvalidRequest("personal_sign expects an array".to_owned()))?;
    let arg = |idx: usize| {
        items.get(idx).and_then(Value::as_str).ok_or_else(|| {
            WalletError::InvalidRequest(format!("personal_sign argument {idx} must be a string"))
        })
    };
    let (message, address) = order_personal_sign(arg(0)?, arg(1)?, Some(active));
    let mut out = vec![json!(message), json!(address)];
    out.extend(items.iter().skip(2).cloned());
    Ok(Value::Array(out))
}
