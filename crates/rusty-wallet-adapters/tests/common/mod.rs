#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use rusty_wallet_adapters::config::KdfConfig;
use rusty_wallet_adapters::envelope;
use rusty_wallet_adapters::WalletBridgeConfig;
use rusty_wallet_core::{
    Blockchain, DeviceSession, Frame, LedgerTransport, LedgerTransportFactory, ManifestFetcher,
    MessageEvent, MessagePort, NotificationFrame, PersonalWallet, RequestFrame, ResponseFrame,
    RpcErrorObject, TrezorTransport, TrezorTransportFactory, WalletError, WalletType,
    WireMessage,
};

pub const PAGE_ORIGIN: &str = "https://dapp.example";

pub const PHRASE: &str = "test test test test test test test test test test test junk";
pub const EVM_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const EVM_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub fn test_config() -> WalletBridgeConfig {
    WalletBridgeConfig {
        page_origin: PAGE_ORIGIN.to_owned(),
        http_timeout_ms: 5_000,
        kdf: fast_kdf(),
        ..WalletBridgeConfig::default()
    }
}

pub fn fast_kdf() -> KdfConfig {
    KdfConfig {
        argon2_memory_kib: 8,
        argon2_iterations: 1,
        argon2_parallelism: 1,
    }
}

pub fn wallet(address: &str, keyring: Option<&str>, wallet_type: WalletType) -> PersonalWallet {
    PersonalWallet {
        address: address.to_owned(),
        keyring_identifier: keyring.map(str::to_owned),
        derivation_path: None,
        wallet_type,
    }
}

/// Captures everything posted to it.
#[derive(Default)]
pub struct RecordingPort {
    posted: Mutex<Vec<WireMessage>>,
}

impl RecordingPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn posted(&self) -> Vec<WireMessage> {
        self.posted.lock().expect("port lock").clone()
    }

    pub fn count(&self) -> usize {
        self.posted.lock().expect("port lock").len()
    }

    pub fn requests(&self) -> Vec<RequestFrame> {
        self.posted()
            .iter()
            .filter_map(|m| match envelope::decode(m) {
                Some(Frame::Request(r)) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn last_request(&self) -> RequestFrame {
        self.requests().pop().expect("at least one request posted")
    }
}

impl MessagePort for RecordingPort {
    fn post(&self, message: WireMessage) -> Result<(), WalletError> {
        self.posted.lock().expect("port lock").push(message);
        Ok(())
    }
}

/// Forwards posts into an unbounded channel, for in-process pumps.
pub struct ChannelPort(pub mpsc::UnboundedSender<WireMessage>);

impl MessagePort for ChannelPort {
    fn post(&self, message: WireMessage) -> Result<(), WalletError> {
        self.0
            .send(message)
            .map_err(|e| WalletError::Transport(format!("channel closed: {e}")))
    }
}

pub fn channel_port() -> (Arc<ChannelPort>, mpsc::UnboundedReceiver<WireMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelPort(tx)), rx)
}

pub fn response_event(blockchain: Blockchain, id: u64, result: Value) -> MessageEvent {
    let frame = Frame::Response(ResponseFrame {
        channel: blockchain.channels().response.to_owned(),
        id,
        outcome: Ok(result),
    });
    MessageEvent::new(PAGE_ORIGIN, envelope::encode_value(&frame))
}

pub fn error_event(blockchain: Blockchain, id: u64, code: i64, message: &str) -> MessageEvent {
    let frame = Frame::Response(ResponseFrame {
        channel: blockchain.channels().response.to_owned(),
        id,
        outcome: Err(RpcErrorObject {
            code,
            message: message.to_owned(),
            data: None,
        }),
    });
    MessageEvent::new(PAGE_ORIGIN, envelope::encode_value(&frame))
}

/// A pushed notification as the page sees it: re-tagged onto the response
/// channel by the relay.
pub fn notification_event(blockchain: Blockchain, name: &str, data: Value) -> MessageEvent {
    let frame = Frame::Notification(NotificationFrame {
        channel: blockchain.channels().response.to_owned(),
        name: name.to_owned(),
        data,
    });
    MessageEvent::new(PAGE_ORIGIN, envelope::encode_value(&frame))
}

/// Lets spawned tasks run up to their next suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub struct CountingManifests {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ManifestFetcher for CountingManifests {
    async fn fetch(&self, url: &str) -> Result<Value, WalletError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"url": url, "name": "Fixture dApp", "iconUrl": "https://dapp.example/icon.png"}))
    }
}

/// Shared view of everything a scripted device saw.
#[derive(Default)]
pub struct DeviceLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub sent: Mutex<Vec<Value>>,
}

impl DeviceLog {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

/// Ledger transport answering APDUs from a script, in order.
pub struct ScriptedLedger {
    log: Arc<DeviceLog>,
    replies: VecDeque<Vec<u8>>,
}

impl DeviceSession for ScriptedLedger {
    fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerTransport for ScriptedLedger {
    async fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, WalletError> {
        self.log
            .sent
            .lock()
            .expect("log lock")
            .push(Value::String(alloy::hex::encode(apdu)));
        self.replies
            .pop_front()
            .ok_or_else(|| WalletError::Transport("script exhausted".to_owned()))
    }
}

pub struct ScriptedLedgerFactory {
    pub log: Arc<DeviceLog>,
    replies: Vec<Vec<u8>>,
}

impl ScriptedLedgerFactory {
    pub fn new(replies: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(DeviceLog::default()),
            replies,
        })
    }
}

#[async_trait]
impl LedgerTransportFactory for ScriptedLedgerFactory {
    async fn open(&self) -> Result<Box<dyn LedgerTransport>, WalletError> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedLedger {
            log: self.log.clone(),
            replies: self.replies.clone().into(),
        }))
    }
}

/// Trezor bridge answering each method with a fixed payload.
pub struct ScriptedTrezor {
    log: Arc<DeviceLog>,
    answers: Vec<(&'static str, Value)>,
}

impl DeviceSession for ScriptedTrezor {
    fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrezorTransport for ScriptedTrezor {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, WalletError> {
        self.log
            .sent
            .lock()
            .expect("log lock")
            .push(json!({"method": method, "params": params}));
        self.answers
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, payload)| json!({"success": true, "payload": payload}))
            .ok_or_else(|| WalletError::Transport(format!("unscripted trezor call {method}")))
    }
}

pub struct ScriptedTrezorFactory {
    pub log: Arc<DeviceLog>,
    answers: Vec<(&'static str, Value)>,
}

impl ScriptedTrezorFactory {
    pub fn new(answers: Vec<(&'static str, Value)>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(DeviceLog::default()),
            answers,
        })
    }
}

#[async_trait]
impl TrezorTransportFactory for ScriptedTrezorFactory {
    async fn open(&self) -> Result<Box<dyn TrezorTransport>, WalletError> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTrezor {
            log: self.log.clone(),
            answers: self.answers.clone(),
        }))
    }
}

/// Appends the success status word.
pub fn ok_reply(body: &[u8]) -> Vec<u8> {
    let mut out = body.to_vec();
    out.extend_from_slice(&[0x90, 0x00]);
    out
}

/// Ethereum app GET_ADDRESS reply for `address` (with or without 0x).
pub fn eth_address_reply(address: &str) -> Vec<u8> {
    let ascii = address.trim_start_matches("0x").as_bytes();
    let mut body = vec![65u8];
    body.extend_from_slice(&[4u8; 65]);
    body.push(ascii.len() as u8);
    body.extend_from_slice(ascii);
    ok_reply(&body)
}
