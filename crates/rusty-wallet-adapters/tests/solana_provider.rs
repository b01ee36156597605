mod common;

use std::sync::{Arc, Mutex};
use std::io::Read;
use std::thread;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde_json::{json, Value};
use tiny_http::{Method, Response, Server, StatusCode};

use common::{notification_event, response_event, settle, test_config, RecordingPort};
use rusty_wallet_adapters::solana::{
    SolanaAccount, SOLANA_SIGN_AND_SEND_TRANSACTION, SOLANA_SIGN_MESSAGE, STANDARD_CONNECT,
};
use rusty_wallet_adapters::{listener, HttpSolanaRpc, SolanaProvider};
use rusty_wallet_core::{Blockchain, WalletError};

fn address() -> String {
    bs58::encode([7u8; 32]).into_string()
}

fn provider_with_rpc(rpc_url: &str) -> (SolanaProvider, Arc<RecordingPort>) {
    let port = RecordingPort::new();
    let rpc = HttpSolanaRpc::new(rpc_url, 5_000).expect("rpc client");
    let provider = SolanaProvider::from_config(&test_config(), port.clone(), Arc::new(rpc));
    (provider, port)
}

fn provider() -> (SolanaProvider, Arc<RecordingPort>) {
    provider_with_rpc("http://127.0.0.1:9")
}

fn record_changes(provider: &SolanaProvider) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    // Stays subscribed for the life of the test.
    let _unsubscribe = provider.on(
        "change",
        listener(move |payload| sink.lock().expect("sink").push(payload.clone())),
    );
    seen
}

async fn connected(provider: &SolanaProvider, port: &RecordingPort) -> Vec<SolanaAccount> {
    let task = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.connect(false).await })
    };
    settle().await;
    let id = port.last_request().id;
    provider
        .handle_message(&response_event(
            Blockchain::Svm,
            id,
            json!({"publicKey": address()}),
        ))
        .expect("connect response");
    task.await.expect("join").expect("connect")
}

/// JSON-RPC node answering `sendTransaction` with a fixed signature.
fn spawn_rpc_node(signature: String, bodies: Arc<Mutex<Vec<Value>>>) -> String {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());
    thread::spawn(move || {
        for _ in 0..4 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut raw = String::new();
            let _ = req.as_reader().read_to_string(&mut raw);
            let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
            let (code, payload) = match (req.method().clone(), body["method"].as_str()) {
                (Method::Post, Some("sendTransaction")) => {
                    (200, json!({"jsonrpc": "2.0", "id": body["id"], "result": signature}))
                }
                _ => (404, json!({"error": "not found"})),
            };
            if let Ok(mut g) = bodies.lock() {
                g.push(body);
            }
            let _ = req.respond(
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code)),
            );
        }
    });
    addr
}

#[tokio::test]
async fn concurrent_connects_share_one_round_trip() {
    let (provider, port) = provider();
    let changes = record_changes(&provider);
    let first = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.connect(true).await })
    };
    let second = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.connect(true).await })
    };
    settle().await;

    let requests = port.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "connect");
    assert_eq!(requests[0].params, json!([{"silent": true}]));
    provider
        .handle_message(&response_event(
            Blockchain::Svm,
            requests[0].id,
            json!({"publicKey": address()}),
        ))
        .expect("response");

    let a = first.await.expect("join").expect("first");
    let b = second.await.expect("join").expect("second");
    assert_eq!(a, b);
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].address, address());
    assert_eq!(a[0].public_key, vec![7u8; 32]);
    assert!(a[0].features.iter().any(|f| f == SOLANA_SIGN_MESSAGE));
    assert!(!a[0].features.iter().any(|f| f == STANDARD_CONNECT));

    let changes = changes.lock().expect("changes").clone();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["accounts"][0]["address"], json!(address()));

    // Already connected: no new request.
    assert_eq!(provider.connect(false).await.expect("cached"), a);
    assert_eq!(port.count(), 1);
}

#[tokio::test]
async fn sign_message_sends_base64_and_decodes_signature() {
    let (provider, port) = provider();
    connected(&provider, &port).await;

    let task = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.sign_message(b"hello").await })
    };
    settle().await;
    let request = port.last_request();
    assert_eq!(request.method, "signMessage");
    assert_eq!(
        request.params,
        json!([{"address": address(), "message": B64.encode(b"hello")}])
    );
    provider
        .handle_message(&response_event(
            Blockchain::Svm,
            request.id,
            json!({"signature": B64.encode([9u8; 64])}),
        ))
        .expect("response");

    let output = task.await.expect("join").expect("signed");
    assert_eq!(output.signed_message, b"hello".to_vec());
    assert_eq!(output.signature, vec![9u8; 64]);
    assert_eq!(output.signature_type, "ed25519");
}

#[tokio::test]
async fn sign_and_send_submits_through_rpc() {
    let signature = bs58::encode([5u8; 64]).into_string();
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let url = spawn_rpc_node(signature, bodies.clone());
    let (provider, port) = provider_with_rpc(&url);
    connected(&provider, &port).await;
    assert!(provider.features().supports(SOLANA_SIGN_AND_SEND_TRANSACTION));

    let task = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.sign_and_send_transaction(&[1, 2, 3], None).await })
    };
    settle().await;
    let request = port.last_request();
    assert_eq!(request.method, "signTransaction");
    assert_eq!(request.params[0]["chain"], json!("solana:mainnet"));
    assert_eq!(request.params[0]["transaction"], json!(B64.encode([1u8, 2, 3])));
    provider
        .handle_message(&response_event(
            Blockchain::Svm,
            request.id,
            json!({"signedTransaction": B64.encode([4u8, 5, 6])}),
        ))
        .expect("response");

    let output = task.await.expect("join").expect("sent");
    assert_eq!(output.signature, vec![5u8; 64]);
    let bodies = bodies.lock().expect("bodies").clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["params"][0], json!(B64.encode([4u8, 5, 6])));
}

#[tokio::test]
async fn unknown_chain_is_rejected_before_posting() {
    let (provider, port) = provider();
    connected(&provider, &port).await;
    let before = port.count();
    let result = provider.sign_transaction(&[1], Some("solana:devnet")).await;
    assert!(matches!(result, Err(WalletError::InvalidRequest(_))));
    assert_eq!(port.count(), before);
}

#[tokio::test]
async fn notifications_drive_change_events() {
    let (provider, _port) = provider();
    let changes = record_changes(&provider);

    provider
        .handle_message(&notification_event(
            Blockchain::Svm,
            "connected",
            json!({"publicKey": address()}),
        ))
        .expect("connected");
    // Same account again: nothing new to report.
    provider
        .handle_notification("activeWalletUpdated", &json!({"publicKey": address()}))
        .expect("same account");
    let other = bs58::encode([8u8; 32]).into_string();
    provider
        .handle_notification("activeWalletUpdated", &json!({"publicKey": other}))
        .expect("switched");
    provider
        .handle_notification("disconnected", &Value::Null)
        .expect("disconnected");

    let changes = changes.lock().expect("changes").clone();
    assert_eq!(changes.len(), 3);
    assert_eq!(changes[1]["accounts"][0]["address"], json!(other));
    assert_eq!(changes[2]["accounts"], json!([]));
    assert!(provider.accounts().expect("accounts").is_empty());
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (provider, _port) = provider();
    let seen = Arc::new(Mutex::new(0usize));
    let sink = seen.clone();
    let unsubscribe = provider.on(
        "change",
        listener(move |_| *sink.lock().expect("sink") += 1),
    );

    provider
        .handle_notification("connected", &json!({"publicKey": address()}))
        .expect("connected");
    unsubscribe();
    provider
        .handle_notification("disconnected", &Value::Null)
        .expect("disconnected");
    assert_eq!(*seen.lock().expect("seen"), 1);
}

#[tokio::test]
async fn disconnect_clears_account() {
    let (provider, port) = provider();
    connected(&provider, &port).await;
    let task = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.disconnect().await })
    };
    settle().await;
    let request = port.last_request();
    assert_eq!(request.method, "disconnect");
    provider
        .handle_message(&response_event(Blockchain::Svm, request.id, Value::Null))
        .expect("response");
    task.await.expect("join").expect("disconnect");
    assert!(provider.accounts().expect("accounts").is_empty());
}
