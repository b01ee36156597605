mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use tiny_http::{Response, Server, StatusCode};

use common::{
    error_event, notification_event, response_event, settle, test_config, CountingManifests,
    RecordingPort,
};
use rusty_wallet_adapters::ton::{
    error_codes, AppRequest, ConnectEvent, ConnectItem, ConnectRequest, WalletEvent,
    WalletResponse,
};
use rusty_wallet_adapters::{HttpManifestFetcher, TonConnect, TonProvider};
use rusty_wallet_core::{Blockchain, ManifestFetcher};

fn bridge(manifests: Arc<dyn ManifestFetcher>) -> (TonConnect, TonProvider, Arc<RecordingPort>) {
    let config = test_config();
    let port = RecordingPort::new();
    let provider = TonProvider::from_config(&config, port.clone());
    let connect = TonConnect::new(provider.clone(), manifests, &config);
    (connect, provider, port)
}

fn request(manifest_url: &str) -> ConnectRequest {
    ConnectRequest {
        manifest_url: manifest_url.to_owned(),
        items: vec![ConnectItem::TonAddr],
    }
}

/// Serves `/tonconnect-manifest.json`; every other path is a 404.
fn spawn_manifest_server() -> String {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());
    let base = addr.clone();
    thread::spawn(move || {
        for _ in 0..8 {
            let req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let (code, payload) = match req.url() {
                "/tonconnect-manifest.json" => (
                    200,
                    json!({"url": base, "name": "Fixture dApp", "iconUrl": format!("{base}/icon.png")}),
                ),
                _ => (404, json!({"error": "not found"})),
            };
            let _ = req.respond(
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code)),
            );
        }
    });
    addr
}

#[tokio::test]
async fn newer_protocol_version_is_refused_locally() {
    let manifests = Arc::new(CountingManifests::default());
    let (connect, provider, port) = bridge(manifests.clone());

    let event = connect
        .connect(3, request("https://dapp.example/tonconnect-manifest.json"))
        .await;
    assert!(event.is_error());
    assert_eq!(event.error_code(), Some(error_codes::BAD_REQUEST));
    assert_eq!(port.count(), 0);
    assert_eq!(provider.pending_requests(), 0);
    assert_eq!(manifests.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_fetches_manifest_then_asks_background() {
    let base = spawn_manifest_server();
    let fetcher = HttpManifestFetcher::new(5_000).expect("fetcher");
    let (connect, provider, port) = bridge(Arc::new(fetcher));
    let manifest_url = format!("{base}/tonconnect-manifest.json");

    let task = {
        let connect = connect.clone();
        let manifest_url = manifest_url.clone();
        tokio::spawn(async move { connect.connect(2, request(&manifest_url)).await })
    };
    // The manifest fetch is real HTTP; wait for the frame to leave.
    for _ in 0..400 {
        if port.count() > 0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    let sent = port.last_request();
    assert_eq!(sent.method, "connect");
    assert_eq!(sent.params[0], json!(2));
    assert_eq!(sent.params[1]["manifestUrl"], json!(manifest_url));
    assert_eq!(sent.params[2]["name"], json!("Fixture dApp"));

    let address = json!({"name": "ton_addr", "address": "0:abcd"});
    provider.handle_message(&response_event(
        Blockchain::Tvm,
        sent.id,
        json!({"items": [address]}),
    ));
    match task.await.expect("join") {
        ConnectEvent::Connect { payload, .. } => {
            assert_eq!(payload.items, vec![address]);
            assert_eq!(payload.device.max_protocol_version, 2);
        }
        other => panic!("expected connect, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_manifest_is_reported_with_its_code() {
    let base = spawn_manifest_server();
    let fetcher = HttpManifestFetcher::new(5_000).expect("fetcher");
    let (connect, _provider, port) = bridge(Arc::new(fetcher));

    let event = connect.connect(2, request(&format!("{base}/missing.json"))).await;
    assert_eq!(event.error_code(), Some(error_codes::MANIFEST_NOT_FOUND));
    assert_eq!(port.count(), 0);
}

#[tokio::test]
async fn unsupported_app_method_is_answered_locally() {
    let (connect, _provider, port) = bridge(Arc::new(CountingManifests::default()));
    let response = connect
        .send(AppRequest {
            method: "signMessage".to_owned(),
            params: vec![],
            id: "7".to_owned(),
        })
        .await;
    match response {
        WalletResponse::Error { id, error } => {
            assert_eq!(id, "7");
            assert_eq!(error.code, error_codes::METHOD_NOT_SUPPORTED);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(port.count(), 0);
}

#[tokio::test]
async fn send_transaction_round_trips_and_maps_rejection() {
    let (connect, provider, port) = bridge(Arc::new(CountingManifests::default()));
    let task = {
        let connect = connect.clone();
        tokio::spawn(async move {
            connect
                .send(AppRequest {
                    method: "sendTransaction".to_owned(),
                    params: vec!["{\"messages\":[]}".to_owned()],
                    id: "1".to_owned(),
                })
                .await
        })
    };
    settle().await;
    let sent = port.last_request();
    assert_eq!(sent.method, "send");
    assert_eq!(sent.params[0]["method"], json!("sendTransaction"));
    provider.handle_message(&error_event(
        Blockchain::Tvm,
        sent.id,
        4001,
        "User rejected the request",
    ));
    match task.await.expect("join") {
        WalletResponse::Error { id, error } => {
            assert_eq!(id, "1");
            assert_eq!(error.code, error_codes::USER_REJECTS);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnects_reach_listeners() {
    let (connect, provider, port) = bridge(Arc::new(CountingManifests::default()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let unsubscribe = connect.listen(move |event| sink.lock().expect("sink").push(event));

    let task = {
        let connect = connect.clone();
        tokio::spawn(async move { connect.disconnect().await })
    };
    settle().await;
    let sent = port.last_request();
    assert_eq!(sent.method, "disconnect");
    provider.handle_message(&response_event(Blockchain::Tvm, sent.id, Value::Null));
    task.await.expect("join").expect("disconnect");

    // Pushed from the background as well.
    provider.handle_message(&notification_event(Blockchain::Tvm, "disconnected", json!({})));

    unsubscribe();
    provider.handle_message(&notification_event(Blockchain::Tvm, "disconnected", json!({})));

    let events = events.lock().expect("events").clone();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| matches!(e, WalletEvent::Disconnect { .. })));
}
