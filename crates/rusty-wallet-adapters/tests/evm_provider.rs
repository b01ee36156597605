mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use common::{
    error_event, notification_event, response_event, settle, test_config, RecordingPort,
    EVM_ADDRESS,
};
use rusty_wallet_adapters::evm::{
    AnnounceProviderEvent, JsonRpcPayload, ProviderInfo, ANNOUNCE_PROVIDER_EVENT,
    REQUEST_PROVIDER_EVENT,
};
use rusty_wallet_adapters::{
    listener, ActiveProvider, Eip1193Provider, Eip6963Announcer, EvmProvider, Listener,
    MultiProviderRouter, RequestArguments,
};
use rusty_wallet_core::{Blockchain, WalletError, DISCONNECTED_CODE, USER_REJECTED_CODE};

fn provider() -> (EvmProvider, Arc<RecordingPort>) {
    let port = RecordingPort::new();
    let provider = EvmProvider::from_config(&test_config(), port.clone()).expect("provider");
    (provider, port)
}

fn spawn_request(
    provider: &EvmProvider,
    args: RequestArguments,
) -> tokio::task::JoinHandle<Result<Value, WalletError>> {
    let provider = provider.clone();
    tokio::spawn(async move { provider.request(args).await })
}

fn record(provider: &EvmProvider, event: &'static str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    provider.events().on(
        event,
        listener(move |payload| sink.lock().expect("sink").push(payload.clone())),
    );
    seen
}

#[tokio::test]
async fn concurrent_request_accounts_share_one_round_trip() {
    let (provider, port) = provider();
    let first = spawn_request(&provider, RequestArguments::without_params("eth_requestAccounts"));
    let second = spawn_request(&provider, RequestArguments::without_params("eth_requestAccounts"));
    settle().await;

    assert_eq!(port.requests().len(), 1);
    assert!(provider.has_in_flight_connect());
    let id = port.last_request().id;
    provider
        .handle_message(&response_event(Blockchain::Evm, id, json!([EVM_ADDRESS])))
        .expect("response");

    let a = first.await.expect("join").expect("first");
    let b = second.await.expect("join").expect("second");
    assert_eq!(a, b);
    assert_eq!(a, json!([EVM_ADDRESS.to_ascii_lowercase()]));
    assert!(!provider.has_in_flight_connect());

    // Connected now, so eth_accounts answers from the cached address.
    let cached = provider
        .request(RequestArguments::without_params("eth_accounts"))
        .await
        .expect("cached accounts");
    assert_eq!(cached, a);
    assert_eq!(port.requests().len(), 1);
}

/// Every event the provider emits, in emission order.
fn record_all(provider: &EvmProvider) -> Arc<Mutex<Vec<(&'static str, Value)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in ["connect", "disconnect", "chainChanged", "accountsChanged"] {
        let sink = seen.clone();
        provider.events().on(
            event,
            listener(move |payload| sink.lock().expect("sink").push((event, payload.clone()))),
        );
    }
    seen
}

#[tokio::test]
async fn connect_on_current_chain_emits_connect_and_accounts_only() {
    let (provider, port) = provider();
    let seen = record_all(&provider);
    let address = "0xABCDEF0000000000000000000000000000000001";

    let task = spawn_request(&provider, RequestArguments::without_params("eth_requestAccounts"));
    settle().await;
    provider
        .handle_message(&response_event(
            Blockchain::Evm,
            port.last_request().id,
            json!({"publicKey": address, "chainId": 1}),
        ))
        .expect("response");

    let lowered = address.to_ascii_lowercase();
    assert_eq!(task.await.expect("join").expect("accounts"), json!([lowered]));
    assert_eq!(
        *seen.lock().expect("seen"),
        vec![
            ("connect", json!({"chainId": "0x1"})),
            ("accountsChanged", json!([lowered])),
        ]
    );
    assert_eq!(provider.chain_id().expect("chain"), "0x1");
    assert!(provider.is_connected());
}

#[tokio::test]
async fn rejected_connect_clears_in_flight_and_allows_retry() {
    let (provider, port) = provider();
    let first = spawn_request(&provider, RequestArguments::without_params("eth_requestAccounts"));
    settle().await;
    assert!(provider.has_in_flight_connect());
    provider
        .handle_message(&error_event(
            Blockchain::Evm,
            port.last_request().id,
            USER_REJECTED_CODE,
            "User rejected the request",
        ))
        .expect("rejection");

    let rejected = first.await.expect("join");
    assert!(matches!(rejected, Err(WalletError::UserRejected)));
    assert!(!provider.has_in_flight_connect());
    assert!(!provider.is_connected());

    let retry = spawn_request(&provider, RequestArguments::without_params("eth_requestAccounts"));
    settle().await;
    let requests = port.requests();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].id, requests[1].id);
    provider
        .handle_message(&response_event(Blockchain::Evm, requests[1].id, json!([EVM_ADDRESS])))
        .expect("response");
    assert_eq!(
        retry.await.expect("join").expect("accounts"),
        json!([EVM_ADDRESS.to_ascii_lowercase()])
    );
    assert!(!provider.has_in_flight_connect());
}

#[tokio::test]
async fn rejected_chain_switch_clears_in_flight_and_keeps_chain() {
    let (provider, port) = provider();
    let seen = record(&provider, "chainChanged");
    let args = RequestArguments::new("wallet_switchEthereumChain", json!([{"chainId": "0x89"}]));

    let first = spawn_request(&provider, args.clone());
    settle().await;
    assert!(provider.has_in_flight_chain_switch());
    provider
        .handle_message(&error_event(
            Blockchain::Evm,
            port.last_request().id,
            USER_REJECTED_CODE,
            "User rejected the request",
        ))
        .expect("rejection");

    let rejected = first.await.expect("join");
    assert!(matches!(rejected, Err(WalletError::UserRejected)));
    assert!(!provider.has_in_flight_chain_switch());
    assert_eq!(provider.chain_id().expect("chain"), "0x1");
    assert!(seen.lock().expect("seen").is_empty());

    let retry = spawn_request(&provider, args);
    settle().await;
    let switches: Vec<_> = port
        .requests()
        .into_iter()
        .filter(|r| r.method == "wallet_switchEthereumChain")
        .collect();
    assert_eq!(switches.len(), 2);
    provider
        .handle_message(&response_event(Blockchain::Evm, switches[1].id, Value::Null))
        .expect("response");
    assert_eq!(retry.await.expect("join").expect("switch"), Value::Null);
    assert_eq!(provider.chain_id().expect("chain"), "0x89");
    assert!(!provider.has_in_flight_chain_switch());
}

#[tokio::test]
async fn chain_changed_fires_once_per_distinct_chain() {
    let (provider, _port) = provider();
    let seen = record(&provider, "chainChanged");

    for _ in 0..2 {
        provider
            .handle_message(&notification_event(
                Blockchain::Evm,
                "chainIdUpdated",
                json!({"chainId": "0x89"}),
            ))
            .expect("notification");
    }
    provider
        .handle_notification("chainIdUpdated", &json!(137))
        .expect("numeric chain id");

    assert_eq!(*seen.lock().expect("seen"), vec![json!("0x89")]);
    assert_eq!(provider.chain_id().expect("chain"), "0x89");
}

#[tokio::test]
async fn overlapping_chain_switches_share_one_round_trip() {
    let (provider, port) = provider();
    let seen = record(&provider, "chainChanged");
    let args = RequestArguments::new("wallet_switchEthereumChain", json!([{"chainId": "0x89"}]));
    let first = spawn_request(&provider, args.clone());
    let second = spawn_request(&provider, args.clone());
    settle().await;

    let switches: Vec<_> = port
        .requests()
        .into_iter()
        .filter(|r| r.method == "wallet_switchEthereumChain")
        .collect();
    assert_eq!(switches.len(), 1);
    provider
        .handle_message(&response_event(Blockchain::Evm, switches[0].id, Value::Null))
        .expect("response");

    assert_eq!(first.await.expect("join").expect("first"), Value::Null);
    assert_eq!(second.await.expect("join").expect("second"), Value::Null);
    assert_eq!(provider.chain_id().expect("chain"), "0x89");
    assert_eq!(seen.lock().expect("seen").len(), 1);

    // Already on 0x89: answered locally.
    let before = port.count();
    assert_eq!(provider.request(args).await.expect("noop"), Value::Null);
    assert_eq!(port.count(), before);
}

#[tokio::test]
async fn eth_accounts_reads_rejection_as_empty() {
    let (provider, port) = provider();
    let task = spawn_request(&provider, RequestArguments::without_params("eth_accounts"));
    settle().await;
    let request = port.last_request();
    assert_eq!(request.method, "eth_requestAccounts");
    assert_eq!(request.params, json!([{"silent": true}]));

    provider
        .handle_message(&error_event(Blockchain::Evm, request.id, 4100, "locked"))
        .expect("error");
    assert_eq!(task.await.expect("join").expect("accounts"), json!([]));
}

#[tokio::test]
async fn malformed_requests_never_leave_the_page() {
    let (provider, port) = provider();
    let empty = provider.request(RequestArguments::without_params("")).await;
    assert!(matches!(empty, Err(WalletError::InvalidRequest(_))));
    let scalar = provider
        .request(RequestArguments::new("eth_call", json!(42)))
        .await;
    assert!(matches!(scalar, Err(WalletError::InvalidRequest(_))));
    let unknown = provider
        .request(RequestArguments::without_params("foo_bar"))
        .await;
    assert!(matches!(unknown, Err(WalletError::UnsupportedMethod(_))));
    assert_eq!(port.count(), 0);
}

#[tokio::test]
async fn signing_requires_an_active_account() {
    let (provider, port) = provider();
    let result = provider
        .request(RequestArguments::new(
            "personal_sign",
            json!(["0x68656c6c6f", EVM_ADDRESS]),
        ))
        .await;
    assert!(matches!(result, Err(WalletError::Disconnected)));
    assert_eq!(port.count(), 0);
}

#[tokio::test]
async fn personal_sign_puts_message_first() {
    let (provider, port) = provider();
    provider
        .handle_notification("activeWalletUpdated", &json!({"publicKey": EVM_ADDRESS}))
        .expect("active wallet");

    let task = spawn_request(
        &provider,
        RequestArguments::new("personal_sign", json!([EVM_ADDRESS, "0x68656c6c6f"])),
    );
    settle().await;
    let request = port.last_request();
    assert_eq!(request.params, json!(["0x68656c6c6f", EVM_ADDRESS]));
    provider
        .handle_message(&response_event(Blockchain::Evm, request.id, json!("0xsig")))
        .expect("response");
    assert_eq!(task.await.expect("join").expect("sig"), json!("0xsig"));
}

#[tokio::test]
async fn local_answers_and_disconnect_event() {
    let (provider, port) = provider();
    let disconnects = record(&provider, "disconnect");
    assert_eq!(
        provider
            .request(RequestArguments::without_params("eth_chainId"))
            .await
            .expect("chain id"),
        json!("0x1")
    );
    assert_eq!(
        provider.send("net_version", None).await.expect("net_version"),
        json!("1")
    );
    assert_eq!(port.count(), 0);

    provider
        .handle_notification(
            "connected",
            &json!({"publicKey": EVM_ADDRESS, "chainId": "0x1"}),
        )
        .expect("connected");
    assert!(provider.is_connected());
    provider
        .handle_notification("disconnected", &Value::Null)
        .expect("disconnected");
    assert!(!provider.is_connected());
    assert_eq!(provider.selected_address().expect("address"), None);
    let seen = disconnects.lock().expect("seen").clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["code"], json!(DISCONNECTED_CODE));
}

#[tokio::test]
async fn legacy_send_async_delivers_jsonrpc_response() {
    let (provider, port) = provider();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let payload: JsonRpcPayload =
        serde_json::from_value(json!({"id": 7, "method": "eth_chainId"})).expect("payload");
    provider
        .send_async(payload, move |err, response| {
            let _ = tx.send((err.is_none(), response));
        })
        .await;
    let (ok, response) = rx.await.expect("callback");
    assert!(ok);
    let response = response.expect("response");
    assert_eq!(response.id, json!(7));
    assert_eq!(response.result, json!("0x1"));
    assert_eq!(port.count(), 0);
}

/// Stand-in for another extension's injected provider.
#[derive(Default)]
struct OtherWallet {
    listeners: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Eip1193Provider for OtherWallet {
    async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        self.calls.lock().expect("calls").push(args.method.clone());
        Ok(json!(["0x2000000000000000000000000000000000000002"]))
    }

    fn on(&self, event: &str, _listener: Listener) {
        self.listeners.lock().expect("listeners").push(event.to_owned());
    }

    fn remove_listener(&self, _event: &str, _listener: &Listener) -> bool {
        false
    }
}

#[tokio::test]
async fn handoff_migrates_listeners_and_retries_on_chosen_provider() {
    let (provider, port) = provider();
    let router = Arc::new(MultiProviderRouter::new(provider.clone()));
    let other = Arc::new(OtherWallet::default());
    let index = router
        .register_competing_provider(other.clone())
        .expect("register");
    assert_eq!(router.active().expect("active"), ActiveProvider::Own);

    router.on("accountsChanged", listener(|_| {}));
    router.on("chainChanged", listener(|_| {}));

    let task = {
        let router = router.clone();
        tokio::spawn(async move {
            router
                .request(RequestArguments::without_params("eth_requestAccounts"))
                .await
        })
    };
    settle().await;
    let id = port.last_request().id;
    provider
        .handle_message(&response_event(
            Blockchain::Evm,
            id,
            json!({"overriddenBy": index}),
        ))
        .expect("handoff");

    let accounts = task.await.expect("join").expect("accounts");
    assert_eq!(accounts, json!(["0x2000000000000000000000000000000000000002"]));
    assert_eq!(router.active().expect("active"), ActiveProvider::Competing(index));
    assert!(provider.is_overridden());

    let mut migrated = other.listeners.lock().expect("listeners").clone();
    migrated.sort();
    assert_eq!(migrated, vec!["accountsChanged", "chainChanged"]);
    assert_eq!(*other.calls.lock().expect("calls"), vec!["eth_requestAccounts"]);

    // Our façade no longer reacts to pushed state.
    provider
        .handle_notification("chainIdUpdated", &json!("0x5"))
        .expect("ignored");
    assert_eq!(provider.chain_id().expect("chain"), "0x1");
}

#[test]
fn announcer_answers_discovery_requests() {
    let port = RecordingPort::new();
    let config = test_config();
    let provider = EvmProvider::from_config(&config, port).expect("provider");
    let router: Arc<dyn Eip1193Provider> = Arc::new(MultiProviderRouter::new(provider));
    let announced = Arc::new(Mutex::new(Vec::new()));
    let sink = announced.clone();
    let announcer = Eip6963Announcer::new(
        ProviderInfo::from_config(&config.eip6963),
        router,
        move |event: AnnounceProviderEvent| {
            sink.lock()
                .expect("sink")
                .push((event.name(), event.info.rdns.clone()));
        },
    );

    announcer.announce();
    assert!(!announcer.on_window_event("message"));
    assert!(announcer.on_window_event(REQUEST_PROVIDER_EVENT));
    let announced = announced.lock().expect("announced").clone();
    assert_eq!(announced.len(), 2);
    assert_eq!(announced[0], (ANNOUNCE_PROVIDER_EVENT, config.eip6963.rdns.clone()));
    assert!(!announcer.info().uuid.is_empty());
}
