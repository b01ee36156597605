use rusty_wallet_core::{connection_transition, ConnectionAction, ConnectionState};

#[test]
fn connect_happy_path_transitions() {
    let t1 = connection_transition(
        ConnectionState::Disconnected,
        ConnectionAction::ConnectRequested,
    );
    assert_eq!(t1.to, ConnectionState::Connecting);
    assert!(t1.changed());

    let t2 = connection_transition(t1.to, ConnectionAction::ConnectSucceeded);
    assert_eq!(t2.to, ConnectionState::Connected);

    let t3 = connection_transition(t2.to, ConnectionAction::Disconnect);
    assert_eq!(t3.to, ConnectionState::Disconnected);
}

#[test]
fn rejected_prompt_keeps_existing_connection() {
    let t = connection_transition(ConnectionState::Connected, ConnectionAction::ConnectFailed);
    assert_eq!(t.to, ConnectionState::Connected);
    assert!(!t.changed());

    let t = connection_transition(ConnectionState::Connecting, ConnectionAction::ConnectFailed);
    assert_eq!(t.to, ConnectionState::Disconnected);
}

#[test]
fn pushed_connect_is_accepted_from_any_state() {
    for from in [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
    ] {
        let t = connection_transition(from, ConnectionAction::ConnectSucceeded);
        assert_eq!(t.to, ConnectionState::Connected);
    }
}
