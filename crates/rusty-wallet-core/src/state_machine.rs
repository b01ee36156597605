/// Connection state of a page façade. Chain id is tracked separately and may
/// be read in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    ConnectRequested,
    ConnectSucceeded,
    ConnectFailed,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub reason: &'static str,
}

impl StateTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Total transition function: notifications can arrive in any state, so every
/// pair has a defined target.
pub fn connection_transition(
    from: ConnectionState,
    action: ConnectionAction,
) -> StateTransition {
    use ConnectionAction as A;
    use ConnectionState as S;

    let (to, reason) = match (from, action) {
        (S::Connected, A::ConnectRequested) => (S::Connected, "re-prompt while connected"),
        (_, A::ConnectRequested) => (S::Connecting, "connect requested"),
        (_, A::ConnectSucceeded) => (S::Connected, "connected"),
        (S::Connected, A::ConnectFailed) => (S::Connected, "re-prompt rejected"),
        (_, A::ConnectFailed) => (S::Disconnected, "connect failed"),
        (_, A::Disconnect) => (S::Disconnected, "disconnected"),
    };
    StateTransition { from, to, reason }
}
