//! Holds a thread safe connection state implementation.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::watch;

use crate::error::ApiError;

/// Connection state of a chain api.
///
/// Transitions: `Disconnected -> Connected -> Active -> Disconnected`. A failed status check while
/// `Connected` falls back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection to the node.
    Disconnected = 0,
    /// Transport built, node not yet checked.
    Connected = 1,
    /// Node answered, operations are served.
    Active = 2,
}

impl ConnectionState {
    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connected)
                | (Connected, Active)
                | (Connected, Disconnected)
                | (Active, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Active => "active",
        };
        f.write_str(state)
    }
}

impl From<usize> for ConnectionState {
    fn from(value: usize) -> Self {
        match value {
            1 => ConnectionState::Connected,
            2 => ConnectionState::Active,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl From<ConnectionState> for usize {
    fn from(state: ConnectionState) -> Self {
        state as usize
    }
}

/// Holds a thread safe representation of a [`ConnectionState`].
/// Possible values:
/// - [0: Disconnected]
/// - [1: Connected]
/// - [2: Active]
#[derive(Debug, Clone)]
pub struct AtomicConnectionState(Arc<AtomicUsize>);

impl AtomicConnectionState {
    /// Creates a new AtomicConnectionState.
    pub fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicUsize::new(state.into())))
    }

    /// Loads the value held in the AtomicConnectionState.
    pub fn load(&self) -> ConnectionState {
        self.0.load(Ordering::SeqCst).into()
    }

    /// Stores `to` if the current value is `from`, returns the value found.
    fn compare_exchange(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        self.0
            .compare_exchange(from.into(), to.into(), Ordering::SeqCst, Ordering::SeqCst)
            .map(ConnectionState::from)
            .map_err(ConnectionState::from)
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state.into(), Ordering::SeqCst);
    }
}

/// Connection state with guarded transitions and change notifications.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    state: AtomicConnectionState,
    notifier: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatus {
    /// Returns a new status in the `Disconnected` state.
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(ConnectionState::Disconnected);
        ConnectionStatus {
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            notifier: Arc::new(notifier),
        }
    }

    /// Returns the current state.
    pub fn load(&self) -> ConnectionState {
        self.state.load()
    }

    /// Moves from `from` to `to`.
    ///
    /// Fails with the state actually found if it is not `from`, or if the transition is not
    /// legal.
    pub fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), ConnectionState> {
        if !from.can_transition_to(to) {
            return Err(self.load());
        }
        self.state.compare_exchange(from, to)?;
        self.notifier.send_replace(to);
        Ok(())
    }

    /// Moves to `Disconnected` from any state.
    pub fn disconnect(&self) {
        self.state.store(ConnectionState::Disconnected);
        self.notifier.send_replace(ConnectionState::Disconnected);
    }

    /// Fails `NotConnected` unless the state is `Active`.
    pub fn ensure_active(&self, method: &str) -> Result<(), ApiError> {
        match self.load() {
            ConnectionState::Active => Ok(()),
            state => Err(ApiError::NotConnected {
                method: method.to_string(),
                state,
            }),
        }
    }

    /// Returns a receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.notifier.subscribe()
    }
}
