use std::fmt;
use std::sync::Arc;

use crate::service::{Identity, PrivilegedService};

/// Lifecycle of the privileged connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct Connection {
    pub(crate) service: Arc<dyn PrivilegedService>,
    pub(crate) identity: Identity,
}

/// Everything guarded by the broker mutex
pub(crate) struct State {
    pub(crate) phase: ConnectionState,
    pub(crate) generation: u64,
    pub(crate) connection: Option<Arc<Connection>>,
    pub(crate) waiters: usize,
    pub(crate) bind_attempts: u64,
    pub(crate) bind_error: Option<String>,
}

impl State {
    pub(crate) fn new() -> Self {
        Self {
            phase: ConnectionState::Disconnected,
            generation: 1,
            connection: None,
            waiters: 0,
            bind_attempts: 0,
            bind_error: None,
        }
    }

    /// Take the DISCONNECTED/FAILED -> CONNECTING edge.
    ///
    /// Returns the attempt number when the caller must issue the bind request.
    pub(crate) fn begin_connecting(&mut self) -> Option<u64> {
        match self.phase {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.phase = ConnectionState::Connecting;
                self.bind_error = None;
                self.bind_attempts += 1;
                Some(self.bind_attempts)
            }
            ConnectionState::Connecting | ConnectionState::Connected => None,
        }
    }

    pub(crate) fn live_connection(&self) -> Option<&Arc<Connection>> {
        match self.phase {
            ConnectionState::Connected => self.connection.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_edge_into_connecting() {
        let mut state = State::new();
        assert_eq!(state.begin_connecting(), Some(1));
        assert_eq!(state.begin_connecting(), None);
        assert_eq!(state.phase, ConnectionState::Connecting);

        state.phase = ConnectionState::Failed;
        state.bind_error = Some("gone".into());
        assert_eq!(state.begin_connecting(), Some(2));
        assert!(state.bind_error.is_none());
    }
}
