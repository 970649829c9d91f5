use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use dsu_errors::BrokerError;
use tokio::sync::OwnedMutexGuard;

use crate::broker::Inner;
use crate::service::{Identity, PrivilegedService};
use crate::state::Connection;

/// Capability to use the connection of one generation
///
/// Handles are cheap to clone. Once the broker observes a disconnect every
/// handle issued before it reports [`BrokerError::StaleConnection`].
#[derive(Clone)]
pub struct ConnectionHandle {
    connection: Arc<Connection>,
    generation: u64,
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    pub(crate) fn new(connection: Arc<Connection>, generation: u64, inner: Arc<Inner>) -> Self {
        Self {
            connection,
            generation,
            inner,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.connection.identity
    }

    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.connection.identity.is_privileged()
    }

    /// Whether the broker still considers this generation connected
    #[must_use]
    pub fn is_live(&self) -> bool {
        let state = self.inner.state.lock();
        self.matches(state.live_connection(), state.generation)
    }

    /// Check liveness and hand out the service under the broker lock
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::StaleConnection`] when the connection this
    /// handle was issued for has been dropped.
    pub fn service(&self) -> Result<Arc<dyn PrivilegedService>, BrokerError> {
        let state = self.inner.state.lock();
        if self.matches(state.live_connection(), state.generation) {
            Ok(Arc::clone(&self.connection.service))
        } else {
            Err(BrokerError::StaleConnection {
                generation: self.generation,
            })
        }
    }

    fn matches(&self, current: Option<&Arc<Connection>>, generation: u64) -> bool {
        generation == self.generation
            && current.is_some_and(|current| Arc::ptr_eq(current, &self.connection))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("generation", &self.generation)
            .field("identity", &self.connection.identity)
            .finish_non_exhaustive()
    }
}

/// A handle plus exclusive use of the connection until dropped
pub struct ConnectionLease {
    handle: ConnectionHandle,
    _guard: OwnedMutexGuard<()>,
}

impl ConnectionLease {
    pub(crate) fn new(handle: ConnectionHandle, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            handle,
            _guard: guard,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

impl Deref for ConnectionLease {
    type Target = ConnectionHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionLease").field(&self.handle).finish()
    }
}
