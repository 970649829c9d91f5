//! Capabilities exposed by the privileged executor and the bind collaborator

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dsu_errors::Error;

use crate::broker::Inner;

/// Identity of the peer behind a privileged connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub uid: u32,
}

impl Identity {
    pub const ROOT: Self = Self { uid: 0 };

    #[must_use]
    pub fn new(uid: u32) -> Self {
        Self { uid }
    }

    /// Only the superuser may write dynamic system partitions
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.uid == 0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid {}", self.uid)
    }
}

/// Operations the privileged executor performs on behalf of the installer
///
/// Implementations are free to decide how the bytes reach storage. The
/// broker never inspects them; it only hands out the service to callers
/// holding a live [`crate::ConnectionHandle`].
#[async_trait]
pub trait PrivilegedService: Send + Sync {
    /// Identity the executor runs as, fixed for the lifetime of the connection
    fn identity(&self) -> Identity;

    /// Reserve scratch userdata for the guest system
    async fn allocate_userdata(&self, size_bytes: u64) -> Result<(), Error>;

    /// Create the target partition, pre-sized when the image size is known
    async fn create_partition(&self, name: &str, size_bytes: Option<u64>) -> Result<(), Error>;

    /// Append one chunk of decompressed image data
    async fn write_chunk(&self, partition: &str, data: &[u8]) -> Result<(), Error>;

    /// Close the partition and optionally select it for the next boot
    async fn finalize(&self, partition: &str, activate: bool) -> Result<(), Error>;
}

/// Out-of-process bind collaborator
///
/// `request_bind` is issued at most once per connection attempt. The binder
/// reports the outcome through the supplied [`BindNotifier`], either
/// synchronously or later from any thread.
pub trait Binder: Send + Sync {
    fn request_bind(&self, notifier: BindNotifier);

    /// Tear down the bound connection after an explicit disconnect
    fn unbind(&self) {}
}

/// Weak handle the binder uses to report connection changes
#[derive(Clone)]
pub struct BindNotifier {
    inner: Weak<Inner>,
    attempt: u64,
}

impl BindNotifier {
    pub(crate) fn new(inner: &Arc<Inner>, attempt: u64) -> Self {
        Self {
            inner: Arc::downgrade(inner),
            attempt,
        }
    }

    /// Bind attempt this notifier was issued for
    #[must_use]
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn connected(&self, service: Arc<dyn PrivilegedService>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.connected(service);
        }
    }

    pub fn disconnected(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.disconnected();
        }
    }

    /// The executor could not be reached; pending waiters fail immediately
    pub fn failed(&self, message: impl Into<String>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.bind_failed(message.into());
        }
    }
}

impl fmt::Debug for BindNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindNotifier")
            .field("attempt", &self.attempt)
            .field("broker_alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
