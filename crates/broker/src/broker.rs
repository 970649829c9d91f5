use std::sync::Arc;
use std::time::Duration;

use dsu_errors::BrokerError;
use dsu_events::{AppEvent, BrokerEvent, EventEmitter, EventSender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::handle::{ConnectionHandle, ConnectionLease};
use crate::service::{BindNotifier, Binder, PrivilegedService};
use crate::state::{Connection, ConnectionState, State};
use crate::BrokerSettings;

pub(crate) struct Inner {
    settings: BrokerSettings,
    binder: Arc<dyn Binder>,
    pub(crate) state: Mutex<State>,
    changed: Condvar,
    notify: watch::Sender<u64>,
    use_lock: Arc<AsyncMutex<()>>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for Inner {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl Inner {
    /// Wake blocking waiters and async waiters alike
    fn publish(&self) {
        self.changed.notify_all();
        self.notify.send_modify(|tick| *tick = tick.wrapping_add(1));
    }

    pub(crate) fn connected(&self, service: Arc<dyn PrivilegedService>) {
        let identity = service.identity();
        let generation = {
            let mut state = self.state.lock();
            if state.connection.is_some() {
                state.generation += 1;
            }
            state.connection = Some(Arc::new(Connection { service, identity }));
            state.phase = ConnectionState::Connected;
            state.bind_error = None;
            state.generation
        };
        self.publish();

        debug!(generation, uid = identity.uid, "privileged connection established");
        self.emit(AppEvent::Broker(BrokerEvent::Connected {
            generation,
            uid: identity.uid,
            privileged: identity.is_privileged(),
        }));
    }

    pub(crate) fn disconnected(&self) {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = state.generation;
            state.connection = None;
            state.generation += 1;
            state.phase = ConnectionState::Disconnected;
            dropped
        };
        self.publish();

        debug!(generation = dropped, "privileged connection dropped");
        self.emit(AppEvent::Broker(BrokerEvent::Disconnected {
            generation: dropped,
        }));
    }

    pub(crate) fn bind_failed(&self, message: String) {
        {
            let mut state = self.state.lock();
            if state.phase != ConnectionState::Connecting {
                return;
            }
            state.phase = ConnectionState::Failed;
            state.bind_error = Some(message.clone());
        }
        self.publish();

        debug!(%message, "bind request failed");
        self.emit_warning_with_context("privileged executor bind failed", message);
    }

    fn timed_out(
        &self,
        state: &mut State,
        slot: &mut WaiterSlot<'_>,
        elapsed: Duration,
        timeout: Duration,
    ) -> BrokerError {
        slot.release(state);
        if state.waiters == 0 && state.phase == ConnectionState::Connecting {
            state.phase = ConnectionState::Failed;
        }

        let elapsed_ms = millis(elapsed);
        let timeout_ms = millis(timeout);
        debug!(elapsed_ms, timeout_ms, phase = %state.phase, "connection wait timed out");
        self.emit(AppEvent::Broker(BrokerEvent::WaitTimedOut {
            elapsed_ms,
            timeout_ms,
        }));
        BrokerError::Timeout {
            elapsed_ms,
            timeout_ms,
        }
    }
}

/// Registered waiter; unregisters on drop so abandoned async waits are counted out
struct WaiterSlot<'a> {
    inner: &'a Inner,
    active: bool,
}

impl<'a> WaiterSlot<'a> {
    fn register(inner: &'a Inner, state: &mut State) -> Self {
        state.waiters += 1;
        if state.phase == ConnectionState::Failed {
            // failure belongs to an earlier attempt
            state.bind_error = None;
        }
        Self {
            inner,
            active: true,
        }
    }

    fn release(&mut self, state: &mut State) {
        if self.active {
            state.waiters = state.waiters.saturating_sub(1);
            self.active = false;
        }
    }
}

impl Drop for WaiterSlot<'_> {
    fn drop(&mut self) {
        if self.active {
            let mut state = self.inner.state.lock();
            state.waiters = state.waiters.saturating_sub(1);
        }
    }
}

/// What a waiter should do after inspecting the state
enum Step {
    Ready(ConnectionHandle),
    Fail(BrokerError),
    Bind(u64),
    Wait(Duration),
}

/// Owner of the single privileged connection of the process
///
/// Construct one broker at start-up and pass clones of it to every
/// component that needs the privileged executor.
#[derive(Clone)]
pub struct PrivilegedBroker {
    inner: Arc<Inner>,
}

impl PrivilegedBroker {
    #[must_use]
    pub fn new(settings: BrokerSettings, binder: Arc<dyn Binder>) -> Self {
        Self::build(settings, binder, None)
    }

    #[must_use]
    pub fn with_event_sender(
        settings: BrokerSettings,
        binder: Arc<dyn Binder>,
        event_sender: EventSender,
    ) -> Self {
        Self::build(settings, binder, Some(event_sender))
    }

    fn build(
        settings: BrokerSettings,
        binder: Arc<dyn Binder>,
        event_sender: Option<EventSender>,
    ) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                settings,
                binder,
                state: Mutex::new(State::new()),
                changed: Condvar::new(),
                notify,
                use_lock: Arc::new(AsyncMutex::new(())),
                event_sender,
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &BrokerSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// Number of bind requests issued so far
    #[must_use]
    pub fn bind_attempts(&self) -> u64 {
        self.inner.state.lock().bind_attempts
    }

    /// Non-blocking snapshot
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().live_connection().is_some()
    }

    /// Start connecting without waiting for the outcome
    pub fn request_bind(&self) {
        let attempt = self.inner.state.lock().begin_connecting();
        if let Some(attempt) = attempt {
            self.issue_bind(attempt);
        }
    }

    pub fn notify_connected(&self, service: Arc<dyn PrivilegedService>) {
        self.inner.connected(service);
    }

    pub fn notify_disconnected(&self) {
        self.inner.disconnected();
    }

    /// Drop the connection on our side and invalidate every outstanding handle
    pub fn disconnect(&self) {
        self.inner.binder.unbind();
        self.inner.disconnected();
    }

    /// Block until connected, using the configured timeout
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Timeout`] when no connection arrives in time and
    /// [`BrokerError::BindFailed`] when the binder reports a failure.
    pub fn await_connection(&self) -> Result<ConnectionHandle, BrokerError> {
        self.await_connection_for(self.inner.settings.timeout)
    }

    /// Block the calling thread until connected or `timeout` elapses
    ///
    /// The condition is re-checked at least once per poll interval, so the
    /// wait never overshoots the deadline by more than one interval.
    ///
    /// # Errors
    ///
    /// See [`Self::await_connection`].
    pub fn await_connection_for(&self, timeout: Duration) -> Result<ConnectionHandle, BrokerError> {
        let started = std::time::Instant::now();
        let mut state = self.inner.state.lock();
        if let Some(handle) = self.live_handle(&state) {
            return Ok(handle);
        }

        let mut slot = WaiterSlot::register(&self.inner, &mut state);
        loop {
            match self.step(&mut state, &mut slot, started.elapsed(), timeout) {
                Step::Ready(handle) => return Ok(handle),
                Step::Fail(err) => return Err(err),
                Step::Bind(attempt) => {
                    MutexGuard::unlocked(&mut state, || self.issue_bind(attempt));
                }
                Step::Wait(tick) => {
                    self.inner.changed.wait_for(&mut state, tick);
                }
            }
        }
    }

    /// Wait for the connection without blocking the runtime
    ///
    /// # Errors
    ///
    /// See [`Self::await_connection`].
    pub async fn wait_connection(&self) -> Result<ConnectionHandle, BrokerError> {
        self.wait_connection_for(self.inner.settings.timeout).await
    }

    /// Async counterpart of [`Self::await_connection_for`]
    ///
    /// Returns immediately when a connection is already established.
    ///
    /// # Errors
    ///
    /// See [`Self::await_connection`].
    pub async fn wait_connection_for(
        &self,
        timeout: Duration,
    ) -> Result<ConnectionHandle, BrokerError> {
        let started = tokio::time::Instant::now();
        let mut changes = self.inner.notify.subscribe();

        let mut slot = {
            let mut state = self.inner.state.lock();
            if let Some(handle) = self.live_handle(&state) {
                return Ok(handle);
            }
            WaiterSlot::register(&self.inner, &mut state)
        };

        loop {
            let step = {
                let mut state = self.inner.state.lock();
                self.step(&mut state, &mut slot, started.elapsed(), timeout)
            };
            match step {
                Step::Ready(handle) => return Ok(handle),
                Step::Fail(err) => return Err(err),
                Step::Bind(attempt) => self.issue_bind(attempt),
                Step::Wait(tick) => {
                    // a lapsed tick only means "look again"
                    let _ = tokio::time::timeout(tick, changes.changed()).await;
                }
            }
        }
    }

    /// Run [`Self::wait_connection`] as a task
    #[must_use]
    pub fn spawn_wait(&self) -> JoinHandle<Result<ConnectionHandle, BrokerError>> {
        let broker = self.clone();
        tokio::spawn(async move { broker.wait_connection().await })
    }

    /// Wait for the connection and take exclusive use of it
    ///
    /// # Errors
    ///
    /// See [`Self::await_connection`].
    pub async fn acquire(&self) -> Result<ConnectionLease, BrokerError> {
        let handle = self.wait_connection().await?;
        let guard = Arc::clone(&self.inner.use_lock).lock_owned().await;
        // the connection may have been replaced while queued for the lock
        let handle = if handle.is_live() {
            handle
        } else {
            self.wait_connection().await?
        };
        Ok(ConnectionLease::new(handle, guard))
    }

    /// Block until connected and report whether the executor runs as root
    ///
    /// # Errors
    ///
    /// See [`Self::await_connection`].
    pub fn is_privileged(&self) -> Result<bool, BrokerError> {
        self.await_connection().map(|handle| handle.is_privileged())
    }

    fn step(
        &self,
        state: &mut State,
        slot: &mut WaiterSlot<'_>,
        elapsed: Duration,
        timeout: Duration,
    ) -> Step {
        if let Some(handle) = self.live_handle(state) {
            slot.release(state);
            return Step::Ready(handle);
        }
        let bind_error = match state.phase {
            ConnectionState::Failed => state.bind_error.clone(),
            _ => None,
        };
        if let Some(message) = bind_error {
            slot.release(state);
            return Step::Fail(BrokerError::BindFailed { message });
        }
        if let Some(attempt) = state.begin_connecting() {
            return Step::Bind(attempt);
        }
        if elapsed >= timeout {
            return Step::Fail(self.inner.timed_out(state, slot, elapsed, timeout));
        }
        Step::Wait(self.inner.settings.poll_interval.min(timeout - elapsed))
    }

    fn live_handle(&self, state: &State) -> Option<ConnectionHandle> {
        state.live_connection().map(|connection| {
            ConnectionHandle::new(
                Arc::clone(connection),
                state.generation,
                Arc::clone(&self.inner),
            )
        })
    }

    /// Must be called without holding the state lock
    fn issue_bind(&self, attempt: u64) {
        debug!(attempt, "requesting privileged executor bind");
        self.inner
            .emit(AppEvent::Broker(BrokerEvent::BindRequested { attempt }));
        self.inner
            .binder
            .request_bind(BindNotifier::new(&self.inner, attempt));
    }
}

impl std::fmt::Debug for PrivilegedBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PrivilegedBroker")
            .field("state", &state.phase)
            .field("generation", &state.generation)
            .field("waiters", &state.waiters)
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
