#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Privileged connection broker for dsu
//!
//! The broker owns the single connection to the out-of-process privileged
//! executor. It serves two kinds of callers:
//!
//! - blocking call sites, through [`PrivilegedBroker::await_connection`],
//!   which park the calling thread on a condition variable;
//! - async call sites, through [`PrivilegedBroker::wait_connection`] and
//!   [`PrivilegedBroker::acquire`], which park on a `tokio::sync::watch`
//!   notification.
//!
//! Both re-check the connection at least once per poll interval and give up
//! with [`BrokerError::Timeout`] once the configured timeout elapses.
//!
//! ## State machine
//!
//! ```text
//! DISCONNECTED --first waiter--> CONNECTING --notify_connected--> CONNECTED
//!                                    |                                |
//!                         last waiter times out              notify_disconnected
//!                                    v                                v
//!                                 FAILED --next waiter--> CONNECTING  DISCONNECTED
//! ```
//!
//! Every disconnect bumps the generation counter, which turns every
//! outstanding [`ConnectionHandle`] stale at once.

mod broker;
mod handle;
mod service;
mod state;

pub use broker::PrivilegedBroker;
pub use dsu_errors::BrokerError;
pub use handle::{ConnectionHandle, ConnectionLease};
pub use service::{BindNotifier, Binder, Identity, PrivilegedService};
pub use state::ConnectionState;

use std::time::Duration;

/// Wait policy for connection waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl BrokerSettings {
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        (&dsu_config::BrokerConfig::default()).into()
    }
}

impl From<&dsu_config::BrokerConfig> for BrokerSettings {
    fn from(config: &dsu_config::BrokerConfig) -> Self {
        Self::new(config.timeout(), config.poll_interval())
    }
}
