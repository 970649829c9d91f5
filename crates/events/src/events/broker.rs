use serde::{Deserialize, Serialize};

/// Privileged connection lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BrokerEvent {
    /// A bind request was handed to the bind collaborator
    BindRequested { attempt: u64 },

    /// The privileged executor is reachable
    Connected {
        generation: u64,
        uid: u32,
        privileged: bool,
    },

    /// The connection was dropped; every handle of `generation` is stale
    Disconnected { generation: u64 },

    /// A waiter gave up
    WaitTimedOut { elapsed_ms: u64, timeout_ms: u64 },
}
