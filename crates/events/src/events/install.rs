use dsu_types::InstallMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FailureContext;

/// Installation domain events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstallEvent {
    /// Installation attempt started
    Started {
        partition: String,
        mode: InstallMode,
        operations: usize,
    },

    /// One operation of the sequence is about to be issued
    OperationStarted {
        index: usize,
        operation: String,
        detail: String,
    },

    /// One operation of the sequence finished
    OperationCompleted {
        index: usize,
        operation: String,
        duration: Duration,
    },

    /// Installation completed successfully
    Completed {
        partition: String,
        mode: InstallMode,
        bytes_written: u64,
        duration: Duration,
    },

    /// Installation failed
    Failed {
        partition: String,
        last_completed: Option<String>,
        failure: FailureContext,
    },

    /// Installation stopped on request; applied operations are left in place
    Cancelled {
        partition: String,
        last_completed: Option<String>,
    },
}
