//! Platform-specific operation events

use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Description of an executed command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessCommandDescriptor {
    pub program: String,
    pub args: Vec<String>,
}

/// Process execution events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PlatformEvent {
    ProcessStarted {
        command: ProcessCommandDescriptor,
    },

    ProcessCompleted {
        command: ProcessCommandDescriptor,
        exit_code: Option<i32>,
        duration_ms: u64,
    },

    ProcessFailed {
        command: ProcessCommandDescriptor,
        failure: FailureContext,
        duration_ms: u64,
    },
}
