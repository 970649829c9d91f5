use dsu_session::OperationKind;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::script::RenderedCommand;

/// One operation the executor issued
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub index: usize,
    pub kind: OperationKind,
    pub duration: Duration,
}

/// Result of a completed privileged installation
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub session_id: Uuid,
    pub partition: String,
    pub operations: Vec<OperationRecord>,
    /// Decompressed bytes written to the partition
    pub bytes_written: u64,
    pub duration: Duration,
}

impl InstallReport {
    #[must_use]
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.operations.iter().map(|record| record.kind).collect()
    }
}

/// How a privileged run ended when it did not fail
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed(InstallReport),
    /// Stopped on request; operations up to `last_completed` stay applied
    Cancelled {
        last_completed: Option<OperationKind>,
    },
}

/// Generated installation script
#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub path: PathBuf,
    pub commands: Vec<RenderedCommand>,
}

/// Result of [`crate::Installer::install`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InstallOutcome {
    Installed(InstallReport),
    Script(ScriptReport),
    Cancelled {
        last_completed: Option<OperationKind>,
    },
}
