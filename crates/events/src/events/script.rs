use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Installation script events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScriptEvent {
    /// Script written to disk
    Generated { path: PathBuf, commands: usize },

    /// Script handed to a shell
    ExecutionStarted { path: PathBuf, shell: String },

    ExecutionCompleted { path: PathBuf, exit_code: i32 },

    ExecutionFailed { path: PathBuf, message: String },
}
