//! Installation execution error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum InstallError {
    /// An operation failed against a live connection; earlier operations may
    /// already be applied on the privileged side.
    #[error(
        "installing {partition} failed during {failed} (last completed: {}): {cause}",
        .last_completed.as_deref().unwrap_or("none")
    )]
    ExecutionFailed {
        partition: String,
        last_completed: Option<String>,
        failed: String,
        cause: String,
        retryable: bool,
    },

    #[error("failed to read image {path}: {message}")]
    ImageRead { path: String, message: String },

    #[error("failed to write installation script {path}: {message}")]
    ScriptWrite { path: String, message: String },

    #[error("installation script {path} exited with {code:?}")]
    ScriptFailed { path: String, code: Option<i32> },
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ExecutionFailed { .. } => Some(
                "The partition may be partially written. Discard the dynamic system image before retrying.",
            ),
            Self::ImageRead { .. } => Some("Check that the image file exists and is readable."),
            Self::ScriptWrite { .. } => Some("Choose a writable output path for the script."),
            Self::ScriptFailed { .. } => Some("Inspect the script output for the failing command."),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::ExecutionFailed { retryable, .. } => *retryable,
            Self::ImageRead { .. } | Self::ScriptWrite { .. } | Self::ScriptFailed { .. } => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ExecutionFailed { .. } => "install.execution_failed",
            Self::ImageRead { .. } => "install.image_read",
            Self::ScriptWrite { .. } => "install.script_write",
            Self::ScriptFailed { .. } => "install.script_failed",
        };
        Some(code)
    }
}
