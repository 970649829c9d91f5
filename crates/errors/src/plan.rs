//! Session and installation-plan error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PlanError {
    #[error("invalid installation parameter {field}: {reason}")]
    InvalidParameters { field: String, reason: String },

    #[error("an installation attempt is already in progress for session {session}")]
    AttemptInProgress { session: String },

    #[error("installation script already recorded at {path}")]
    ScriptPathAlreadyRecorded { path: String },
}

impl PlanError {
    /// Shorthand for an invalid-parameter failure
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl UserFacingError for PlanError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidParameters { field, .. } => Some(match field.as_str() {
                "partition" => "Use a partition name made of letters, digits, '_' or '-'.",
                "userdata_size_gib" => "Request at least 1 GiB of userdata.",
                _ => "Correct the installation parameters and try again.",
            }),
            Self::AttemptInProgress { .. } => {
                Some("Wait for the running installation to finish or cancel it first.")
            }
            Self::ScriptPathAlreadyRecorded { .. } => {
                Some("Start a new session to generate another script.")
            }
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidParameters { .. } => "plan.invalid_parameters",
            Self::AttemptInProgress { .. } => "plan.attempt_in_progress",
            Self::ScriptPathAlreadyRecorded { .. } => "plan.script_already_recorded",
        };
        Some(code)
    }
}
