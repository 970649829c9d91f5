//! Privileged connection broker error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BrokerError {
    #[error("privileged connection not established after {elapsed_ms}ms (timeout {timeout_ms}ms)")]
    Timeout { elapsed_ms: u64, timeout_ms: u64 },

    #[error("privileged connection generation {generation} was dropped before use")]
    StaleConnection { generation: u64 },

    #[error("privileged executor runs without elevated privileges (uid {uid})")]
    NotPrivileged { uid: u32 },

    #[error("bind request failed: {message}")]
    BindFailed { message: String },

    #[error("privileged service call {operation} failed: {message}")]
    ServiceCall { operation: String, message: String },
}

impl UserFacingError for BrokerError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } => {
                Some("Make sure the privileged executor is running and authorised, then retry.")
            }
            Self::StaleConnection { .. } => {
                Some("The privileged executor restarted. Retry to reconnect.")
            }
            Self::NotPrivileged { .. } => Some(
                "Grant root access to the privileged executor or generate an installation script instead.",
            ),
            Self::BindFailed { .. } => Some("Check that the privileged executor is installed."),
            Self::ServiceCall { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::StaleConnection { .. } | Self::BindFailed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Timeout { .. } => "broker.timeout",
            Self::StaleConnection { .. } => "broker.stale_connection",
            Self::NotPrivileged { .. } => "broker.not_privileged",
            Self::BindFailed { .. } => "broker.bind_failed",
            Self::ServiceCall { .. } => "broker.service_call",
        };
        Some(code)
    }
}
