use serde::{Deserialize, Serialize};

use crate::EventSource;
use dsu_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

// Declare all domain modules
pub mod broker;
pub mod general;
pub mod install;
pub mod platform;
pub mod progress;
pub mod script;

// Re-export all domain events
pub use broker::*;
pub use general::*;
pub use install::*;
pub use platform::*;
pub use progress::*;
pub use script::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, debug)
    General(GeneralEvent),

    /// Privileged connection lifecycle
    Broker(BrokerEvent),

    /// Installation attempts and individual operations
    Install(InstallEvent),

    /// Byte-level progress of streaming operations
    Progress(ProgressEvent),

    /// Installation script generation and execution
    Script(ScriptEvent),

    /// Process execution
    Platform(PlatformEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Broker(_) => EventSource::BROKER,
            Self::Install(_) => EventSource::INSTALL,
            Self::Progress(_) => EventSource::PROGRESS,
            Self::Script(_) => EventSource::SCRIPT,
            Self::Platform(_) => EventSource::PLATFORM,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::Install(InstallEvent::Failed { .. })
            | Self::Script(ScriptEvent::ExecutionFailed { .. })
            | Self::Platform(PlatformEvent::ProcessFailed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Broker(BrokerEvent::WaitTimedOut { .. } | BrokerEvent::Disconnected { .. })
            | Self::Install(InstallEvent::Cancelled { .. }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Broker(BrokerEvent::BindRequested { .. })
            | Self::Progress(ProgressEvent::Updated { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "dsu::events::general",
            Self::Broker(_) => "dsu::events::broker",
            Self::Install(_) => "dsu::events::install",
            Self::Progress(_) => "dsu::events::progress",
            Self::Script(_) => "dsu::events::script",
            Self::Platform(_) => "dsu::events::platform",
        }
    }
}
