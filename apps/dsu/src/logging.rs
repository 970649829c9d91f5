//! Structured logging integration for events
//!
//! Every event that reaches the CLI is also recorded through `tracing`, so a
//! `--debug` log file holds the full installation history with structured
//! fields.

use dsu_events::{
    AppEvent, BrokerEvent, EventMessage, GeneralEvent, InstallEvent, PlatformEvent, ScriptEvent,
};
use tracing::{debug, error, info, trace, warn};

/// Log an `AppEvent` using the tracing infrastructure with structured fields
pub fn log_event_with_tracing(message: &EventMessage) {
    let event = &message.event;
    let meta = &message.meta;
    let level = meta.tracing_level();

    match event {
        AppEvent::Broker(broker_event) => match broker_event {
            BrokerEvent::BindRequested { attempt } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    attempt = attempt,
                    "Bind requested"
                );
            }
            BrokerEvent::Connected {
                generation,
                uid,
                privileged,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    generation = generation,
                    uid = uid,
                    privileged = privileged,
                    "Privileged executor connected"
                );
            }
            BrokerEvent::Disconnected { generation } => {
                warn!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    generation = generation,
                    "Privileged executor disconnected"
                );
            }
            BrokerEvent::WaitTimedOut {
                elapsed_ms,
                timeout_ms,
            } => {
                warn!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    elapsed_ms = elapsed_ms,
                    timeout_ms = timeout_ms,
                    "Wait for privileged executor timed out"
                );
            }
        },

        AppEvent::Install(install_event) => match install_event {
            InstallEvent::Started {
                partition,
                mode,
                operations,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    partition = %partition,
                    mode = ?mode,
                    operations = operations,
                    "Installation started"
                );
            }
            InstallEvent::OperationStarted {
                index,
                operation,
                detail,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    index = index,
                    operation = %operation,
                    detail = %detail,
                    "Operation started"
                );
            }
            InstallEvent::OperationCompleted {
                index,
                operation,
                duration,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    index = index,
                    operation = %operation,
                    duration_ms = duration.as_millis(),
                    "Operation completed"
                );
            }
            InstallEvent::Completed {
                partition,
                mode,
                bytes_written,
                duration,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    partition = %partition,
                    mode = ?mode,
                    bytes_written = bytes_written,
                    duration_ms = duration.as_millis(),
                    "Installation completed"
                );
            }
            InstallEvent::Failed {
                partition,
                last_completed,
                failure,
            } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    partition = %partition,
                    last_completed = ?last_completed,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Installation failed"
                );
            }
            InstallEvent::Cancelled {
                partition,
                last_completed,
            } => {
                warn!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    partition = %partition,
                    last_completed = ?last_completed,
                    "Installation cancelled"
                );
            }
        },

        AppEvent::Script(script_event) => match script_event {
            ScriptEvent::Generated { path, commands } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = ?meta.correlation_id,
                    path = %path.display(),
                    commands = commands,
                    "Installation script generated"
                );
            }
            ScriptEvent::ExecutionStarted { path, shell } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    path = %path.display(),
                    shell = %shell,
                    "Installation script started"
                );
            }
            ScriptEvent::ExecutionCompleted { path, exit_code } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    path = %path.display(),
                    exit_code = exit_code,
                    "Installation script completed"
                );
            }
            ScriptEvent::ExecutionFailed { path, message } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    path = %path.display(),
                    message = %message,
                    "Installation script failed"
                );
            }
        },

        AppEvent::Platform(PlatformEvent::ProcessFailed {
            command,
            failure,
            duration_ms,
        }) => {
            error!(
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                program = %command.program,
                args = ?command.args,
                duration_ms = duration_ms,
                message = %failure.message,
                "Process failed"
            );
        }

        AppEvent::General(GeneralEvent::Warning { message, context }) => {
            warn!(
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                correlation = ?meta.correlation_id,
                message = %message,
                context = ?context,
                "Warning"
            );
        }
        AppEvent::General(GeneralEvent::Error { message, details }) => {
            error!(
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                correlation = ?meta.correlation_id,
                message = %message,
                details = ?details,
                "Error"
            );
        }

        // Progress ticks, process lifecycle and debug logs
        _ => match level {
            tracing::Level::ERROR => {
                error!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "Application event");
            }
            tracing::Level::WARN => {
                warn!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "Application event");
            }
            tracing::Level::INFO => {
                info!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "Application event");
            }
            tracing::Level::DEBUG => {
                debug!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "Application event");
            }
            tracing::Level::TRACE => {
                trace!(source = meta.source.as_str(), event_id = %meta.event_id, correlation = ?meta.correlation_id, event = ?event, "Application event");
            }
        },
    }
}

/// Initialize tracing/logging
///
/// JSON output keeps the console clean: logs go to a file in debug mode and
/// nowhere otherwise. Debug mode writes JSON records to a timestamped file
/// under the log directory.
pub fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;
    let debug_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dsu=debug,dsu_broker=debug,dsu_install=debug"))
    };

    if debug_enabled {
        if let Some(file) = open_log_file(!json_mode) {
            tracing_subscriber::fmt()
                .json()
                .with_writer(file)
                .with_env_filter(debug_filter())
                .init();
            return;
        }
    }

    if json_mode {
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
}

fn open_log_file(announce: bool) -> Option<std::fs::File> {
    let log_dir = std::path::Path::new(dsu_config::fixed_paths::LOGS_DIR);
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        if announce {
            eprintln!("Warning: Failed to create log directory: {e}");
        }
        return None;
    }

    let log_file = log_dir.join(format!(
        "dsu-{}.log",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ));
    match std::fs::File::create(&log_file) {
        Ok(file) => {
            if announce {
                eprintln!("Debug logging enabled: {}", log_file.display());
            }
            Some(file)
        }
        Err(e) => {
            if announce {
                eprintln!("Warning: Failed to create log file: {e}");
            }
            None
        }
    }
}
