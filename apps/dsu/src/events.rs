//! Event handling and progress display

use console::{style, Term};
use dsu_events::{
    AppEvent, BrokerEvent, EventMessage, GeneralEvent, InstallEvent, ProgressEvent, ScriptEvent,
};

use crate::display::format_size;
use crate::logging::log_event_with_tracing;

/// Renders status lines for incoming events on stderr
pub struct EventHandler {
    term: Term,
    colors: bool,
    debug: bool,
    quiet: bool,
    /// A progress line is on screen and must be cleared before the next line
    progress_active: bool,
}

impl EventHandler {
    pub fn new(colors_enabled: bool, debug_enabled: bool) -> Self {
        Self {
            term: Term::stderr(),
            colors: colors_enabled,
            debug: debug_enabled,
            quiet: false,
            progress_active: false,
        }
    }

    /// Log only; JSON output must not be interleaved with status lines
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn handle_event(&mut self, message: EventMessage) {
        log_event_with_tracing(&message);
        if self.quiet {
            return;
        }

        match message.event {
            AppEvent::Broker(BrokerEvent::BindRequested { attempt }) => {
                self.show_status(&format!("Connecting to privileged executor (attempt {attempt})"));
            }
            AppEvent::Broker(BrokerEvent::Connected { uid, privileged, .. }) => {
                if privileged {
                    self.show_success(&format!("Connected to privileged executor (uid {uid})"));
                } else {
                    self.show_warning(&format!("Connected executor runs as uid {uid}, not root"));
                }
            }
            AppEvent::Broker(BrokerEvent::Disconnected { generation }) => {
                self.show_warning(&format!("Privileged executor disconnected (connection {generation})"));
            }
            AppEvent::Broker(BrokerEvent::WaitTimedOut { timeout_ms, .. }) => {
                self.show_error(&format!("No privileged executor within {timeout_ms}ms"));
            }

            AppEvent::Install(InstallEvent::Started {
                partition,
                mode,
                operations,
            }) => {
                self.show_status(&format!(
                    "Installing into '{partition}' ({operations} operations, {mode:?})"
                ));
            }
            AppEvent::Install(InstallEvent::OperationStarted { index, detail, .. }) => {
                self.show_status(&format!("[{}] {detail}", index + 1));
            }
            AppEvent::Install(InstallEvent::OperationCompleted { .. }) => {
                self.clear_progress();
            }
            AppEvent::Install(InstallEvent::Completed {
                partition,
                bytes_written,
                ..
            }) => {
                self.show_success(&format!(
                    "Installed '{partition}' ({})",
                    format_size(bytes_written)
                ));
            }
            AppEvent::Install(InstallEvent::Failed {
                last_completed,
                failure,
                ..
            }) => {
                let after = last_completed.unwrap_or_else(|| "nothing".to_string());
                self.show_error(&format!(
                    "Installation failed after {after}: {}",
                    failure.message
                ));
            }
            AppEvent::Install(InstallEvent::Cancelled { last_completed, .. }) => {
                let after = last_completed.unwrap_or_else(|| "nothing".to_string());
                self.show_warning(&format!("Installation cancelled; last completed: {after}"));
            }

            AppEvent::Progress(ProgressEvent::Updated {
                bytes_done,
                fraction,
                ..
            }) => {
                self.show_progress(bytes_done, fraction);
            }
            AppEvent::Progress(ProgressEvent::Completed { .. }) => {
                self.clear_progress();
            }
            AppEvent::Progress(ProgressEvent::Started { .. }) => {}

            AppEvent::Script(ScriptEvent::Generated { path, commands }) => {
                self.show_success(&format!(
                    "Wrote {commands} commands to {}",
                    path.display()
                ));
            }
            AppEvent::Script(ScriptEvent::ExecutionStarted { path, shell }) => {
                self.show_status(&format!("Running {} with {shell}", path.display()));
            }
            AppEvent::Script(ScriptEvent::ExecutionCompleted { exit_code, .. }) => {
                self.show_success(&format!("Script finished (exit {exit_code})"));
            }
            AppEvent::Script(ScriptEvent::ExecutionFailed { message, .. }) => {
                self.show_error(&format!("Script failed: {message}"));
            }

            AppEvent::General(GeneralEvent::Warning { message, context }) => match context {
                Some(context) => self.show_warning(&format!("{message} ({context})")),
                None => self.show_warning(&message),
            },
            AppEvent::General(GeneralEvent::Error { message, details }) => match details {
                Some(details) => self.show_error(&format!("{message}: {details}")),
                None => self.show_error(&message),
            },
            AppEvent::General(GeneralEvent::DebugLog { message }) => {
                if self.debug {
                    self.show_status(&message);
                }
            }

            AppEvent::Platform(_) => {}
        }
    }

    fn show_progress(&mut self, bytes_done: u64, fraction: Option<f64>) {
        let line = match fraction {
            Some(fraction) => format!(
                "  {} written ({:.0}%)",
                format_size(bytes_done),
                fraction * 100.0
            ),
            None => format!("  {} written", format_size(bytes_done)),
        };
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&line);
        self.progress_active = true;
    }

    fn clear_progress(&mut self) {
        if self.progress_active {
            let _ = self.term.clear_line();
            self.progress_active = false;
        }
    }

    fn write_line(&mut self, line: &str) {
        self.clear_progress();
        let _ = self.term.write_line(line);
    }

    fn show_status(&mut self, message: &str) {
        self.write_line(message);
    }

    fn show_success(&mut self, message: &str) {
        let line = if self.colors {
            format!("{} {message}", style("✓").green())
        } else {
            format!("[OK] {message}")
        };
        self.write_line(&line);
    }

    fn show_warning(&mut self, message: &str) {
        let line = if self.colors {
            format!("{} {message}", style("!").yellow().bold())
        } else {
            format!("[WARN] {message}")
        };
        self.write_line(&line);
    }

    fn show_error(&mut self, message: &str) {
        let line = if self.colors {
            format!("{} {message}", style("✗").red().bold())
        } else {
            format!("[ERROR] {message}")
        };
        self.write_line(&line);
    }
}
