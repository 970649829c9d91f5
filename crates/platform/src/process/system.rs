//! Process execution on the host through `tokio::process`

use async_trait::async_trait;
use dsu_errors::{Error, PlatformError};
use dsu_events::events::ProcessCommandDescriptor;
use dsu_events::{AppEvent, EventEmitter, FailureContext, PlatformEvent};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::core::PlatformContext;
use crate::process::{CommandOutput, PlatformCommand, ProcessOperations};

/// Shell used to run piped commands
const PIPELINE_SHELL: &str = "/bin/sh";

/// Host implementation of process operations
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessOperations;

impl SystemProcessOperations {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn emit_process_completed(
    ctx: &PlatformContext,
    descriptor: &ProcessCommandDescriptor,
    output: &CommandOutput,
    duration: Duration,
) {
    ctx.emit(AppEvent::Platform(PlatformEvent::ProcessCompleted {
        command: descriptor.clone(),
        exit_code: output.status.code(),
        duration_ms: duration_to_millis(duration),
    }));
}

fn emit_process_failed(
    ctx: &PlatformContext,
    descriptor: &ProcessCommandDescriptor,
    error: &PlatformError,
    duration: Duration,
) {
    ctx.emit(AppEvent::Platform(PlatformEvent::ProcessFailed {
        command: descriptor.clone(),
        failure: FailureContext::from_error(error),
        duration_ms: duration_to_millis(duration),
    }));
}

/// Pipelines run through the shell; plain commands are spawned directly
fn build_command(cmd: &PlatformCommand) -> Command {
    if cmd.upstream().is_some() {
        let mut shell = Command::new(PIPELINE_SHELL);
        shell.arg("-c").arg(cmd.to_shell_line());
        shell
    } else {
        let mut direct = Command::new(cmd.program());
        direct.args(cmd.get_args());
        direct
    }
}

#[async_trait]
impl ProcessOperations for SystemProcessOperations {
    async fn execute_command(
        &self,
        ctx: &PlatformContext,
        cmd: PlatformCommand,
    ) -> Result<CommandOutput, Error> {
        let start = Instant::now();
        let descriptor = cmd.descriptor();

        ctx.emit(AppEvent::Platform(PlatformEvent::ProcessStarted {
            command: descriptor.clone(),
        }));
        tracing::debug!(command = %cmd, "spawning process");

        let result = build_command(&cmd)
            .output()
            .await
            .map(|output| CommandOutput {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            })
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PlatformError::CommandNotFound {
                    command: cmd.program().to_string(),
                },
                std::io::ErrorKind::PermissionDenied => PlatformError::PermissionDenied {
                    operation: format!("execute {}", cmd.program()),
                    message: e.to_string(),
                },
                _ => PlatformError::ProcessExecutionFailed {
                    command: cmd.program().to_string(),
                    message: e.to_string(),
                },
            });

        let duration = start.elapsed();
        match &result {
            Ok(output) => emit_process_completed(ctx, &descriptor, output, duration),
            Err(e) => emit_process_failed(ctx, &descriptor, e, duration),
        }

        result.map_err(Error::from)
    }

    async fn which(&self, program: &str) -> Result<PathBuf, Error> {
        let not_found = || {
            Error::from(PlatformError::CommandNotFound {
                command: program.to_string(),
            })
        };

        if program.contains('/') {
            let path = Path::new(program);
            return if is_executable(path).await {
                Ok(path.to_path_buf())
            } else {
                Err(not_found())
            };
        }

        let search = std::env::var_os("PATH").ok_or_else(not_found)?;
        for dir in std::env::split_paths(&search) {
            let candidate = dir.join(program);
            if is_executable(&candidate).await {
                return Ok(candidate);
            }
        }
        Err(not_found())
    }
}

async fn is_executable(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        #[cfg(unix)]
        Ok(meta) => {
            use std::os::unix::fs::PermissionsExt;
            meta.is_file() && meta.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}
