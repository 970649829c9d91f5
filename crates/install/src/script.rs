//! Installation script generation
//!
//! Renders the same operation sequence the privileged executor issues, one
//! shell command per operation, for execution outside this process.

use dsu_errors::{Error, InstallError, PlanError};
use dsu_events::{AppEvent, EventEmitter, EventSender, ScriptEvent};
use dsu_platform::PlatformCommand;
use dsu_session::{Attempt, Operation, OperationSequence};
use dsu_types::{CompressionCodec, ImageSize, GIB};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use crate::api::result::ScriptReport;
use crate::emit::SessionEmitter;

/// Maps one operation onto one shell command
pub trait CommandRenderer: Send + Sync {
    fn render(&self, operation: &Operation) -> PlatformCommand;
}

/// Renderer for the device-side `gsi_tool` command set
///
/// Image data always reaches `write-partition` on stdin, decompressed on
/// the way when the image is compressed.
#[derive(Debug, Clone)]
pub struct GsiToolRenderer {
    tool: String,
}

impl GsiToolRenderer {
    #[must_use]
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn tool(&self) -> PlatformCommand {
        PlatformCommand::new(&self.tool)
    }
}

impl Default for GsiToolRenderer {
    fn default() -> Self {
        Self::new(dsu_config::ScriptConfig::default().tool)
    }
}

/// Source paths follow `--` so a leading `-` is never read as an option
fn decompressor(codec: CompressionCodec, source: &Path) -> PlatformCommand {
    let command = match codec {
        CompressionCodec::None => PlatformCommand::new("cat"),
        CompressionCodec::Xz => PlatformCommand::new("xz").arg("-dc"),
        CompressionCodec::Gzip => PlatformCommand::new("gzip").arg("-dc"),
        CompressionCodec::Zstd => PlatformCommand::new("zstd").arg("-dc"),
    };
    command.args(["--", &*source.to_string_lossy()])
}

impl CommandRenderer for GsiToolRenderer {
    fn render(&self, operation: &Operation) -> PlatformCommand {
        match operation {
            Operation::AllocateUserdata { size_gib } => self.tool().args([
                "create-userdata".to_string(),
                "--size".to_string(),
                (u64::from(*size_gib) * GIB).to_string(),
            ]),
            Operation::CreatePartition { name, size } => {
                let cmd = self
                    .tool()
                    .args(["create-partition", "--name", name.as_str()]);
                match size {
                    ImageSize::Known(bytes) => cmd.args(["--size".to_string(), bytes.to_string()]),
                    ImageSize::Unknown => cmd,
                }
            }
            Operation::StreamWrite {
                partition,
                source,
                codec,
            } => self
                .tool()
                .args(["write-partition", "--name", partition.as_str()])
                .pipe_from(decompressor(*codec, source)),
            Operation::Finalize {
                partition,
                activate,
            } => {
                let cmd = self.tool().args(["finalize", "--name", partition.as_str()]);
                if *activate {
                    cmd.arg("--activate")
                } else {
                    cmd
                }
            }
        }
    }
}

/// A rendered command and the operation it came from
#[derive(Debug, Clone, Serialize)]
pub struct RenderedCommand {
    pub operation: Operation,
    pub line: String,
    #[serde(skip)]
    pub command: PlatformCommand,
}

/// Writes installation scripts for attempts
#[derive(Clone)]
pub struct ScriptGenerator {
    renderer: Arc<dyn CommandRenderer>,
    shell: String,
    event_sender: Option<EventSender>,
}

impl ScriptGenerator {
    #[must_use]
    pub fn new(renderer: Arc<dyn CommandRenderer>) -> Self {
        Self {
            renderer,
            shell: dsu_config::fixed_paths::DEFAULT_SHELL.to_string(),
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    #[must_use]
    pub fn render(&self, sequence: &OperationSequence) -> Vec<RenderedCommand> {
        sequence
            .iter()
            .map(|operation| {
                let command = self.renderer.render(operation);
                RenderedCommand {
                    operation: operation.clone(),
                    line: command.to_shell_line(),
                    command,
                }
            })
            .collect()
    }

    /// Full script text: shebang, `set -e`, one line per operation
    #[must_use]
    pub fn script_text(&self, sequence: &OperationSequence) -> String {
        let mut text = format!("#!{}\n", self.shell);
        let _ = writeln!(
            text,
            "# dynamic system update: partition {}, {} operations",
            sequence.partition(),
            sequence.len()
        );
        text.push_str("set -e\n");
        for rendered in self.render(sequence) {
            text.push_str(&rendered.line);
            text.push('\n');
        }
        text
    }

    /// Write the script for `attempt` to `output` and record it on the session
    ///
    /// # Errors
    ///
    /// - `PlanError::ScriptPathAlreadyRecorded` if the session already has a
    ///   script; nothing is written.
    /// - `InstallError::ScriptWrite` if the file cannot be written.
    pub async fn generate(
        &self,
        attempt: &Attempt<'_>,
        output: &Path,
    ) -> Result<ScriptReport, Error> {
        let session = attempt.session();
        if let Some(existing) = session.installation_script_path() {
            return Err(PlanError::ScriptPathAlreadyRecorded {
                path: existing.display().to_string(),
            }
            .into());
        }

        let sequence = attempt.sequence();
        let commands = self.render(sequence);
        let text = self.script_text(sequence);
        write_script(output, &text).await?;
        session.record_script_path(output)?;

        tracing::debug!(path = %output.display(), commands = commands.len(), "installation script written");
        SessionEmitter::new(self.event_sender.as_ref(), attempt.session_id()).emit(
            AppEvent::Script(ScriptEvent::Generated {
                path: output.to_path_buf(),
                commands: commands.len(),
            }),
        );

        Ok(ScriptReport {
            path: output.to_path_buf(),
            commands,
        })
    }
}

impl std::fmt::Debug for ScriptGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptGenerator")
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

async fn write_script(output: &Path, text: &str) -> Result<(), Error> {
    let write_error = |e: &std::io::Error| -> Error {
        InstallError::ScriptWrite {
            path: output.display().to_string(),
            message: e.to_string(),
        }
        .into()
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_error(&e))?;
    }
    tokio::fs::write(output, text)
        .await
        .map_err(|e| write_error(&e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(output, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| write_error(&e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsu_session::{Preferences, Session};
    use dsu_types::InstallationParameters;

    fn session(image: &str, size: Option<u64>, prefs: Preferences) -> Session {
        let params = InstallationParameters::builder(image)
            .partition("dsu")
            .userdata_size_gib(2)
            .size(size.into())
            .build()
            .unwrap();
        Session::new(params, prefs)
    }

    #[test]
    fn xz_image_of_unknown_size() {
        let session = session("/sdcard/system.img.xz", None, Preferences::new());
        let attempt = session.begin_attempt().unwrap();
        let generator = ScriptGenerator::new(Arc::new(GsiToolRenderer::new("gsi_tool")));

        let lines: Vec<String> = generator
            .render(attempt.sequence())
            .into_iter()
            .map(|rendered| rendered.line)
            .collect();
        assert_eq!(
            lines,
            vec![
                "gsi_tool create-userdata --size 2147483648",
                "gsi_tool create-partition --name dsu",
                "xz -dc -- /sdcard/system.img.xz | gsi_tool write-partition --name dsu",
                "gsi_tool finalize --name dsu --activate",
            ]
        );
    }

    #[test]
    fn known_size_and_no_activation() {
        let prefs = Preferences::new().with(Preferences::FINALIZE_ACTIVATE, "false");
        let session = session("/sdcard/my system.img", Some(4096), prefs);
        let attempt = session.begin_attempt().unwrap();
        let generator = ScriptGenerator::new(Arc::new(GsiToolRenderer::default()));

        let rendered = generator.render(attempt.sequence());
        assert_eq!(rendered[1].line, "gsi_tool create-partition --name dsu --size 4096");
        assert_eq!(
            rendered[2].line,
            "cat -- '/sdcard/my system.img' | gsi_tool write-partition --name dsu"
        );
        assert_eq!(rendered[3].line, "gsi_tool finalize --name dsu");

        let text = generator.with_shell("/bin/sh").script_text(attempt.sequence());
        assert!(text.starts_with("#!/bin/sh\n"));
        assert!(text.contains("\nset -e\n"));
        assert_eq!(text.lines().count(), 3 + 4);
    }
}
