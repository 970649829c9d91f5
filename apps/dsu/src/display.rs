//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use dsu_install::{InstallOutcome, InstallReport, ScriptReport};
use dsu_session::{OperationKind, OperationSequence};
use dsu_types::{ColorChoice, ImageSize};
use serde::Serialize;
use std::io;

/// Final result of a CLI command
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Plan(OperationSequence),
    Script {
        #[serde(flatten)]
        report: ScriptReport,
        /// Exit code when the script was also run
        exit_code: Option<i32>,
    },
    Install(InstallOutcome),
}

impl CommandResult {
    /// Serialize the result for `--json` output
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self, Self::Install(InstallOutcome::Cancelled { .. }))
    }
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    pub fn render_result(&self, result: &CommandResult) -> io::Result<()> {
        if self.json_output {
            let json = result.to_json().map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        match result {
            CommandResult::Plan(sequence) => self.render_plan(sequence),
            CommandResult::Script { report, exit_code } => {
                self.render_script_report(report, *exit_code)
            }
            CommandResult::Install(InstallOutcome::Installed(report)) => {
                self.render_install_report(report)
            }
            CommandResult::Install(InstallOutcome::Script(report)) => {
                println!("The privileged executor was not usable; a script was written instead.");
                println!();
                self.render_script_report(report, None)
            }
            CommandResult::Install(InstallOutcome::Cancelled { last_completed }) => {
                self.render_cancelled(*last_completed)
            }
        }
    }

    fn render_plan(&self, sequence: &OperationSequence) -> io::Result<()> {
        println!(
            "Partition:   {}",
            self.style_emphasis(sequence.partition().as_str())
        );
        let size = match sequence.image_size() {
            ImageSize::Known(bytes) => format_size(bytes),
            ImageSize::Unknown => "unknown".to_string(),
        };
        println!("Image size:  {size}");
        println!();

        let mut table = self.table(&["#", "Operation", "Detail"]);
        for (index, operation) in sequence.iter().enumerate() {
            table.add_row(vec![
                Cell::new(index + 1),
                Cell::new(operation.kind().as_str()),
                Cell::new(operation.to_string()),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    fn render_script_report(&self, report: &ScriptReport, exit_code: Option<i32>) -> io::Result<()> {
        println!(
            "Script:      {}",
            self.style_emphasis(&report.path.display().to_string())
        );
        if let Some(code) = exit_code {
            println!("Exit code:   {code}");
        }
        println!();

        let mut table = self.table(&["Operation", "Command"]);
        for command in &report.commands {
            table.add_row(vec![
                Cell::new(command.operation.kind().as_str()),
                Cell::new(&command.line),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    fn render_install_report(&self, report: &InstallReport) -> io::Result<()> {
        println!("Installation Summary");
        println!();
        println!("Partition:   {}", self.style_emphasis(&report.partition));
        println!("Written:     {}", format_size(report.bytes_written));
        println!("Session:     {}", report.session_id);
        println!();

        let mut table = self.table(&["#", "Operation", "Duration"]);
        for record in &report.operations {
            table.add_row(vec![
                Cell::new(record.index + 1),
                Cell::new(record.kind.as_str()).fg(Color::Green),
                Cell::new(format!("{}ms", record.duration.as_millis())),
            ]);
        }
        println!("{table}");
        println!("Completed in {}ms", report.duration.as_millis());
        Ok(())
    }

    fn render_cancelled(&self, last_completed: Option<OperationKind>) -> io::Result<()> {
        println!("Installation cancelled.");
        match last_completed {
            Some(kind) => println!(
                "Operations up to '{}' were applied and remain in place.",
                kind.as_str()
            ),
            None => println!("No operation was applied."),
        }
        Ok(())
    }

    fn table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(
            headers
                .iter()
                .map(|header| Cell::new(header).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
        if !self.supports_color() {
            table.force_no_tty();
        }
        table
    }

    fn style_emphasis(&self, text: &str) -> String {
        if self.supports_color() {
            Style::new().bold().apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Check if color output is supported
    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

/// Human-readable byte count
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{size:.0} {}", UNITS[unit_index])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(4 * 1024 * 1024 * 1024), "4.0 GB");
    }
}
