//! dsu - Dynamic system update installer
//!
//! CLI front-end over the installer crates: derives the operation sequence
//! for an image, writes installation scripts, and installs through the
//! privileged executor.

mod cli;
mod display;
mod error;
mod events;
mod logging;
mod setup;

use crate::cli::{Cli, Commands};
use crate::display::{CommandResult, OutputRenderer};
use crate::error::CliError;
use crate::events::EventHandler;
use crate::setup::SystemSetup;
use clap::Parser;
use dsu_config::Config;
use dsu_errors::{InstallError, UserFacingError};
use dsu_events::{AppEvent, EventEmitter, EventReceiver, EventSender, ScriptEvent};
use dsu_install::{CancellationToken, InstallContext};
use dsu_platform::{PlatformCommand, PlatformContext, ProcessOperations, SystemProcessOperations};
use dsu_session::{derive_operation_sequence, Preferences};
use dsu_types::{ColorChoice, OutputFormat};
use std::path::Path;
use std::process;
use tokio::select;
use tracing::{error, info};

/// Exit code after an interrupted installation
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    logging::init_tracing(json_mode, cli.global.debug);

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            process::exit(1);
        }
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<i32, CliError> {
    info!("Starting dsu v{}", env!("CARGO_PKG_VERSION"));

    // file (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);
    config.validate()?;

    let json_output = cli.global.json || config.general.default_output == OutputFormat::Json;
    let (event_sender, event_receiver) = dsu_events::channel();
    let setup = SystemSetup::new(config.clone(), event_sender.clone());

    let renderer = OutputRenderer::new(json_output, config.general.color);
    let colors_enabled = match config.general.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stderr().features().colors_supported(),
    };
    let mut event_handler =
        EventHandler::new(colors_enabled, cli.global.debug).quiet(json_output);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let command = execute_command(cli.command, &setup, cancel, event_sender);
    let result = run_with_events(command, event_receiver, &mut event_handler).await?;

    renderer.render_result(&result)?;

    info!("Command completed");
    Ok(if result.was_cancelled() {
        EXIT_CANCELLED
    } else {
        0
    })
}

/// Drive a command while rendering its events as they arrive
async fn run_with_events<F>(
    command: F,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<CommandResult, CliError>
where
    F: std::future::Future<Output = Result<CommandResult, CliError>>,
{
    let mut command_future = Box::pin(command);

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            event = event_receiver.recv() => {
                if let Some(event) = event {
                    event_handler.handle_event(event);
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    setup: &SystemSetup,
    cancel: CancellationToken,
    event_sender: EventSender,
) -> Result<CommandResult, CliError> {
    match command {
        Commands::Plan { image } => {
            let session = setup.session(&image, &[])?;
            let sequence = derive_operation_sequence(session.parameters(), session.preferences());
            Ok(CommandResult::Plan(sequence))
        }

        Commands::Script {
            image,
            output,
            exec,
        } => {
            let session = setup.session(&image, &[])?;
            let output = output.unwrap_or_else(|| setup.config().script_path());
            let ctx = InstallContext::new().with_event_sender(event_sender.clone());

            let report = {
                let attempt = session.begin_attempt()?;
                setup
                    .installer(None)
                    .script_generator(&ctx)
                    .generate(&attempt, &output)
                    .await?
            };

            let exit_code = if exec {
                Some(run_script(setup.config(), &report.path, event_sender).await?)
            } else {
                None
            };
            Ok(CommandResult::Script { report, exit_code })
        }

        Commands::Install {
            image,
            image_root,
            script_fallback,
        } => {
            let extra: &[(&str, &str)] = if script_fallback {
                &[(Preferences::SCRIPT_FALLBACK, "true")]
            } else {
                &[]
            };
            let session = setup.session(&image, extra)?;
            let ctx = InstallContext::new()
                .with_cancel(cancel)
                .with_event_sender(event_sender);

            let outcome = setup.installer(image_root).install(&session, &ctx).await?;
            Ok(CommandResult::Install(outcome))
        }
    }
}

/// Run a generated script with the configured shell
async fn run_script(
    config: &Config,
    path: &Path,
    event_sender: EventSender,
) -> Result<i32, CliError> {
    let ctx = PlatformContext::new(Some(event_sender));
    let shell = config.script.shell.clone();
    ctx.emit(AppEvent::Script(ScriptEvent::ExecutionStarted {
        path: path.to_path_buf(),
        shell: shell.clone(),
    }));

    let command = PlatformCommand::new(shell).arg(path.display().to_string());
    let output = match SystemProcessOperations::new()
        .execute_command(&ctx, command)
        .await
    {
        Ok(output) => output,
        Err(e) => {
            ctx.emit(AppEvent::Script(ScriptEvent::ExecutionFailed {
                path: path.to_path_buf(),
                message: e.user_message().into_owned(),
            }));
            return Err(e.into());
        }
    };

    let code = output.status.code();
    if output.success() {
        let exit_code = code.unwrap_or_default();
        ctx.emit(AppEvent::Script(ScriptEvent::ExecutionCompleted {
            path: path.to_path_buf(),
            exit_code,
        }));
        return Ok(exit_code);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    ctx.emit(AppEvent::Script(ScriptEvent::ExecutionFailed {
        path: path.to_path_buf(),
        message: stderr.trim().to_string(),
    }));
    Err(dsu_errors::Error::from(InstallError::ScriptFailed {
        path: path.display().to_string(),
        code,
    })
    .into())
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs) {
    if let Some(color) = global.color {
        config.general.color = color;
    }
    if global.json {
        config.general.default_output = OutputFormat::Json;
    }
}
