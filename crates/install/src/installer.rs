//! Main installer implementation

use dsu_broker::{BrokerError, PrivilegedBroker};
use dsu_errors::Error;
use dsu_events::{AppEvent, EventEmitter, InstallEvent};
use dsu_session::{Attempt, Session};
use dsu_types::InstallMode;
use std::sync::Arc;
use std::time::Instant;

use crate::api::result::{ExecutionOutcome, InstallOutcome, ScriptReport};
use crate::emit::SessionEmitter;
use crate::executor::PrivilegedInstaller;
use crate::script::{CommandRenderer, GsiToolRenderer, ScriptGenerator};
use crate::{InstallConfig, InstallContext};

/// Chooses between the privileged path and the script path for a session
#[derive(Clone)]
pub struct Installer {
    config: InstallConfig,
    broker: PrivilegedBroker,
    renderer: Arc<dyn CommandRenderer>,
}

impl Installer {
    #[must_use]
    pub fn new(config: InstallConfig, broker: PrivilegedBroker) -> Self {
        let renderer = Arc::new(GsiToolRenderer::new(config.script_tool.clone()));
        Self {
            config,
            broker,
            renderer,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn CommandRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    #[must_use]
    pub fn broker(&self) -> &PrivilegedBroker {
        &self.broker
    }

    /// Script generator configured from this installer
    #[must_use]
    pub fn script_generator(&self, ctx: &InstallContext) -> ScriptGenerator {
        let generator = ScriptGenerator::new(Arc::clone(&self.renderer))
            .with_shell(self.config.script_shell.clone());
        match &ctx.event_sender {
            Some(sender) => generator.with_event_sender(sender.clone()),
            None => generator,
        }
    }

    /// Privileged executor configured from this installer
    #[must_use]
    pub fn executor(&self, ctx: &InstallContext) -> PrivilegedInstaller {
        let executor =
            PrivilegedInstaller::new(self.config.chunk_size).with_cancellation(ctx.cancel.clone());
        match &ctx.event_sender {
            Some(sender) => executor.with_event_sender(sender.clone()),
            None => executor,
        }
    }

    /// Install the session's image
    ///
    /// The script path is taken when forced by the context or the
    /// `force_script_only` preference, or when the executor turns out to be
    /// unprivileged and `script_fallback` is set.
    ///
    /// # Errors
    ///
    /// - `PlanError::AttemptInProgress` if the session is busy.
    /// - Broker errors while acquiring the connection, including
    ///   `BrokerError::NotPrivileged` without `script_fallback`.
    /// - Executor and script generator errors.
    pub async fn install(
        &self,
        session: &Session,
        ctx: &InstallContext,
    ) -> Result<InstallOutcome, Error> {
        let attempt = session.begin_attempt()?;
        let emitter = SessionEmitter::new(ctx.event_sender.as_ref(), attempt.session_id());

        if ctx.force_script || attempt.preferences().force_script_only() {
            tracing::debug!(session = %attempt.session_id(), "script path forced");
            return self
                .generate_script(&attempt, ctx)
                .await
                .map(InstallOutcome::Script);
        }

        let lease = tokio::select! {
            lease = self.broker.acquire() => lease?,
            () = ctx.cancel.cancelled() => {
                let partition = attempt.sequence().partition().to_string();
                tracing::debug!(%partition, "cancelled while waiting for the privileged executor");
                emitter.emit(AppEvent::Install(InstallEvent::Cancelled {
                    partition,
                    last_completed: None,
                }));
                return Ok(InstallOutcome::Cancelled {
                    last_completed: None,
                });
            }
        };
        let identity = lease.identity();
        if !identity.is_privileged() {
            if !attempt.preferences().script_fallback() {
                return Err(BrokerError::NotPrivileged { uid: identity.uid }.into());
            }
            drop(lease);
            emitter.emit_warning_with_context(
                "privileged executor lacks root; generating an installation script instead",
                identity.to_string(),
            );
            return self
                .generate_script(&attempt, ctx)
                .await
                .map(InstallOutcome::Script);
        }

        let outcome = self.executor(ctx).execute(&attempt, &lease).await?;
        Ok(match outcome {
            ExecutionOutcome::Completed(report) => InstallOutcome::Installed(report),
            ExecutionOutcome::Cancelled { last_completed } => {
                InstallOutcome::Cancelled { last_completed }
            }
        })
    }

    async fn generate_script(
        &self,
        attempt: &Attempt<'_>,
        ctx: &InstallContext,
    ) -> Result<ScriptReport, Error> {
        let emitter = SessionEmitter::new(ctx.event_sender.as_ref(), attempt.session_id());
        let partition = attempt.sequence().partition().to_string();
        let output = ctx
            .output
            .clone()
            .unwrap_or_else(|| self.config.script_path.clone());

        emitter.emit(AppEvent::Install(InstallEvent::Started {
            partition: partition.clone(),
            mode: InstallMode::Script,
            operations: attempt.sequence().len(),
        }));
        let started = Instant::now();

        let report = self
            .script_generator(ctx)
            .generate(attempt, &output)
            .await?;

        emitter.emit(AppEvent::Install(InstallEvent::Completed {
            partition,
            mode: InstallMode::Script,
            bytes_written: 0,
            duration: started.elapsed(),
        }));
        Ok(report)
    }
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("config", &self.config)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}
