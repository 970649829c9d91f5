//! Component wiring from configuration

use crate::cli::ImageArgs;
use crate::error::CliError;
use dsu_broker::{BrokerSettings, PrivilegedBroker};
use dsu_config::Config;
use dsu_events::EventSender;
use dsu_install::{InstallConfig, Installer};
use dsu_platform::{LocalBinder, LocalPrivilegedService};
use dsu_session::{Preferences, Session};
use dsu_types::InstallationParameters;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Builds sessions and installers for one CLI invocation
pub struct SystemSetup {
    config: Config,
    event_sender: EventSender,
}

impl SystemSetup {
    pub fn new(config: Config, event_sender: EventSender) -> Self {
        Self {
            config,
            event_sender,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session for the image named on the command line, config filling the gaps
    pub fn session(&self, args: &ImageArgs, extra: &[(&str, &str)]) -> Result<Session, CliError> {
        let mut builder = InstallationParameters::builder(&args.image)
            .size(args.size.into())
            .partition(
                args.partition
                    .clone()
                    .unwrap_or_else(|| self.config.install.default_partition.clone()),
            )
            .userdata_size_gib(
                args.userdata
                    .unwrap_or(self.config.install.default_userdata_gib),
            );
        if let Some(codec) = args.codec {
            builder = builder.codec(codec);
        }
        let parameters = builder.build()?;

        let mut preferences: Preferences = args.preferences.iter().cloned().collect();
        if args.no_activate {
            preferences.set(Preferences::FINALIZE_ACTIVATE, "false");
        }
        for (key, value) in extra {
            preferences.set(*key, *value);
        }

        let session = Session::new(parameters, preferences);
        debug!(session = %session.id(), image = %args.image.display(), "session created");
        Ok(session)
    }

    /// Installer bound to the local privileged executor rooted at `image_root`
    pub fn installer(&self, image_root: Option<PathBuf>) -> Installer {
        let root = image_root.unwrap_or_else(|| self.config.image_root());
        debug!(root = %root.display(), "using local privileged executor");

        let service = Arc::new(LocalPrivilegedService::new(root));
        let broker = PrivilegedBroker::with_event_sender(
            BrokerSettings::from(&self.config.broker),
            Arc::new(LocalBinder::new(service)),
            self.event_sender.clone(),
        );
        Installer::new(InstallConfig::from(&self.config), broker)
    }
}
