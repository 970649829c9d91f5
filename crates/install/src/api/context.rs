use dsu_events::EventSender;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Per-call installation context
#[derive(Clone, Debug)]
pub struct InstallContext {
    /// Where the script goes when the script path is taken
    pub output: Option<PathBuf>,
    /// Generate a script even if the privileged executor is usable
    pub force_script: bool,
    /// Cancels a running privileged install at the next operation or chunk
    pub cancel: CancellationToken,

    /// Event sender for progress reporting
    pub event_sender: Option<EventSender>,
}

context_builder! {
    InstallContext {
        output: Option<PathBuf>,
        force_script: bool,
        cancel: CancellationToken,
    }
}
