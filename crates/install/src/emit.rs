use dsu_events::{EventEmitter, EventSender};

/// Emitter stamping events with the id of the session being installed
pub(crate) struct SessionEmitter<'a> {
    sender: Option<&'a EventSender>,
    correlation: String,
}

impl<'a> SessionEmitter<'a> {
    pub(crate) fn new(sender: Option<&'a EventSender>, session_id: uuid::Uuid) -> Self {
        Self {
            sender,
            correlation: session_id.to_string(),
        }
    }
}

impl EventEmitter for SessionEmitter<'_> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.sender
    }

    fn correlation_id(&self) -> Option<String> {
        Some(self.correlation.clone())
    }
}
