#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in dsu
//!
//! Library crates never print: everything user-visible (connection state,
//! operation progress, script generation) travels as an [`EventMessage`]
//! through an unbounded channel owned by the front-end.
//!
//! ## Architecture
//!
//! - **Domain-driven events**: Events grouped by functional domain (Broker, Install, ...)
//! - **Unified `EventEmitter` trait**: Single, consistent API for all event emissions
//! - **Metadata envelope**: every event carries an [`EventMeta`] with level and source

pub mod meta;
pub use meta::{EventLevel, EventMeta, EventSource};

pub mod events;
pub use events::{
    AppEvent, BrokerEvent, FailureContext, GeneralEvent, InstallEvent, PlatformEvent,
    ProgressEvent, ScriptEvent,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Event plus the metadata captured at emission time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub meta: EventMeta,
    pub event: AppEvent,
}

impl EventMessage {
    #[must_use]
    pub fn new(meta: EventMeta, event: AppEvent) -> Self {
        Self { meta, event }
    }

    /// Wrap an event with metadata derived from the event itself
    #[must_use]
    pub fn from_event(event: AppEvent) -> Self {
        let meta = EventMeta::new(event.log_level(), event.event_source());
        Self { meta, event }
    }
}

/// Type alias for the event sender
pub type EventSender = UnboundedSender<EventMessage>;

/// Type alias for the event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EventMessage>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout the dsu system
///
/// This trait provides a single, consistent API for emitting events regardless of
/// whether you have a raw `EventSender` or a struct that contains one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Correlation id stamped on every emitted event (session id, etc.)
    fn correlation_id(&self) -> Option<String> {
        None
    }

    /// Emit an event with explicit metadata
    fn emit_with_meta(&self, meta: EventMeta, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(EventMessage::new(meta, event));
        }
    }

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        let mut meta = EventMeta::new(event.log_level(), event.event_source());
        if let Some(correlation) = self.correlation_id() {
            meta = meta.with_correlation_id(correlation);
        }
        self.emit_with_meta(meta, event);
    }

    /// Emit a debug log event
    fn emit_debug(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::debug(message)));
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    /// Emit a warning event with context
    fn emit_warning_with_context(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning_with_context(
            message, context,
        )));
    }

    /// Emit an error event
    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }

    /// Emit a progress update for a running operation
    fn emit_progress_updated(
        &self,
        operation: impl Into<String>,
        bytes_done: u64,
        bytes_total: Option<u64>,
    ) {
        self.emit(AppEvent::Progress(ProgressEvent::updated(
            operation,
            bytes_done,
            bytes_total,
        )));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
/// This allows `EventSender` to be used directly where `EventEmitter` is expected
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestEmitter {
        messages: Mutex<Vec<EventMessage>>,
    }

    impl EventEmitter for TestEmitter {
        fn event_sender(&self) -> Option<&EventSender> {
            None
        }

        fn correlation_id(&self) -> Option<String> {
            Some("session-1".to_string())
        }

        fn emit_with_meta(&self, meta: EventMeta, event: AppEvent) {
            let mut guard = self.messages.lock().expect("messages lock poisoned");
            guard.push(EventMessage::new(meta, event));
        }
    }

    #[test]
    fn emit_stamps_correlation_and_level() {
        let emitter = TestEmitter::default();
        emitter.emit_progress_updated("stream-write", 512, None);
        emitter.emit_error("boom");

        let messages = emitter.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].meta.correlation_id.as_deref(), Some("session-1"));
        assert_eq!(messages[0].meta.level, EventLevel::Debug);
        assert_eq!(messages[0].meta.source, EventSource::PROGRESS);
        assert_eq!(messages[1].meta.level, EventLevel::Error);
    }
}
