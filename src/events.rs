//! Wizard event types for notifying a front-end of progress.
//!
//! The validator, submitter and organizer never draw anything themselves;
//! they emit these events and the front-end (terminal, GUI, test) decides
//! how to render a progress bar, status line or result row.

use crate::models::ValidationResult;
use crate::submitter::GroupOption;
use crate::wizard::WizardStep;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WizardEvent {
    ValidationStarted {
        total: usize,
        batches: usize,
    },
    /// A chunk request is about to be sent. `start` is 1-based, `end` inclusive.
    ChunkStarted {
        start: usize,
        end: usize,
        total: usize,
    },
    ResultReceived {
        result: ValidationResult,
    },
    ProgressUpdated {
        processed: usize,
        total: usize,
        percent: u8,
    },
    CountsUpdated {
        valid: usize,
        invalid: usize,
    },
    ValidationFinished {
        total: usize,
        valid: usize,
        invalid: usize,
        can_proceed: bool,
    },
    ValidationCancelled {
        processed: usize,
        total: usize,
    },
    ValidationFailed {
        message: String,
    },
    StepChanged {
        from: WizardStep,
        to: WizardStep,
    },
    ImportCompleted {
        message: String,
    },
    GroupsRefreshed {
        groups: Vec<GroupOption>,
    },
    OrganizeProgress {
        percent: u8,
        status: String,
        hint: String,
    },
}

impl WizardEvent {
    /// One-line status text, for events that change it
    pub fn status_text(&self) -> Option<String> {
        match self {
            Self::ValidationStarted { total, .. } => Some(format!("Validating {} stock codes...", total)),
            Self::ChunkStarted { start, end, total } => {
                Some(format!("Validating {} to {} of {}", start, end, total))
            }
            Self::ValidationFinished { total, .. } => {
                Some(format!("Validation complete, {} stock codes", total))
            }
            Self::ValidationCancelled { .. } => Some("Validation cancelled".to_string()),
            Self::ValidationFailed { message } => Some(format!("Validation failed: {}", message)),
            Self::OrganizeProgress { status, .. } => Some(status.clone()),
            _ => None,
        }
    }
}

/// Receiver of wizard events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WizardEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: WizardEvent) {}
}

impl<F> EventSink for F
where
    F: Fn(WizardEvent) + Send + Sync,
{
    fn emit(&self, event: WizardEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<WizardEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<WizardEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: WizardEvent) {
        if let Err(e) = self.tx.send(event) {
            log::warn!("Failed to emit wizard event: receiver dropped ({:?})", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_status_text() {
        let event = WizardEvent::ChunkStarted { start: 11, end: 20, total: 25 };
        assert_eq!(event.status_text().as_deref(), Some("Validating 11 to 20 of 25"));
        assert!(WizardEvent::CountsUpdated { valid: 1, invalid: 0 }.status_text().is_none());
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(WizardEvent::CountsUpdated { valid: 2, invalid: 1 });
        assert_eq!(rx.try_recv().unwrap(), WizardEvent::CountsUpdated { valid: 2, invalid: 1 });
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelSink::new(tx).emit(WizardEvent::ValidationCancelled { processed: 0, total: 3 });
    }

    #[test]
    fn test_serialized_tag() {
        let value = serde_json::to_value(WizardEvent::ProgressUpdated { processed: 5, total: 10, percent: 50 })
            .unwrap();
        assert_eq!(value["kind"], "progressUpdated");
        assert_eq!(value["percent"], 50);
    }
}
