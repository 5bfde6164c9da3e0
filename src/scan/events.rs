//! Events emitted by the scan pipeline for UI integration.
//!
//! The pipeline never renders anything itself. Every state change is pushed
//! through an `EventSink`; notices are the transient toasts of the UI.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::types::{InputMode, QualityVerdict, ResultKind, SkinVerdict};
use super::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    InputChanged {
        mode: InputMode,
        has_image: bool,
        symptom_chars: usize,
    },
    ImageAttached {
        attachment_id: Uuid,
        width: u32,
        height: u32,
    },
    QualityResolved {
        attachment_id: Uuid,
        verdict: QualityVerdict,
    },
    SkinResolved {
        attachment_id: Uuid,
        verdict: SkinVerdict,
    },
    AnalysisStarted {
        generation: u64,
        kind: ResultKind,
    },
    Progress {
        generation: u64,
        percent: u8,
    },
    ResultReady {
        generation: u64,
        kind: ResultKind,
        result_id: String,
    },
    Reset {
        generation: u64,
    },
    Shared {
        result_id: String,
        consent: bool,
    },
    Notice {
        level: NoticeLevel,
        message: String,
        retryable: bool,
    },
}

impl ScanEvent {
    /// Toast for a recoverable pipeline error.
    pub fn notice_for(err: &ScanError) -> Self {
        let level = match err {
            ScanError::ValidationTransientFailure(_) | ScanError::Share(_) => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        Self::Notice {
            level,
            message: err.user_message(),
            retryable: err.is_retryable(),
        }
    }
}

/// Receives pipeline events. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

/// Discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Forwards events over an unbounded tokio channel.
pub struct ChannelSink {
    tx: UnboundedSender<ScanEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ScanEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ScanEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Scan event dropped: receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::BackendError;

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(ScanEvent::Reset { generation: 3 });
        assert_eq!(rx.recv().await, Some(ScanEvent::Reset { generation: 3 }));
    }

    #[test]
    fn channel_sink_tolerates_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelSink::new(tx).emit(ScanEvent::Reset { generation: 1 });
    }

    #[test]
    fn share_failure_is_a_warning() {
        let event = ScanEvent::notice_for(&ScanError::Share(BackendError::Timeout));
        match event {
            ScanEvent::Notice { level, retryable, .. } => {
                assert_eq!(level, NoticeLevel::Warning);
                assert!(retryable);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&ScanEvent::Progress {
            generation: 2,
            percent: 41,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"progress","generation":2,"percent":41}"#);
    }
}
