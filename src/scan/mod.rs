//! Scan capture-and-analysis pipeline.
//!
//! Ingestion → pre-validation gating → analysis dispatch → result
//! normalization → consent-gated sharing → reset. `ScanPipeline` owns all
//! mutable state; every other module here is a pure helper or a
//! collaborator seam.

pub mod backend;
pub mod dispatch;
pub mod events;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod result;
pub mod router;
pub mod sharing;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{BackendError, HttpScanBackend, ScanBackend};
pub use events::{ChannelSink, EventSink, NoticeLevel, NullSink, ScanEvent};
pub use normalize::ImageUpload;
pub use pipeline::{DispatchOutcome, ScanPipeline, ScanSnapshot};
pub use router::ScanView;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Unsupported file type: {0}")]
    InputRejected(String),

    #[error("Image could not be processed: {0}")]
    NormalizationFailed(String),

    #[error("Skin check unavailable: {0}")]
    ValidationTransientFailure(String),

    #[error("Analysis request failed: {0}")]
    Dispatch(BackendError),

    #[error("Sharing request failed: {0}")]
    Share(BackendError),

    #[error("Input is not ready for analysis")]
    NotReady,

    #[error("Acknowledgement is required before confirming")]
    AcknowledgementRequired,

    #[error("No analysis result to act on")]
    NoResult,

    #[error("A scan is already in progress or showing a result")]
    Busy,

    #[error("Superseded by a newer selection or a reset")]
    Superseded,

    #[error("Internal lock error")]
    LockPoisoned,
}

impl ScanError {
    /// Short text for a transient, user-visible notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::InputRejected(_) => "Please select an image file (JPEG, PNG, ...).".into(),
            Self::NormalizationFailed(_) => {
                "This image could not be processed. Try another photo.".into()
            }
            Self::ValidationTransientFailure(_) => {
                "We couldn't verify this photo yet. Check your connection and retry.".into()
            }
            Self::Dispatch(_) => "Analysis failed. Please try again.".into(),
            Self::Share(_) => "Sharing failed. Your result is still available.".into(),
            Self::NotReady => "Add a clear photo or describe your symptoms first.".into(),
            Self::AcknowledgementRequired => {
                "Please confirm you understand how your data is used.".into()
            }
            Self::NoResult => "There is no result to share yet.".into(),
            Self::Busy => "Finish or start a new scan first.".into(),
            Self::Superseded => "A newer photo replaced this one.".into(),
            Self::LockPoisoned => "Something went wrong. Please start a new scan.".into(),
        }
    }

    /// Whether repeating the same action can succeed without new input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationTransientFailure(_) | Self::Dispatch(_) | Self::Share(_)
        )
    }
}
