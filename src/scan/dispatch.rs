//! Analysis Dispatcher.
//!
//! Builds exactly one `AnalysisRequest` per trigger press, chosen solely by
//! whether an image is active, sends it to the matching endpoint, and
//! normalizes the response.

use tracing::info;

use super::backend::{BackendError, ScanBackend};
use super::result::{normalize_image_response, normalize_text_response};
use super::types::{AnalysisRequest, AnalysisResult, ImageAttachment, QualityVerdict, SkinVerdict};

/// Trigger gate for the "Start Analysis" button, excluding the in-flight
/// check which only the pipeline knows about.
///
/// Pending verdicts are advisory. A resolved `Poor`/`Absent`, or a skin
/// check that failed in transport, disables the image path.
pub fn input_ready(image: Option<&ImageAttachment>, symptoms: &str, min_chars: usize) -> bool {
    match image {
        Some(attachment) => {
            attachment.quality != QualityVerdict::Poor
                && attachment.skin != SkinVerdict::Absent
                && attachment.skin_warning.is_none()
        }
        None => symptom_chars(symptoms) >= min_chars,
    }
}

/// Character count of the trimmed symptom text.
pub fn symptom_chars(symptoms: &str) -> usize {
    symptoms.trim().chars().count()
}

/// Build the one request for this dispatch. Image presence decides the variant.
pub fn build_request(image: Option<&ImageAttachment>, symptoms: &str) -> AnalysisRequest {
    let trimmed = symptoms.trim();
    match image {
        Some(attachment) => AnalysisRequest::Image {
            payload: attachment.image.clone(),
            symptoms: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        },
        None => AnalysisRequest::Text {
            symptoms: trimmed.to_string(),
        },
    }
}

/// Send `request` to its endpoint and normalize the response shape.
pub async fn dispatch(
    backend: &dyn ScanBackend,
    request: AnalysisRequest,
    user_id: Option<String>,
    consent: bool,
) -> Result<AnalysisResult, BackendError> {
    match request {
        AnalysisRequest::Image { payload, symptoms } => {
            info!(
                bytes = payload.bytes.len(),
                with_symptoms = symptoms.is_some(),
                "Dispatching image analysis"
            );
            let resp = backend.analyze_image(payload, symptoms, user_id).await?;
            normalize_image_response(resp).map(AnalysisResult::Image)
        }
        AnalysisRequest::Text { symptoms } => {
            info!(chars = symptom_chars(&symptoms), "Dispatching text analysis");
            let resp = backend.analyze_text(symptoms, consent).await?;
            normalize_text_response(resp).map(AnalysisResult::Text)
        }
    }
}
