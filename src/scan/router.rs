//! Result Router.
//!
//! Pure function from a `ScanSnapshot` to one of three renderings. Both
//! result views carry the same affordances and the same disclaimer, but lay
//! out conditions and guidance differently because the shapes differ.

use serde::Serialize;

use super::pipeline::ScanSnapshot;
use super::sharing::GateState;
use super::types::{
    AnalysisResult, ConditionNote, GuidanceItem, ImageResult, InputMode, PipelinePhase,
    QualityVerdict, RiskTier, SkinVerdict, TextResult,
};

pub const MEDICAL_DISCLAIMER: &str = "This analysis is for information only and is not a \
medical diagnosis. Consult a dermatologist about any skin concern.";

const NO_SKIN_HINT: &str = "We couldn't find skin in this photo. Try a closer shot of the area.";

/// Actions offered on every result screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    Share,
    NewScan,
}

const RESULT_AFFORDANCES: [Affordance; 2] = [Affordance::Share, Affordance::NewScan];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ScanView {
    Pipeline(PipelineView),
    ImageResult(ImageResultView),
    TextResult(TextResultView),
}

/// Ingestion, validation and progress screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineView {
    pub phase: PipelinePhase,
    pub mode: InputMode,
    /// Preview of the active image.
    pub preview: Option<String>,
    pub quality: Option<QualityVerdict>,
    pub skin: Option<SkinVerdict>,
    /// Why a photo was judged poor or rejected.
    pub hints: Vec<String>,
    pub warnings: Vec<String>,
    pub symptom_chars: usize,
    pub progress: Option<u8>,
    pub can_analyze: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionRow {
    pub name: String,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResultView {
    pub id: String,
    pub conditions: Vec<ConditionRow>,
    pub risk: RiskTier,
    pub confidence_percent: u8,
    pub notes: Option<String>,
    pub share_gate: GateState,
    pub affordances: Vec<Affordance>,
    pub disclaimer: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextResultView {
    pub id: String,
    pub conditions: Vec<ConditionNote>,
    pub risk: String,
    pub confidence_percent: u8,
    pub guidance: Vec<GuidanceItem>,
    pub share_gate: GateState,
    pub affordances: Vec<Affordance>,
    pub disclaimer: &'static str,
}

pub fn route(snapshot: &ScanSnapshot) -> ScanView {
    match &snapshot.result {
        Some(AnalysisResult::Image(result)) => {
            ScanView::ImageResult(image_view(result, snapshot.share_gate))
        }
        Some(AnalysisResult::Text(result)) => {
            ScanView::TextResult(text_view(result, snapshot.share_gate))
        }
        None => ScanView::Pipeline(pipeline_view(snapshot)),
    }
}

fn pipeline_view(snapshot: &ScanSnapshot) -> PipelineView {
    let active = match snapshot.mode {
        InputMode::Image => snapshot.image.as_ref(),
        InputMode::Text => None,
    };

    let mut hints = Vec::new();
    let mut warnings = Vec::new();
    if let Some(image) = active {
        if let Some(report) = &image.quality_report {
            hints.extend(report.issues.iter().map(|issue| issue.hint().to_string()));
        }
        if image.skin == SkinVerdict::Absent {
            hints.push(NO_SKIN_HINT.to_string());
        }
        warnings.extend(image.skin_warning.clone());
    }

    PipelineView {
        phase: snapshot.phase,
        mode: snapshot.mode,
        preview: active.map(|image| image.preview.clone()),
        quality: active.map(|image| image.quality),
        skin: active.map(|image| image.skin),
        hints,
        warnings,
        symptom_chars: snapshot.symptoms.trim().chars().count(),
        progress: snapshot.progress,
        can_analyze: snapshot.can_analyze,
    }
}

fn image_view(result: &ImageResult, share_gate: GateState) -> ImageResultView {
    ImageResultView {
        id: result.id.clone(),
        conditions: result
            .conditions
            .iter()
            .map(|c| ConditionRow {
                name: c.name.clone(),
                percent: as_percent(c.confidence),
            })
            .collect(),
        risk: result.risk,
        confidence_percent: as_percent(result.confidence),
        notes: Some(result.notes.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        share_gate,
        affordances: RESULT_AFFORDANCES.to_vec(),
        disclaimer: MEDICAL_DISCLAIMER,
    }
}

fn text_view(result: &TextResult, share_gate: GateState) -> TextResultView {
    TextResultView {
        id: result.id.clone(),
        conditions: result.conditions.clone(),
        risk: result.risk.clone(),
        confidence_percent: as_percent(result.confidence),
        guidance: result.guidance.clone(),
        share_gate,
        affordances: RESULT_AFFORDANCES.to_vec(),
        disclaimer: MEDICAL_DISCLAIMER,
    }
}

fn as_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}
