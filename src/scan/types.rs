use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quality::QualityReport;

// ═══════════════════════════════════════════════════════════
// Input
// ═══════════════════════════════════════════════════════════

/// Which input participates in dispatch.
///
/// Switching modes keeps the other input's last value around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Image,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityVerdict {
    Pending,
    Good,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinVerdict {
    Pending,
    Present,
    Absent,
}

/// A size-bounded, upload-ready image produced by the normalizer.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    /// Media type of `bytes` (`image/jpeg` or `image/png`).
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl NormalizedImage {
    /// File extension matching `media_type`, used for multipart file names.
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/png" => "png",
            _ => "jpg",
        }
    }
}

impl fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedImage")
            .field("bytes", &self.bytes.len())
            .field("media_type", &self.media_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// The currently attached image and its two pre-validation verdicts.
///
/// Replaced wholesale when a new file is chosen. The `id` lets late
/// validator results detect that they belong to a superseded attachment.
#[derive(Debug, Clone, Serialize)]
pub struct ImageAttachment {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub attached_at: DateTime<Utc>,
    #[serde(skip)]
    pub image: Arc<NormalizedImage>,
    /// `data:` URI of the normalized payload.
    #[serde(skip)]
    pub preview: String,
    pub quality: QualityVerdict,
    pub quality_report: Option<QualityReport>,
    pub skin: SkinVerdict,
    /// Set when the skin classifier call failed; verdict stays `Pending`.
    pub skin_warning: Option<String>,
}

impl ImageAttachment {
    pub fn new(image: NormalizedImage, preview: String, file_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            attached_at: Utc::now(),
            image: Arc::new(image),
            preview,
            quality: QualityVerdict::Pending,
            quality_report: None,
            skin: SkinVerdict::Pending,
            skin_warning: None,
        }
    }

    pub fn is_validating(&self) -> bool {
        self.quality == QualityVerdict::Pending || self.skin == SkinVerdict::Pending
    }

    pub fn is_rejected(&self) -> bool {
        self.quality == QualityVerdict::Poor || self.skin == SkinVerdict::Absent
    }
}

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

/// One dispatch attempt. Exactly one variant is built per trigger press.
#[derive(Debug, Clone)]
pub enum AnalysisRequest {
    Image {
        payload: Arc<NormalizedImage>,
        symptoms: Option<String>,
    },
    Text {
        symptoms: String,
    },
}

impl AnalysisRequest {
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Image { .. } => ResultKind::Image,
            Self::Text { .. } => ResultKind::Text,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Case-insensitive parse of the backend's tier label.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionScore {
    pub name: String,
    /// 0.0 to 1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub id: String,
    /// Sorted by descending confidence.
    pub conditions: Vec<ConditionScore>,
    pub risk: RiskTier,
    pub confidence: f64,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionNote {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceItem {
    pub message: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResult {
    pub id: String,
    pub conditions: Vec<ConditionNote>,
    /// Free text; `"Unknown"` when the backend omits it.
    pub risk: String,
    pub confidence: f64,
    pub guidance: Vec<GuidanceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Image(ImageResult),
    Text(TextResult),
}

impl AnalysisResult {
    pub fn id(&self) -> &str {
        match self {
            Self::Image(r) => &r.id,
            Self::Text(r) => &r.id,
        }
    }

    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Image(_) => ResultKind::Image,
            Self::Text(_) => ResultKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Image,
    Text,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Text => write!(f, "text"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Phase + sharing
// ═══════════════════════════════════════════════════════════

/// Derived from the pipeline state on every read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "result", rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Nothing dispatchable: no input, too-short text, or a rejected image.
    Idle,
    /// Active image with at least one verdict still pending.
    Validating,
    ReadyToAnalyze,
    Analyzing,
    ResultReady(ResultKind),
}

/// Outcome of a confirmed Sharing Gate. Lives for one share action only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SharingDecision {
    pub consent: bool,
    pub acknowledged: bool,
}
