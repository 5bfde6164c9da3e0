//! Backend response shapes and their normalization into `AnalysisResult`.
//!
//! The two analysis endpoints return structurally different payloads. Each
//! gets exactly one normalization function so the renderer only ever sees
//! `ImageResult` or `TextResult`, never optional-field soup.

use serde::Deserialize;
use serde_json::Value;

use super::backend::BackendError;
use super::types::{
    ConditionNote, ConditionScore, GuidanceItem, ImageResult, RiskTier, SkinVerdict, TextResult,
};

/// Message the classifier returns when it sees no skin condition.
const NO_CONDITION_MESSAGE: &str = "no skin condition detected";

pub const DEFAULT_GUIDANCE: &str = "No specific guidance available";
pub const DEFAULT_TEXT_RISK: &str = "Unknown";

// ═══════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════

/// Skin-presence classifier response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkinCheckResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conditions: Option<Vec<Value>>,
}

impl SkinCheckResponse {
    /// Empty conditions or the explicit "no condition" message mean `Absent`.
    pub fn verdict(&self) -> SkinVerdict {
        let says_none = self
            .message
            .as_deref()
            .map(|m| m.to_ascii_lowercase().contains(NO_CONDITION_MESSAGE))
            .unwrap_or(false);
        let has_conditions = self
            .conditions
            .as_ref()
            .map(|c| !c.is_empty())
            .unwrap_or(false);

        if says_none || !has_conditions {
            SkinVerdict::Absent
        } else {
            SkinVerdict::Present
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCondition {
    #[serde(alias = "condition")]
    pub name: String,
    pub confidence: f64,
}

/// Image analysis endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageAnalysisResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub conditions: Vec<WireCondition>,
    #[serde(alias = "risk_tier")]
    pub risk_level: String,
    pub confidence: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextAnalysisBody {
    #[serde(default)]
    pub conditions: Option<Vec<String>>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub guidance: Option<String>,
}

/// Text analysis endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TextAnalysisResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub analysis: TextAnalysisBody,
}

// ═══════════════════════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════════════════════

/// Validate an image-endpoint response and pass it through as `ImageResult`.
///
/// Conditions come out sorted by descending confidence.
pub fn normalize_image_response(resp: ImageAnalysisResponse) -> Result<ImageResult, BackendError> {
    let id = result_id(&resp.id)?;

    let risk = RiskTier::parse(&resp.risk_level).ok_or_else(|| {
        BackendError::InvalidResponse(format!("unknown risk tier {:?}", resp.risk_level))
    })?;

    let confidence = strict_confidence(resp.confidence, "confidence")?;

    let mut conditions = Vec::with_capacity(resp.conditions.len());
    for wire in resp.conditions {
        let name = wire.name.trim();
        if name.is_empty() {
            return Err(BackendError::InvalidResponse("condition without a name".into()));
        }
        conditions.push(ConditionScore {
            name: name.to_string(),
            confidence: strict_confidence(wire.confidence, name)?,
        });
    }
    conditions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(ImageResult {
        id,
        conditions,
        risk,
        confidence,
        notes: resp.notes.unwrap_or_default(),
    })
}

/// Lift the looser text-endpoint shape into `TextResult`.
pub fn normalize_text_response(resp: TextAnalysisResponse) -> Result<TextResult, BackendError> {
    let id = result_id(&resp.id)?;
    let body = resp.analysis;

    let conditions = body
        .conditions
        .unwrap_or_default()
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .map(|name| ConditionNote {
            name,
            description: String::new(),
        })
        .collect();

    let guidance_message = body
        .guidance
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| DEFAULT_GUIDANCE.to_string());

    let risk = body
        .risk_level
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_TEXT_RISK.to_string());

    Ok(TextResult {
        id,
        conditions,
        risk,
        confidence: lenient_confidence(body.confidence),
        guidance: vec![GuidanceItem {
            message: guidance_message,
            reason: String::new(),
        }],
    })
}

/// Backend ids arrive as strings or integers.
fn result_id(raw: &Value) -> Result<String, BackendError> {
    let id = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(BackendError::InvalidResponse("missing result id".into()));
    }
    // The id becomes a URL path segment for the share call.
    let path_safe = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && id != "."
        && id != "..";
    if !path_safe {
        return Err(BackendError::InvalidResponse(format!(
            "result id {id:?} is not a valid path segment"
        )));
    }
    Ok(id)
}

/// Fractions pass; values in (1, 100] are read as percentages.
fn as_fraction(value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        None
    } else if value <= 1.0 {
        Some(value)
    } else if value <= 100.0 {
        Some(value / 100.0)
    } else {
        None
    }
}

fn strict_confidence(value: f64, field: &str) -> Result<f64, BackendError> {
    as_fraction(value).ok_or_else(|| {
        BackendError::InvalidResponse(format!("confidence out of range for {field}: {value}"))
    })
}

fn lenient_confidence(value: Option<f64>) -> f64 {
    value.and_then(as_fraction).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_response(value: Value) -> TextAnalysisResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_response_lifted_into_text_result() {
        let resp = text_response(json!({
            "id": "r-1",
            "analysis": {
                "conditions": ["Acne"],
                "guidance": "See a doctor",
                "confidence": 0.8,
                "risk_level": "medium"
            }
        }));
        let result = normalize_text_response(resp).unwrap();

        assert_eq!(result.id, "r-1");
        assert_eq!(
            result.conditions,
            vec![ConditionNote {
                name: "Acne".into(),
                description: String::new()
            }]
        );
        assert_eq!(
            result.guidance,
            vec![GuidanceItem {
                message: "See a doctor".into(),
                reason: String::new()
            }]
        );
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.risk, "medium");
    }

    #[test]
    fn missing_guidance_gets_default_entry() {
        let resp = text_response(json!({
            "id": 17,
            "analysis": { "conditions": ["Eczema"] }
        }));
        let result = normalize_text_response(resp).unwrap();

        assert_eq!(result.id, "17");
        assert_eq!(result.guidance.len(), 1);
        assert_eq!(result.guidance[0].message, DEFAULT_GUIDANCE);
        assert_eq!(result.risk, DEFAULT_TEXT_RISK);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn missing_analysis_object_defaults_everything() {
        let result = normalize_text_response(text_response(json!({ "id": "x" }))).unwrap();
        assert!(result.conditions.is_empty());
        assert_eq!(result.guidance[0].message, DEFAULT_GUIDANCE);
    }

    #[test]
    fn text_response_without_id_is_invalid() {
        let err = normalize_text_response(text_response(json!({ "analysis": {} }))).unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[test]
    fn ids_that_would_change_the_share_route_are_rejected() {
        for bad in ["a/b", "x?y=1", "..", "r 1", "%2F"] {
            let err = normalize_text_response(text_response(json!({ "id": bad }))).unwrap_err();
            assert!(matches!(err, BackendError::InvalidResponse(_)), "{bad}");
        }
        let ok = normalize_text_response(text_response(json!({ "id": "a1_b-2.c" }))).unwrap();
        assert_eq!(ok.id, "a1_b-2.c");
    }

    #[test]
    fn image_response_sorted_and_validated() {
        let resp: ImageAnalysisResponse = serde_json::from_value(json!({
            "id": "img-9",
            "conditions": [
                { "name": "Psoriasis", "confidence": 0.2 },
                { "name": "Eczema", "confidence": 0.7 }
            ],
            "risk_level": "low",
            "confidence": 0.7,
            "notes": "Mild presentation"
        }))
        .unwrap();
        let result = normalize_image_response(resp).unwrap();

        assert_eq!(result.conditions[0].name, "Eczema");
        assert_eq!(result.conditions[1].name, "Psoriasis");
        assert_eq!(result.risk, RiskTier::Low);
        assert_eq!(result.notes, "Mild presentation");
    }

    #[test]
    fn image_percent_confidence_converted() {
        let resp: ImageAnalysisResponse = serde_json::from_value(json!({
            "id": "a",
            "conditions": [{ "condition": "Melanoma", "confidence": 85 }],
            "risk_tier": "HIGH",
            "confidence": 85.0
        }))
        .unwrap();
        let result = normalize_image_response(resp).unwrap();
        assert!((result.conditions[0].confidence - 0.85).abs() < 1e-9);
        assert_eq!(result.risk, RiskTier::High);
        assert_eq!(result.notes, "");
    }

    #[test]
    fn image_unknown_risk_tier_rejected() {
        let resp: ImageAnalysisResponse = serde_json::from_value(json!({
            "id": "a",
            "conditions": [],
            "risk_level": "catastrophic",
            "confidence": 0.5
        }))
        .unwrap();
        assert!(normalize_image_response(resp).is_err());
    }

    #[test]
    fn image_out_of_range_confidence_rejected() {
        let resp: ImageAnalysisResponse = serde_json::from_value(json!({
            "id": "a",
            "conditions": [{ "name": "Acne", "confidence": -0.1 }],
            "risk_level": "low",
            "confidence": 0.5
        }))
        .unwrap();
        assert!(normalize_image_response(resp).is_err());
    }

    #[test]
    fn skin_check_verdicts() {
        let absent: SkinCheckResponse =
            serde_json::from_value(json!({ "message": "No skin condition detected" })).unwrap();
        assert_eq!(absent.verdict(), SkinVerdict::Absent);

        let empty: SkinCheckResponse = serde_json::from_value(json!({ "conditions": [] })).unwrap();
        assert_eq!(empty.verdict(), SkinVerdict::Absent);

        let present: SkinCheckResponse =
            serde_json::from_value(json!({ "conditions": [{ "name": "Acne" }] })).unwrap();
        assert_eq!(present.verdict(), SkinVerdict::Present);
    }
}
