//! Quality Check pre-validator.
//!
//! A local sharpness/lighting heuristic over the normalized image. Produces
//! exactly `Good` or `Poor`; the scores are kept so a UI can explain why a
//! photo was turned down.
//!
//! Metrics follow standard practice:
//! - Laplacian variance for sharpness (OpenCV blur metric)
//! - RMS contrast (standard deviation of luma)
//! - Mean luma for under/over-exposure

use image::imageops::FilterType;
use image::{GenericImageView, GrayImage, Luma, RgbImage};
use serde::Serialize;
use tracing::debug;

use super::types::{NormalizedImage, QualityVerdict};
use super::ScanError;

/// Images are assessed at this longest side so cost stays predictable.
const ASSESS_DIMENSION: u32 = 512;

/// Laplacian variance below this = blurry. Skin photos are smoother than
/// printed text, so this sits below the usual document threshold.
const BLUR_THRESHOLD: f32 = 60.0;

/// Mean luma below this = underexposed.
const DARK_THRESHOLD: f32 = 40.0;

/// Mean luma above this = overexposed.
const BRIGHT_THRESHOLD: f32 = 230.0;

/// RMS contrast below this = near-uniform frame.
const CONTRAST_THRESHOLD: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    Blurry,
    TooDark,
    Overexposed,
    LowContrast,
    /// The payload could not be decoded for assessment.
    Unreadable,
}

impl QualityIssue {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Blurry => "The photo looks blurry. Hold steady and retake it in focus.",
            Self::TooDark => "The photo is too dark. Use more light.",
            Self::Overexposed => "The photo is overexposed. Avoid direct flash or sunlight.",
            Self::LowContrast => "The skin area is hard to distinguish. Move closer.",
            Self::Unreadable => "This photo could not be read. Try another one.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub verdict: QualityVerdict,
    /// Laplacian variance; higher = sharper.
    pub sharpness: f32,
    /// RMS contrast (0-127.5).
    pub contrast: f32,
    /// Mean luma (0-255).
    pub brightness: f32,
    pub issues: Vec<QualityIssue>,
}

/// Assesses image quality without modifying it.
pub trait QualityCheck: Send + Sync {
    fn assess(&self, image: &RgbImage) -> QualityReport;
}

/// Production heuristic: blur, exposure and contrast thresholds.
pub struct HeuristicQualityCheck;

impl QualityCheck for HeuristicQualityCheck {
    fn assess(&self, image: &RgbImage) -> QualityReport {
        let gray = rgb_to_gray(image);

        let sharpness = compute_laplacian_variance(&gray);
        let contrast = compute_contrast_score(&gray);
        let brightness = compute_mean_luma(&gray);

        let mut issues = Vec::new();
        if brightness < DARK_THRESHOLD {
            issues.push(QualityIssue::TooDark);
        } else if brightness > BRIGHT_THRESHOLD {
            issues.push(QualityIssue::Overexposed);
        }
        if contrast < CONTRAST_THRESHOLD {
            issues.push(QualityIssue::LowContrast);
        }
        // A uniform frame is reported as low contrast, not blur.
        if sharpness < BLUR_THRESHOLD && !issues.contains(&QualityIssue::LowContrast) {
            issues.push(QualityIssue::Blurry);
        }

        let verdict = if issues.is_empty() {
            QualityVerdict::Good
        } else {
            QualityVerdict::Poor
        };

        QualityReport {
            verdict,
            sharpness,
            contrast,
            brightness,
            issues,
        }
    }
}

/// Decode the normalized payload, shrink it for assessment, and run `check`.
pub fn assess_image(
    check: &dyn QualityCheck,
    image: &NormalizedImage,
) -> Result<QualityReport, ScanError> {
    let decoded = image::load_from_memory(&image.bytes)
        .map_err(|e| ScanError::NormalizationFailed(format!("Failed to decode image: {e}")))?;

    let (w, h) = (decoded.width(), decoded.height());
    let working = if w.max(h) > ASSESS_DIMENSION {
        decoded.resize(ASSESS_DIMENSION, ASSESS_DIMENSION, FilterType::Triangle)
    } else {
        decoded
    };

    let report = check.assess(&working.to_rgb8());
    debug!(
        verdict = ?report.verdict,
        sharpness = report.sharpness,
        contrast = report.contrast,
        brightness = report.brightness,
        "Quality check resolved"
    );
    Ok(report)
}

// ═══════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels() {
        let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32) as u8;
        gray.put_pixel(x, y, Luma([luma]));
    }
    gray
}

/// Laplacian variance with the 3x3 kernel `[0,1,0; 1,-4,1; 0,1,0]`.
pub fn compute_laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = (img.width(), img.height());
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let px = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f64;
            let laplacian =
                px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

/// RMS contrast: standard deviation of grayscale intensities.
pub fn compute_contrast_score(img: &GrayImage) -> f32 {
    let (mean, variance) = luma_moments(img);
    if mean.is_none() {
        return 0.0;
    }
    variance.max(0.0).sqrt() as f32
}

pub fn compute_mean_luma(img: &GrayImage) -> f32 {
    luma_moments(img).0.unwrap_or(0.0) as f32
}

fn luma_moments(img: &GrayImage) -> (Option<f64>, f64) {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in img.pixels() {
        let val = pixel.0[0] as f64;
        sum += val;
        sum_sq += val * val;
        count += 1;
    }

    if count == 0 {
        return (None, 0.0);
    }
    let mean = sum / count as f64;
    (Some(mean), (sum_sq / count as f64) - (mean * mean))
}
