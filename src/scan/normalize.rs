//! Image Normalizer.
//!
//! Turns a user-selected file into an upload-ready `NormalizedImage`:
//! media-type gate, EXIF orientation fix, longest-side bound, byte ceiling.
//!
//! Key rules:
//! - Reject non-image media types before touching the bytes
//! - Preserve aspect ratio, never upscale
//! - Pass already-compliant JPEG/PNG files through untouched
//! - Otherwise re-encode as JPEG down a quality ladder, then shrink

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use tracing::debug;

use super::types::NormalizedImage;
use super::ScanError;
use crate::config::NormalizerLimits;

/// Smallest byte count that can hold a valid image header.
const MIN_IMAGE_BYTES: usize = 67;

/// Give up shrinking below this longest side.
const MIN_DIMENSION: u32 = 64;

// ═══════════════════════════════════════════════════════════
// ImageUpload
// ═══════════════════════════════════════════════════════════

/// A raw file as handed over by the UI (file picker or drop).
#[derive(Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// Declared media type, e.g. `image/jpeg`.
    pub media_type: String,
    pub file_name: Option<String>,
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("bytes", &self.bytes.len())
            .field("media_type", &self.media_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Read a file from disk, inferring the media type from its extension.
    pub async fn from_path(path: &Path) -> Result<Self, ScanError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ScanError::NormalizationFailed(format!("Failed to read {}: {e}", path.display()))
        })?;
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        Ok(Self {
            bytes,
            media_type,
            file_name,
        })
    }

    /// Declared media type belongs to the image family.
    pub fn is_image_type(&self) -> bool {
        self.media_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

/// A drop may carry several files; only the first one is used.
pub fn first_upload(uploads: Vec<ImageUpload>) -> Option<ImageUpload> {
    uploads.into_iter().next()
}

// ═══════════════════════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════════════════════

/// Produce a size- and dimension-bounded copy of `upload`.
///
/// Fails with `InputRejected` for non-image media types and
/// `NormalizationFailed` for unreadable or unfittable images.
pub fn normalize(
    upload: &ImageUpload,
    limits: &NormalizerLimits,
) -> Result<NormalizedImage, ScanError> {
    if !upload.is_image_type() {
        return Err(ScanError::InputRejected(upload.media_type.clone()));
    }
    validate_image_bytes(&upload.bytes, limits)?;

    let format = image::guess_format(&upload.bytes)
        .map_err(|e| ScanError::NormalizationFailed(format!("Unrecognized image data: {e}")))?;
    let decoded = image::load_from_memory_with_format(&upload.bytes, format)
        .map_err(|e| ScanError::NormalizationFailed(format!("Failed to decode image: {e}")))?;
    let (orig_w, orig_h) = decoded.dimensions();

    let orientation = read_exif_orientation(&upload.bytes);
    let oriented = apply_orientation(decoded, orientation);
    let (w, h) = oriented.dimensions();
    let (fit_w, fit_h) = compute_fit_dimensions(w, h, limits.max_dimension);

    let passthrough_media = match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        _ => None,
    };
    if let Some(media_type) = passthrough_media {
        if orientation == 1
            && (fit_w, fit_h) == (w, h)
            && upload.bytes.len() <= limits.max_upload_bytes
        {
            debug!(size = upload.bytes.len(), dims = format!("{w}x{h}"), "Image within bounds, passing through");
            return Ok(NormalizedImage {
                bytes: upload.bytes.clone(),
                media_type: media_type.to_string(),
                width: w,
                height: h,
                original_width: orig_w,
                original_height: orig_h,
            });
        }
    }

    let mut working = if (fit_w, fit_h) == (w, h) {
        oriented
    } else {
        oriented.resize_exact(fit_w, fit_h, FilterType::CatmullRom)
    };

    loop {
        let (cur_w, cur_h) = working.dimensions();
        for &quality in &limits.jpeg_quality_ladder {
            let bytes = encode_jpeg(&working, quality)?;
            if bytes.len() <= limits.max_upload_bytes {
                debug!(
                    original = format!("{orig_w}x{orig_h}"),
                    output = format!("{cur_w}x{cur_h}"),
                    quality,
                    size = bytes.len(),
                    "Image normalized"
                );
                return Ok(NormalizedImage {
                    bytes,
                    media_type: "image/jpeg".into(),
                    width: cur_w,
                    height: cur_h,
                    original_width: orig_w,
                    original_height: orig_h,
                });
            }
        }

        let longest = cur_w.max(cur_h);
        if longest / 2 < MIN_DIMENSION {
            return Err(ScanError::NormalizationFailed(format!(
                "Image cannot fit within {} bytes",
                limits.max_upload_bytes
            )));
        }
        let (half_w, half_h) = compute_fit_dimensions(cur_w, cur_h, longest / 2);
        working = working.resize_exact(half_w, half_h, FilterType::Triangle);
    }
}

/// Reject empty, truncated or oversized payloads before decoding.
pub fn validate_image_bytes(bytes: &[u8], limits: &NormalizerLimits) -> Result<(), ScanError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ScanError::NormalizationFailed(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > limits.max_raw_bytes {
        return Err(ScanError::NormalizationFailed(format!(
            "Image data exceeds {}MB limit",
            limits.max_raw_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Scale so the longest side is at most `max_side`. Never upscales.
pub fn compute_fit_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let longest = width.max(height);
    if longest <= max_side {
        return (width, height);
    }

    let scale = max_side as f32 / longest as f32;
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, max_side);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, max_side);
    (new_w, new_h)
}

/// `data:` URI for previewing the normalized payload.
pub fn preview_data_uri(image: &NormalizedImage) -> String {
    format!("data:{};base64,{}", image.media_type, STANDARD.encode(&image.bytes))
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ScanError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    rgb.write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))
        .map_err(|e| ScanError::NormalizationFailed(format!("JPEG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ── EXIF orientation ──────────────────────────────────────

/// Read EXIF tag 0x0112. Returns 1 (normal) if absent or unreadable.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation value (1-8) to a decoded image.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
