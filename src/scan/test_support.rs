//! Shared fixtures for scan tests: generated images, a scripted backend,
//! and an event recorder.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use super::backend::{BackendError, ScanBackend};
use super::events::{EventSink, ScanEvent};
use super::normalize::ImageUpload;
use super::result::{ImageAnalysisResponse, SkinCheckResponse, TextAnalysisResponse};
use super::types::{ImageAttachment, NormalizedImage};

// ── Images ────────────────────────────────────────────────

/// Two skin-like tones in square blocks: sharp, well lit, good contrast.
pub fn checkerboard(size: u32, block: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        if ((x / block) + (y / block)) % 2 == 0 {
            Rgb([200, 150, 130])
        } else {
            Rgb([60, 40, 35])
        }
    })
}

/// Incompressible content, for byte-ceiling tests.
pub fn noise_image(width: u32, height: u32) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(42);
    RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .unwrap();
    cursor.into_inner()
}

pub fn good_upload() -> ImageUpload {
    ImageUpload::new(encode_png(&checkerboard(200, 8)), "image/png").with_file_name("arm.png")
}

pub fn blurry_upload() -> ImageUpload {
    let img = RgbImage::from_fn(200, 200, |x, _| {
        let v = 60 + (x / 2) as u8;
        Rgb([v, v, v])
    });
    ImageUpload::new(encode_png(&img), "image/png")
}

/// Pending attachment around a tiny fake payload.
pub fn attachment() -> ImageAttachment {
    let image = NormalizedImage {
        bytes: vec![0xFF, 0xD8, 0xFF],
        media_type: "image/jpeg".into(),
        width: 1,
        height: 1,
        original_width: 1,
        original_height: 1,
    };
    ImageAttachment::new(image, "data:image/jpeg;base64,/9j/".into(), None)
}

// ── Events ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ScanEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ── Backend ───────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub skin: usize,
    pub image: usize,
    pub text: usize,
    pub share: usize,
}

/// Scripted `ScanBackend`.
///
/// Analysis calls can be held until `release_analysis()` is called, which
/// lets tests observe the `Analyzing` phase and race a reset against it.
pub struct MockScanBackend {
    skin_response: Value,
    image_response: Value,
    text_response: Value,
    fail_skin: AtomicBool,
    fail_analysis: AtomicBool,
    fail_share: AtomicBool,
    analysis_gate: Option<Arc<Semaphore>>,
    skin: AtomicUsize,
    image: AtomicUsize,
    text: AtomicUsize,
    share: AtomicUsize,
    last_user_id: Mutex<Option<String>>,
    last_text_consent: Mutex<Option<bool>>,
    last_symptoms: Mutex<Option<String>>,
    shared: Mutex<Vec<(String, bool)>>,
}

impl MockScanBackend {
    pub fn new() -> Self {
        Self {
            skin_response: json!({ "conditions": [{ "name": "Eczema" }] }),
            image_response: json!({
                "id": "img-1",
                "conditions": [
                    { "name": "Psoriasis", "confidence": 0.3 },
                    { "name": "Eczema", "confidence": 0.6 }
                ],
                "risk_level": "MEDIUM",
                "confidence": 0.6,
                "notes": "Consider a dermatologist visit."
            }),
            text_response: json!({
                "id": "txt-1",
                "analysis": {
                    "conditions": ["Acne"],
                    "risk_level": "medium",
                    "confidence": 0.8,
                    "guidance": "See a doctor"
                }
            }),
            fail_skin: AtomicBool::new(false),
            fail_analysis: AtomicBool::new(false),
            fail_share: AtomicBool::new(false),
            analysis_gate: None,
            skin: AtomicUsize::new(0),
            image: AtomicUsize::new(0),
            text: AtomicUsize::new(0),
            share: AtomicUsize::new(0),
            last_user_id: Mutex::new(None),
            last_text_consent: Mutex::new(None),
            last_symptoms: Mutex::new(None),
            shared: Mutex::new(Vec::new()),
        }
    }

    pub fn with_skin_response(mut self, value: Value) -> Self {
        self.skin_response = value;
        self
    }

    pub fn with_image_response(mut self, value: Value) -> Self {
        self.image_response = value;
        self
    }

    /// Analysis calls block until `release_analysis` adds a permit.
    pub fn holding_analysis(mut self) -> Self {
        self.analysis_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release_analysis(&self) {
        if let Some(gate) = &self.analysis_gate {
            gate.add_permits(1);
        }
    }

    pub fn set_fail_skin(&self, fail: bool) {
        self.fail_skin.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_analysis(&self, fail: bool) {
        self.fail_analysis.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_share(&self, fail: bool) {
        self.fail_share.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            skin: self.skin.load(Ordering::SeqCst),
            image: self.image.load(Ordering::SeqCst),
            text: self.text.load(Ordering::SeqCst),
            share: self.share.load(Ordering::SeqCst),
        }
    }

    pub fn last_user_id(&self) -> Option<String> {
        self.last_user_id.lock().unwrap().clone()
    }

    pub fn last_text_consent(&self) -> Option<bool> {
        *self.last_text_consent.lock().unwrap()
    }

    pub fn last_symptoms(&self) -> Option<String> {
        self.last_symptoms.lock().unwrap().clone()
    }

    pub fn shared(&self) -> Vec<(String, bool)> {
        self.shared.lock().unwrap().clone()
    }

    async fn wait_for_release(&self) {
        if let Some(gate) = &self.analysis_gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn analysis_failure(&self) -> Option<BackendError> {
        self.fail_analysis
            .load(Ordering::SeqCst)
            .then(|| BackendError::Connection("mock".into()))
    }
}

impl ScanBackend for MockScanBackend {
    fn classify_skin(
        &self,
        _image: Arc<NormalizedImage>,
    ) -> BoxFuture<'_, Result<SkinCheckResponse, BackendError>> {
        async move {
            self.skin.fetch_add(1, Ordering::SeqCst);
            if self.fail_skin.load(Ordering::SeqCst) {
                return Err(BackendError::Timeout);
            }
            Ok(serde_json::from_value(self.skin_response.clone()).unwrap())
        }
        .boxed()
    }

    fn analyze_image(
        &self,
        _image: Arc<NormalizedImage>,
        symptoms: Option<String>,
        user_id: Option<String>,
    ) -> BoxFuture<'_, Result<ImageAnalysisResponse, BackendError>> {
        async move {
            self.image.fetch_add(1, Ordering::SeqCst);
            *self.last_user_id.lock().unwrap() = user_id;
            *self.last_symptoms.lock().unwrap() = symptoms;
            self.wait_for_release().await;
            if let Some(err) = self.analysis_failure() {
                return Err(err);
            }
            Ok(serde_json::from_value(self.image_response.clone()).unwrap())
        }
        .boxed()
    }

    fn analyze_text(
        &self,
        symptoms: String,
        consent: bool,
    ) -> BoxFuture<'_, Result<TextAnalysisResponse, BackendError>> {
        async move {
            self.text.fetch_add(1, Ordering::SeqCst);
            *self.last_text_consent.lock().unwrap() = Some(consent);
            *self.last_symptoms.lock().unwrap() = Some(symptoms);
            self.wait_for_release().await;
            if let Some(err) = self.analysis_failure() {
                return Err(err);
            }
            Ok(serde_json::from_value(self.text_response.clone()).unwrap())
        }
        .boxed()
    }

    fn share_result(&self, result_id: String, consent: bool) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            self.share.fetch_add(1, Ordering::SeqCst);
            if self.fail_share.load(Ordering::SeqCst) {
                return Err(BackendError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            self.shared.lock().unwrap().push((result_id, consent));
            Ok(())
        }
        .boxed()
    }
}
