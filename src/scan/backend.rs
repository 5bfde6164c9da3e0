//! Remote scan backend: skin classifier, the two analysis endpoints, and
//! the share/approve call.
//!
//! `ScanBackend` is the seam the pipeline talks to. `HttpScanBackend` is the
//! production implementation over `reqwest`; tests swap in a scripted mock.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::result::{ImageAnalysisResponse, SkinCheckResponse, TextAnalysisResponse};
use super::types::NormalizedImage;
use crate::config::ScanConfig;
use crate::session::SessionContext;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Cannot reach scan backend at {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Operations the scan pipeline needs from the remote backend.
///
/// Arguments are owned so each call can be moved into a spawned task.
pub trait ScanBackend: Send + Sync {
    /// Lightweight classifier: does the image plausibly show a skin condition?
    fn classify_skin(
        &self,
        image: Arc<NormalizedImage>,
    ) -> BoxFuture<'_, Result<SkinCheckResponse, BackendError>>;

    fn analyze_image(
        &self,
        image: Arc<NormalizedImage>,
        symptoms: Option<String>,
        user_id: Option<String>,
    ) -> BoxFuture<'_, Result<ImageAnalysisResponse, BackendError>>;

    fn analyze_text(
        &self,
        symptoms: String,
        consent: bool,
    ) -> BoxFuture<'_, Result<TextAnalysisResponse, BackendError>>;

    /// Mark a result as shareable. Idempotent, keyed by the result id.
    fn share_result(&self, result_id: String, consent: bool) -> BoxFuture<'_, Result<(), BackendError>>;
}

// ═══════════════════════════════════════════════════════════
// HttpScanBackend
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
struct TextAnalysisRequest<'a> {
    symptoms: &'a str,
    consent: bool,
}

#[derive(Serialize)]
struct ShareRequest {
    consent: bool,
}

/// `reqwest` client for the scan REST API.
pub struct HttpScanBackend {
    client: reqwest::Client,
    config: ScanConfig,
    session: Arc<dyn SessionContext>,
}

impl HttpScanBackend {
    pub fn new(config: ScanConfig, session: Arc<dyn SessionContext>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| BackendError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            config,
            session,
        })
    }

    fn post(&self, path: &str, timeout: Duration) -> RequestBuilder {
        let request = self.client.post(self.config.url(path)).timeout(timeout);
        match self.session.current_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, endpoint: &'static str) -> Result<Response, BackendError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else if e.is_connect() {
                BackendError::Connection(self.config.api_url.clone())
            } else {
                BackendError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint, status = status.as_u16(), "Scan backend returned an error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(endpoint, status = status.as_u16(), "Scan backend responded");
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &'static str,
    ) -> Result<T, BackendError> {
        self.send(request, endpoint)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::ResponseParsing(e.to_string()))
    }
}

fn image_part(image: &NormalizedImage) -> Result<Part, BackendError> {
    Part::bytes(image.bytes.clone())
        .file_name(format!("scan.{}", image.extension()))
        .mime_str(&image.media_type)
        .map_err(|e| BackendError::HttpClient(e.to_string()))
}

impl ScanBackend for HttpScanBackend {
    fn classify_skin(
        &self,
        image: Arc<NormalizedImage>,
    ) -> BoxFuture<'_, Result<SkinCheckResponse, BackendError>> {
        async move {
            let form = Form::new().part("image", image_part(&image)?);
            let request = self
                .post(&self.config.endpoints.skin_check, self.config.classifier_timeout)
                .multipart(form);
            self.send_json(request, "skin_check").await
        }
        .boxed()
    }

    fn analyze_image(
        &self,
        image: Arc<NormalizedImage>,
        symptoms: Option<String>,
        user_id: Option<String>,
    ) -> BoxFuture<'_, Result<ImageAnalysisResponse, BackendError>> {
        async move {
            let mut form = Form::new().part("image", image_part(&image)?);
            if let Some(symptoms) = symptoms {
                form = form.text("symptoms", symptoms);
            }
            if let Some(user_id) = user_id {
                form = form.text("user_id", user_id);
            }
            let request = self
                .post(&self.config.endpoints.analyze_image, self.config.analysis_timeout)
                .multipart(form);
            self.send_json(request, "analyze_image").await
        }
        .boxed()
    }

    fn analyze_text(
        &self,
        symptoms: String,
        consent: bool,
    ) -> BoxFuture<'_, Result<TextAnalysisResponse, BackendError>> {
        async move {
            let body = TextAnalysisRequest {
                symptoms: &symptoms,
                consent,
            };
            let request = self
                .post(&self.config.endpoints.analyze_text, self.config.analysis_timeout)
                .json(&body);
            self.send_json(request, "analyze_text").await
        }
        .boxed()
    }

    fn share_result(&self, result_id: String, consent: bool) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            let path = self.config.endpoints.share_path(&result_id);
            let request = self
                .post(&path, self.config.classifier_timeout)
                .json(&ShareRequest { consent });
            self.send(request, "share").await.map(|_| ())
        }
        .boxed()
    }
}
