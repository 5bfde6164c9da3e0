//! Scan pipeline orchestrator.
//!
//! `ScanPipeline` owns the single input/result state and is the only place
//! transitions happen. Every other scan module is either a pure helper or a
//! collaborator behind a trait.
//!
//! Concurrency rules:
//! - State sits behind a `std::sync::Mutex` that is never held across an
//!   `.await`.
//! - Each dispatch is tagged with a generation. `reset()` bumps it, so a
//!   response that arrives afterwards is discarded.
//! - Both validators run as tasks keyed by attachment id. A verdict for a
//!   superseded attachment is dropped.
//! - The progress ticker lives inside the in-flight record, so leaving
//!   `Analyzing` by any path cancels it.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{BackendError, HttpScanBackend, ScanBackend};
use super::dispatch::{build_request, dispatch, input_ready, symptom_chars};
use super::events::{EventSink, ScanEvent};
use super::normalize::{first_upload, normalize, preview_data_uri, ImageUpload};
use super::progress::ProgressTicker;
use super::quality::{
    assess_image, HeuristicQualityCheck, QualityCheck, QualityIssue, QualityReport,
};
use super::router::{route, ScanView};
use super::sharing::{GateState, SharingGate};
use super::types::{
    AnalysisResult, ImageAttachment, InputMode, NormalizedImage, PipelinePhase, QualityVerdict,
    ResultKind, SharingDecision,
};
use super::ScanError;
use crate::config::ScanConfig;
use crate::session::SessionContext;

// ═══════════════════════════════════════════════════════════
// State
// ═══════════════════════════════════════════════════════════

/// The outstanding analysis request. Dropping it stops the ticker.
struct InFlight {
    kind: ResultKind,
    ticker: ProgressTicker,
}

impl InFlight {
    fn generation(&self) -> u64 {
        self.ticker.generation()
    }
}

#[derive(Default)]
struct PipelineState {
    mode: InputMode,
    symptoms: String,
    image: Option<ImageAttachment>,
    validators: Vec<JoinHandle<()>>,
    /// Consent flag sent with text analyses.
    analysis_consent: bool,
    in_flight: Option<InFlight>,
    result: Option<AnalysisResult>,
    share_gate: SharingGate,
    generation: u64,
    /// Bumped by every selection, clear and reset. A normalization that
    /// finishes under an older value is dropped.
    attach_seq: u64,
}

impl PipelineState {
    /// The image that participates in gating and dispatch.
    fn active_image(&self) -> Option<&ImageAttachment> {
        match self.mode {
            InputMode::Image => self.image.as_ref(),
            InputMode::Text => None,
        }
    }

    fn phase(&self, min_chars: usize) -> PipelinePhase {
        if self.in_flight.is_some() {
            return PipelinePhase::Analyzing;
        }
        if let Some(result) = &self.result {
            return PipelinePhase::ResultReady(result.kind());
        }
        match self.active_image() {
            Some(image) if image.is_rejected() => PipelinePhase::Idle,
            Some(image) if image.is_validating() => PipelinePhase::Validating,
            Some(_) => PipelinePhase::ReadyToAnalyze,
            None if symptom_chars(&self.symptoms) >= min_chars => PipelinePhase::ReadyToAnalyze,
            None => PipelinePhase::Idle,
        }
    }

    fn can_analyze(&self, min_chars: usize) -> bool {
        self.in_flight.is_none()
            && self.result.is_none()
            && input_ready(self.active_image(), &self.symptoms, min_chars)
    }

    /// Input may only change before a dispatch starts or after a reset.
    fn ensure_editable(&self) -> Result<(), ScanError> {
        if self.in_flight.is_some() || self.result.is_some() {
            return Err(ScanError::Busy);
        }
        Ok(())
    }

    fn abort_validators(&mut self) {
        for handle in self.validators.drain(..) {
            handle.abort();
        }
    }

    fn input_changed(&self) -> ScanEvent {
        ScanEvent::InputChanged {
            mode: self.mode,
            has_image: self.image.is_some(),
            symptom_chars: symptom_chars(&self.symptoms),
        }
    }

    fn attachment_mut(&mut self, id: Uuid) -> Option<&mut ImageAttachment> {
        self.image.as_mut().filter(|a| a.id == id)
    }
}

/// Serializable view of the pipeline at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSnapshot {
    pub phase: PipelinePhase,
    pub mode: InputMode,
    pub symptoms: String,
    pub image: Option<ImageAttachment>,
    /// Displayed percentage while `Analyzing`.
    pub progress: Option<u8>,
    pub result: Option<AnalysisResult>,
    pub share_gate: GateState,
    pub can_analyze: bool,
    pub generation: u64,
}

/// How a call to [`ScanPipeline::analyze`] ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Completed(AnalysisResult),
    /// The pipeline was reset while the request was outstanding.
    Discarded,
    /// A request was already in flight; nothing was sent.
    Busy,
}

// ═══════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ScanPipeline {
    state: Arc<Mutex<PipelineState>>,
    backend: Arc<dyn ScanBackend>,
    quality: Arc<dyn QualityCheck>,
    session: Arc<dyn SessionContext>,
    sink: Arc<dyn EventSink>,
    config: Arc<ScanConfig>,
}

impl ScanPipeline {
    pub fn new(
        config: ScanConfig,
        backend: Arc<dyn ScanBackend>,
        session: Arc<dyn SessionContext>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(PipelineState::default())),
            backend,
            quality: Arc::new(HeuristicQualityCheck),
            session,
            sink,
            config: Arc::new(config),
        }
    }

    /// Pipeline talking to the configured HTTP backend.
    pub fn http(
        config: ScanConfig,
        session: Arc<dyn SessionContext>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, BackendError> {
        let backend = HttpScanBackend::new(config.clone(), session.clone())?;
        Ok(Self::new(config, Arc::new(backend), session, sink))
    }

    /// Replace the quality heuristic.
    pub fn with_quality_check(mut self, check: Arc<dyn QualityCheck>) -> Self {
        self.quality = check;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, PipelineState>, ScanError> {
        self.state.lock().map_err(|_| ScanError::LockPoisoned)
    }

    fn fail(&self, err: ScanError) -> ScanError {
        self.sink.emit(ScanEvent::notice_for(&err));
        err
    }

    // ── Input ────────────────────────────────────────────

    /// Normalize `upload` and make it the current attachment.
    ///
    /// On failure the previous input is left untouched. On success the old
    /// attachment is replaced wholesale and both validators start.
    /// A selection overtaken by a newer one, a clear or a reset while it was
    /// normalizing returns `ScanError::Superseded` and changes nothing.
    pub async fn attach_image(&self, upload: ImageUpload) -> Result<Uuid, ScanError> {
        let seq = {
            let mut state = self.lock()?;
            state.ensure_editable()?;
            state.attach_seq += 1;
            state.attach_seq
        };

        let limits = self.config.limits.clone();
        let file_name = upload.file_name.clone();
        let normalized = tokio::task::spawn_blocking(move || {
            normalize(&upload, &limits).map(|image| {
                let preview = preview_data_uri(&image);
                (image, preview)
            })
        })
        .await
        .map_err(|e| ScanError::NormalizationFailed(format!("Normalization task failed: {e}")))
        .and_then(|r| r);

        let mut state = self.lock()?;
        if state.attach_seq != seq {
            debug!(seq, current = state.attach_seq, "Dropping superseded image selection");
            return Err(ScanError::Superseded);
        }

        let (image, preview) = match normalized {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "Image attachment rejected");
                return Err(self.fail(err));
            }
        };

        // A dispatch may have started while we were normalizing.
        state.ensure_editable()?;
        state.abort_validators();

        let attachment = ImageAttachment::new(image, preview, file_name);
        let id = attachment.id;
        let payload = attachment.image.clone();
        info!(
            attachment_id = %id,
            width = payload.width,
            height = payload.height,
            bytes = payload.bytes.len(),
            "Image attached"
        );

        state.image = Some(attachment);
        state.mode = InputMode::Image;
        self.sink.emit(ScanEvent::ImageAttached {
            attachment_id: id,
            width: payload.width,
            height: payload.height,
        });
        self.sink.emit(state.input_changed());

        let quality = self.spawn_quality_check(id, payload.clone());
        let skin = self.spawn_skin_check(id, payload);
        state.validators.extend([quality, skin]);
        Ok(id)
    }

    /// Attach the first file of a dropped batch.
    pub async fn attach_first(&self, uploads: Vec<ImageUpload>) -> Result<Uuid, ScanError> {
        match first_upload(uploads) {
            Some(upload) => self.attach_image(upload).await,
            None => Err(self.fail(ScanError::InputRejected("no file".into()))),
        }
    }

    pub fn clear_image(&self) -> Result<(), ScanError> {
        let mut state = self.lock()?;
        state.ensure_editable()?;
        state.abort_validators();
        state.attach_seq += 1;
        if let Some(old) = state.image.take() {
            debug!(attachment_id = %old.id, "Image cleared");
        }
        self.sink.emit(state.input_changed());
        Ok(())
    }

    /// Switch the active input. The inactive one keeps its value.
    pub fn select_mode(&self, mode: InputMode) -> Result<(), ScanError> {
        let mut state = self.lock()?;
        state.ensure_editable()?;
        if state.mode != mode {
            debug!(?mode, "Input mode changed");
            state.mode = mode;
            self.sink.emit(state.input_changed());
        }
        Ok(())
    }

    pub fn set_symptoms(&self, text: impl Into<String>) -> Result<(), ScanError> {
        let mut state = self.lock()?;
        state.ensure_editable()?;
        state.symptoms = text.into();
        self.sink.emit(state.input_changed());
        Ok(())
    }

    pub fn set_analysis_consent(&self, consent: bool) -> Result<(), ScanError> {
        let mut state = self.lock()?;
        state.ensure_editable()?;
        state.analysis_consent = consent;
        Ok(())
    }

    /// Re-run the skin classifier for the current attachment.
    pub fn retry_skin_check(&self) -> Result<(), ScanError> {
        let mut state = self.lock()?;
        state.ensure_editable()?;
        let Some(attachment) = state.image.as_mut() else {
            return Err(ScanError::NotReady);
        };
        attachment.skin_warning = None;
        let (id, payload) = (attachment.id, attachment.image.clone());
        info!(attachment_id = %id, "Retrying skin check");

        let handle = self.spawn_skin_check(id, payload);
        state.validators.push(handle);
        Ok(())
    }

    /// Wait for the validators of the current attachment to finish.
    pub async fn settle_validation(&self) -> Result<(), ScanError> {
        let handles = std::mem::take(&mut self.lock()?.validators);
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Validator task failed");
                }
            }
        }
        Ok(())
    }

    // ── Validators ───────────────────────────────────────

    fn spawn_quality_check(&self, id: Uuid, image: Arc<NormalizedImage>) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let check = pipeline.quality.clone();
            let assessed =
                tokio::task::spawn_blocking(move || assess_image(check.as_ref(), &image)).await;
            let report = match assessed {
                Ok(Ok(report)) => report,
                Ok(Err(err)) => {
                    warn!(attachment_id = %id, error = %err, "Quality check could not read image");
                    unreadable_report()
                }
                Err(err) => {
                    warn!(attachment_id = %id, error = %err, "Quality check task failed");
                    unreadable_report()
                }
            };
            pipeline.apply_quality(id, report);
        })
    }

    fn apply_quality(&self, id: Uuid, report: QualityReport) {
        let Ok(mut state) = self.lock() else { return };
        let Some(attachment) = state.attachment_mut(id) else {
            debug!(attachment_id = %id, "Dropping quality verdict for superseded image");
            return;
        };
        let verdict = report.verdict;
        attachment.quality = verdict;
        attachment.quality_report = Some(report);
        info!(attachment_id = %id, ?verdict, "Quality verdict resolved");
        self.sink.emit(ScanEvent::QualityResolved {
            attachment_id: id,
            verdict,
        });
    }

    fn spawn_skin_check(&self, id: Uuid, image: Arc<NormalizedImage>) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let outcome = pipeline.backend.classify_skin(image).await;

            let Ok(mut state) = pipeline.lock() else { return };
            let Some(attachment) = state.attachment_mut(id) else {
                debug!(attachment_id = %id, "Dropping skin verdict for superseded image");
                return;
            };
            match outcome {
                Ok(response) => {
                    let verdict = response.verdict();
                    attachment.skin = verdict;
                    attachment.skin_warning = None;
                    info!(attachment_id = %id, ?verdict, "Skin verdict resolved");
                    pipeline.sink.emit(ScanEvent::SkinResolved {
                        attachment_id: id,
                        verdict,
                    });
                }
                Err(err) => {
                    warn!(attachment_id = %id, error = %err, "Skin check failed");
                    let err = ScanError::ValidationTransientFailure(err.to_string());
                    attachment.skin_warning = Some(err.user_message());
                    pipeline.fail(err);
                }
            }
        })
    }

    // ── Dispatch ─────────────────────────────────────────

    /// Send exactly one analysis request for the current input.
    ///
    /// A second call while a request is outstanding is a no-op returning
    /// `DispatchOutcome::Busy`. On failure the input is kept so the user can
    /// retry without re-uploading.
    pub async fn analyze(&self) -> Result<DispatchOutcome, ScanError> {
        let (generation, request, consent) = {
            let mut state = self.lock()?;
            if state.in_flight.is_some() {
                debug!("Analysis already in flight, ignoring trigger");
                return Ok(DispatchOutcome::Busy);
            }
            if state.result.is_some() {
                return Err(ScanError::Busy);
            }
            if !state.can_analyze(self.config.min_symptom_chars) {
                return Err(ScanError::NotReady);
            }

            state.generation += 1;
            let generation = state.generation;
            let request = build_request(state.active_image(), &state.symptoms);
            let kind = request.kind();

            info!(generation, %kind, "Analysis started");
            self.sink.emit(ScanEvent::AnalysisStarted { generation, kind });
            let ticker =
                ProgressTicker::start(self.config.progress.clone(), generation, self.sink.clone());
            state.in_flight = Some(InFlight { kind, ticker });
            (generation, request, state.analysis_consent)
        };

        let mut guard = InFlightGuard {
            pipeline: self,
            generation,
            armed: true,
        };
        let user_id = self.session.current_user();
        let outcome = dispatch(self.backend.as_ref(), request, user_id, consent).await;
        guard.armed = false;

        let mut state = self.lock()?;
        let current = state.in_flight.as_ref().map(InFlight::generation);
        if current != Some(generation) {
            info!(generation, current = state.generation, "Discarding stale analysis response");
            return Ok(DispatchOutcome::Discarded);
        }
        let finished = state.in_flight.take();

        match outcome {
            Ok(result) => {
                let kind = result.kind();
                let result_id = result.id().to_string();
                debug!(
                    generation,
                    last_percent = finished.as_ref().map(|f| f.ticker.percent()),
                    "Progress ticker released"
                );
                drop(finished);

                state.abort_validators();
                state.image = None;
                state.share_gate = SharingGate::new();
                state.result = Some(result.clone());
                info!(generation, %kind, result_id = %result_id, "Analysis result ready");
                self.sink.emit(ScanEvent::ResultReady {
                    generation,
                    kind,
                    result_id,
                });
                Ok(DispatchOutcome::Completed(result))
            }
            Err(err) => {
                drop(finished);
                warn!(generation, error = %err, "Analysis request failed");
                Err(self.fail(ScanError::Dispatch(err)))
            }
        }
    }

    /// Hard reset: clear input, verdicts, result and progress, and discard
    /// interest in any outstanding request.
    pub fn reset(&self) -> Result<(), ScanError> {
        let mut state = self.lock()?;
        state.abort_validators();
        if let Some(in_flight) = state.in_flight.take() {
            info!(
                generation = in_flight.generation(),
                kind = %in_flight.kind,
                "Abandoning outstanding analysis"
            );
        }
        let generation = state.generation + 1;
        let attach_seq = state.attach_seq + 1;
        *state = PipelineState {
            generation,
            attach_seq,
            ..PipelineState::default()
        };
        info!(generation, "Scan pipeline reset");
        self.sink.emit(ScanEvent::Reset { generation });
        self.sink.emit(state.input_changed());
        Ok(())
    }

    // ── Sharing ──────────────────────────────────────────

    pub fn open_share_dialog(&self) -> Result<(), ScanError> {
        let mut state = self.lock()?;
        if state.result.is_none() {
            return Err(ScanError::NoResult);
        }
        state.share_gate.open();
        Ok(())
    }

    /// Returns `false` when the dialog is closed.
    pub fn set_share_consent(&self, consent: bool) -> Result<bool, ScanError> {
        Ok(self.lock()?.share_gate.set_consent(consent))
    }

    /// Returns `false` when the dialog is closed.
    pub fn acknowledge_share(&self, acknowledged: bool) -> Result<bool, ScanError> {
        Ok(self.lock()?.share_gate.set_acknowledged(acknowledged))
    }

    pub fn cancel_share(&self) -> Result<(), ScanError> {
        self.lock()?.share_gate.cancel();
        Ok(())
    }

    /// Confirm the dialog and issue one share request for the current result.
    ///
    /// Without acknowledgment nothing is sent. A failed request is reported
    /// as a warning and the result stays visible.
    pub async fn confirm_share(&self) -> Result<SharingDecision, ScanError> {
        let (result_id, decision) = {
            let mut state = self.lock()?;
            let result_id = match &state.result {
                Some(result) => result.id().to_string(),
                None => return Err(ScanError::NoResult),
            };
            let decision = state.share_gate.confirm()?;
            (result_id, decision)
        };

        info!(result_id = %result_id, consent = decision.consent, "Sharing result");
        match self.backend.share_result(result_id.clone(), decision.consent).await {
            Ok(()) => {
                self.sink.emit(ScanEvent::Shared {
                    result_id,
                    consent: decision.consent,
                });
                Ok(decision)
            }
            Err(err) => {
                warn!(result_id = %result_id, error = %err, "Share request failed");
                Err(self.fail(ScanError::Share(err)))
            }
        }
    }

    // ── Queries ──────────────────────────────────────────

    pub fn phase(&self) -> Result<PipelinePhase, ScanError> {
        Ok(self.lock()?.phase(self.config.min_symptom_chars))
    }

    /// Whether the "Start Analysis" trigger is enabled.
    pub fn can_analyze(&self) -> Result<bool, ScanError> {
        Ok(self.lock()?.can_analyze(self.config.min_symptom_chars))
    }

    pub fn snapshot(&self) -> Result<ScanSnapshot, ScanError> {
        let state = self.lock()?;
        let min_chars = self.config.min_symptom_chars;
        Ok(ScanSnapshot {
            phase: state.phase(min_chars),
            mode: state.mode,
            symptoms: state.symptoms.clone(),
            image: state.image.clone(),
            progress: state.in_flight.as_ref().map(|f| f.ticker.percent()),
            result: state.result.clone(),
            share_gate: state.share_gate.state(),
            can_analyze: state.can_analyze(min_chars),
            generation: state.generation,
        })
    }

    /// What the UI should render right now.
    pub fn view(&self) -> Result<ScanView, ScanError> {
        Ok(route(&self.snapshot()?))
    }
}

/// Clears the in-flight record if `analyze()` is dropped mid-request.
struct InFlightGuard<'a> {
    pipeline: &'a ScanPipeline,
    generation: u64,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.pipeline.lock() {
            if state.in_flight.as_ref().map(InFlight::generation) == Some(self.generation) {
                state.in_flight = None;
                warn!(generation = self.generation, "Analysis abandoned by caller");
            }
        }
    }
}

/// Verdict for a payload the quality check could not decode.
fn unreadable_report() -> QualityReport {
    QualityReport {
        verdict: QualityVerdict::Poor,
        sharpness: 0.0,
        contrast: 0.0,
        brightness: 0.0,
        issues: vec![QualityIssue::Unreadable],
    }
}
