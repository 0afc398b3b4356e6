//! Processing orchestrator.
//!
//! [`PreviewController`] owns the lifecycle of a processing session:
//! validation, quota reservation, cache lookup, dispatch to the right
//! adapter and publication of [`PreviewState`] on a watch channel. At most
//! one session is live; starting a new one cancels the previous one and
//! releases its handles.

use anyhow::Context;
use serde_json::json;
use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adapters::{
    DocumentAdapter, InferenceClient, OpenAiDocument, OpenAiSpeech, OpenAiTextAnalysis,
    OpenAiVision, SpeechAdapter, TextAnalysisAdapter, VisionAdapter,
};
use crate::audio::{ChunkedAudioProcessor, DurationProbe, FfprobeDurationProbe, NoopDurationProbe};
use crate::cache::{FileStore, ResultCache};
use crate::config::{Config, LimitsConfig};
use crate::content::{ContentKind, ContentUnit, ServiceResult};
use crate::handles::{HandleRegistry, SessionId};
use crate::quota::{CurrentUser, QuotaGate, RestQuotaStore};
use crate::resolver::{validate_url, ContentResolver, HttpResolver};
use crate::utils::{format_file_size, word_count};
use crate::{ProcessingError, Result};

mod state;

pub use state::{PreviewState, ProcessingState};


/// The inference services a controller dispatches to
#[derive(Clone)]
pub struct Adapters {
    pub speech: Arc<dyn SpeechAdapter>,
    pub vision: Arc<dyn VisionAdapter>,
    pub document: Arc<dyn DocumentAdapter>,
    pub text: Arc<dyn TextAnalysisAdapter>,
}

impl Adapters {
    /// Wire every adapter to one OpenAI-compatible endpoint
    pub fn openai(config: &Config, api_key: &str) -> anyhow::Result<Self> {
        let inference = &config.inference;
        let client = InferenceClient::new(&inference.base_url, api_key, inference.request_timeout())
            .context("Failed to build inference HTTP client")?;
        let sampling = inference.sampling();

        Ok(Self {
            speech: Arc::new(OpenAiSpeech::new(
                client.clone(),
                &inference.transcription_model,
                &inference.speech_model,
            )),
            vision: Arc::new(OpenAiVision::new(client.clone(), &inference.vision_model, sampling)),
            document: Arc::new(OpenAiDocument::new(client.clone(), &inference.document_model, sampling)),
            text: Arc::new(OpenAiTextAnalysis::new(client, &inference.text_model, sampling)),
        })
    }
}

/// Identity and budget of one run
#[derive(Clone)]
struct Session {
    id: SessionId,
    cancel: CancellationToken,
    deadline: Instant,
}

struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
    /// Image of a completed session, kept for follow-up questions
    image: Option<Arc<ContentUnit>>,
}

struct Processed {
    result: ServiceResult,
    from_cache: bool,
}

pub struct PreviewController {
    adapters: Adapters,
    resolver: Arc<dyn ContentResolver>,
    cache: Option<ResultCache>,
    quota: Option<QuotaGate>,
    user: Option<CurrentUser>,
    handles: HandleRegistry,
    limits: LimitsConfig,
    probe: Arc<dyn DurationProbe>,
    voice: Option<String>,
    active: Mutex<Option<ActiveSession>>,
    next_session: AtomicU64,
    state_tx: watch::Sender<PreviewState>,
}

impl PreviewController {
    pub fn new(adapters: Adapters, resolver: Arc<dyn ContentResolver>) -> std::io::Result<Self> {
        let (state_tx, _) = watch::channel(PreviewState::new(0));

        Ok(Self {
            adapters,
            resolver,
            cache: None,
            quota: None,
            user: None,
            handles: HandleRegistry::new()?,
            limits: LimitsConfig::default(),
            probe: Arc::new(NoopDurationProbe),
            voice: None,
            active: Mutex::new(None),
            next_session: AtomicU64::new(0),
            state_tx,
        })
    }

    /// Build a controller from configuration, with real HTTP adapters
    pub fn from_config(config: &Config, api_key: &str, user: Option<CurrentUser>) -> anyhow::Result<Self> {
        let adapters = Adapters::openai(config, api_key)?;

        let http = reqwest::Client::builder()
            .timeout(config.inference.request_timeout())
            .build()
            .context("Failed to build download HTTP client")?;
        let resolver = HttpResolver::with_client(http).with_max_size(config.limits.max_file_size);

        let mut controller = Self::new(adapters, Arc::new(resolver))
            .context("Failed to create handle directory")?
            .with_limits(config.limits.clone())
            .with_duration_probe(Arc::new(FfprobeDurationProbe::new(&config.audio.ffprobe_path)));

        if config.audio.synthesize {
            controller = controller.with_voice(Some(config.inference.voice.clone()));
        }

        if config.cache.enabled {
            let store = FileStore::new(config.cache.resolved_directory()?);
            let cache = ResultCache::new(Arc::new(store))
                .with_ttl(config.cache.ttl())
                .with_version(config.cache.version.clone());
            controller = controller.with_cache(cache);
        }

        if let Some(quota) = &config.quota {
            let key = config.quota_api_key().unwrap_or_default();
            let gate = QuotaGate::new(Arc::new(RestQuotaStore::new(&quota.base_url, &key)));
            controller = controller.with_quota(gate, user);
        }

        Ok(controller)
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Charge processing against `gate` on behalf of `user`
    pub fn with_quota(mut self, gate: QuotaGate, user: Option<CurrentUser>) -> Self {
        self.quota = Some(gate);
        self.user = user;
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_duration_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Voice used to narrate audio transcripts; `None` disables narration
    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PreviewState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state_tx.subscribe()
    }

    /// Number of local handles currently alive
    pub fn live_handles(&self) -> usize {
        self.handles.live_count()
    }

    /// Process a local content unit, superseding any running session
    pub async fn process_file(&self, content: ContentUnit) -> Result<ServiceResult> {
        let session = self.begin_session();
        self.run(&session, content).await
    }

    /// Resolve a URL and process what it points to
    pub async fn process_url(&self, url: &str) -> Result<ServiceResult> {
        let session = self.begin_session();
        self.publish(session.id, |state| state.status = ProcessingState::Validating);

        let resolved = match validate_url(url) {
            Ok(parsed) => {
                self.guarded(&session, self.resolver.resolve(parsed.as_str()))
                    .await
            }
            Err(e) => Err(e),
        };

        match resolved {
            Ok(content) => self.run(&session, content).await,
            Err(e) => {
                let mut active = self.lock_active();
                self.settle(&mut active, &session, None, "", Err(e))
            }
        }
    }

    /// Answer a question about the image of the last completed session
    pub async fn ask_about_image(&self, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(ProcessingError::Validation("Question must not be empty".to_string()));
        }

        let (image, cancel) = {
            let active = self.lock_active();
            match active.as_ref() {
                Some(ActiveSession { image: Some(image), cancel, .. }) => (image.clone(), cancel.clone()),
                _ => {
                    return Err(ProcessingError::Validation(
                        "No analyzed image to ask about".to_string(),
                    ))
                }
            }
        };

        tracing::info!("Asking about {}: {}", image.name(), question);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProcessingError::Cancelled),
            answer = self.adapters.vision.answer_question(&image, question) => answer,
        }
    }

    /// Cancel the active session. Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        let active = self.lock_active();
        let Some(session) = active.as_ref() else {
            return false;
        };

        let finished = self.state_tx.borrow().status.is_terminal();
        if finished || session.cancel.is_cancelled() {
            return false;
        }

        session.cancel.cancel();
        self.handles.release_session(session.id);
        self.publish(session.id, |state| {
            state.status = ProcessingState::Cancelled;
            state.progress = 0;
            state.original = None;
            state.audio_url = None;
        });
        tracing::info!(session = session.id, "Processing cancelled");

        true
    }

    /// Drop the active session and every handle, returning to `Idle`
    pub fn reset(&self) {
        let mut active = self.lock_active();
        if let Some(session) = active.take() {
            session.cancel.cancel();
        }

        let released = self.handles.release_all();
        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.state_tx.send_replace(PreviewState::new(id));
        tracing::debug!(released, "Controller reset");
    }

    fn begin_session(&self) -> Session {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + self.limits.processing_timeout();

        let mut active = self.lock_active();
        let current = ActiveSession {
            id,
            cancel: cancel.clone(),
            image: None,
        };
        if let Some(previous) = active.replace(current) {
            previous.cancel.cancel();
            self.handles.release_session(previous.id);
            tracing::info!(session = previous.id, "Superseded by session {}", id);
        }
        self.state_tx.send_replace(PreviewState::new(id));

        Session { id, cancel, deadline }
    }

    async fn run(&self, session: &Session, content: ContentUnit) -> Result<ServiceResult> {
        let content = Arc::new(content);
        let key = content.fingerprint();

        tracing::info!(
            session = session.id,
            kind = %content.kind(),
            "Processing {} ({})",
            content.name(),
            format_file_size(content.size())
        );

        let outcome = self.execute(session, &content, &key).await;

        let mut active = self.lock_active();
        self.settle(&mut active, session, Some(&content), &key, outcome)
    }

    async fn execute(&self, session: &Session, content: &Arc<ContentUnit>, key: &str) -> Result<Processed> {
        self.publish(session.id, |state| {
            state.status = ProcessingState::Validating;
            state.content_type = Some(content.kind());
            state.mime_type = Some(content.mime_type().to_string());
        });

        self.validate(content)?;

        // Every run is charged, including ones served from the cache
        self.guarded(session, self.reserve_quota(content.kind())).await?;

        let original = self.handles.create(session.id, content.name(), content.data())?;

        if let Some(entry) = self.cache.as_ref().and_then(|cache| cache.get(key)) {
            tracing::info!(session = session.id, "Cache hit for {}", key);
            self.publish(session.id, |state| {
                state.status = ProcessingState::CacheHit;
                state.original = Some(original);
            });
            return Ok(Processed {
                result: entry.data,
                from_cache: true,
            });
        }

        self.publish(session.id, |state| {
            state.status = ProcessingState::Dispatching;
            state.original = Some(original);
        });

        let result = self.guarded(session, self.dispatch(session, content)).await?;

        Ok(Processed {
            result,
            from_cache: false,
        })
    }

    /// Reject content before any network call or quota use
    fn validate(&self, content: &ContentUnit) -> Result<()> {
        let size = content.size();

        if size > self.limits.max_file_size {
            return Err(ProcessingError::Validation(format!(
                "File size exceeds limit ({} > {})",
                format_file_size(size),
                format_file_size(self.limits.max_file_size)
            )));
        }

        match content.kind() {
            ContentKind::Unknown => {
                let mime = if content.mime_type().is_empty() {
                    "unknown"
                } else {
                    content.mime_type()
                };
                Err(ProcessingError::UnsupportedFileType(mime.to_string()))
            }
            ContentKind::Audio if size > self.limits.max_audio_size => {
                Err(ProcessingError::Validation(format!(
                    "File size exceeds limit ({} > {} for audio)",
                    format_file_size(size),
                    format_file_size(self.limits.max_audio_size)
                )))
            }
            _ => Ok(()),
        }
    }

    async fn reserve_quota(&self, kind: ContentKind) -> Result<()> {
        let Some(gate) = &self.quota else {
            return Ok(());
        };
        let Some(quota_type) = kind.quota_type() else {
            return Ok(());
        };
        let Some(user) = &self.user else {
            return Err(ProcessingError::AuthenticationRequired);
        };

        if gate.check_and_reserve(&user.id, quota_type).await {
            Ok(())
        } else {
            Err(ProcessingError::QuotaExceeded(quota_type))
        }
    }

    /// Race `work` against cancellation and the session deadline
    async fn guarded<T>(&self, session: &Session, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(ProcessingError::Cancelled),
            _ = tokio::time::sleep_until(session.deadline) => {
                session.cancel.cancel();
                Err(ProcessingError::Timeout(self.limits.processing_timeout()))
            }
            result = work => result,
        }
    }

    async fn dispatch(&self, session: &Session, content: &ContentUnit) -> Result<ServiceResult> {
        match content.kind() {
            ContentKind::Audio => self.process_audio(session, content).await,
            ContentKind::Image => self.process_image(content).await,
            ContentKind::Pdf => self.process_pdf(content).await,
            ContentKind::Unknown => Err(ProcessingError::UnsupportedFileType(
                content.mime_type().to_string(),
            )),
        }
    }

    async fn process_audio(&self, session: &Session, content: &ContentUnit) -> Result<ServiceResult> {
        let processor = ChunkedAudioProcessor::new(self.adapters.speech.clone(), self.probe.clone())
            .with_chunk_size(self.limits.chunk_size)
            .with_voice(self.voice.clone());

        let report = |progress: u8| {
            self.publish(session.id, |state| state.progress = progress);
        };

        processor.process(content, &session.cancel, &report).await
    }

    async fn process_image(&self, content: &ContentUnit) -> Result<ServiceResult> {
        let analysis = self.adapters.vision.analyze(content).await?;

        let dimensions = image_dimensions(content.data());
        if dimensions.is_none() {
            tracing::debug!("Could not read dimensions of {}", content.name());
        }

        let mut accessible = analysis.caption.trim().to_string();
        if let Some(text) = analysis.extracted_text.as_deref().filter(|t| !t.trim().is_empty()) {
            accessible.push_str("\n\nText in image: ");
            accessible.push_str(text.trim());
        }

        let details = json!({
            "caption": analysis.caption,
            "tags": analysis.tags,
            "extractedText": analysis.extracted_text,
            "width": dimensions.map(|(w, _)| w),
            "height": dimensions.map(|(_, h)| h),
            "format": content.format(),
            "size": content.size(),
        });

        Ok(ServiceResult {
            accessible,
            analysis: serde_json::to_string_pretty(&details).unwrap_or_else(|_| details.to_string()),
            audio: None,
        })
    }

    async fn process_pdf(&self, content: &ContentUnit) -> Result<ServiceResult> {
        let document = self.adapters.document.parse(content).await?;

        let simplified = match document.simplified_text.as_deref() {
            Some(text) if !text.trim().is_empty() => Some(text.to_string()),
            _ if !document.text.trim().is_empty() => match self.adapters.text.simplify(&document.text).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!("Plain-language rewrite unavailable, using extracted text: {}", e);
                    None
                }
            },
            _ => None,
        };

        let summary = match document.summary.as_deref() {
            Some(text) if !text.trim().is_empty() => Some(text.to_string()),
            _ if !document.text.trim().is_empty() => match self.adapters.text.summarize(&document.text).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!("Summary unavailable: {}", e);
                    None
                }
            },
            _ => None,
        };

        let details = json!({
            "pageCount": document.page_count(),
            "title": document.metadata.title,
            "author": document.metadata.author,
            "summary": summary,
            "wordCount": word_count(&document.text),
            "simplified": simplified.is_some(),
            "format": content.format(),
            "size": content.size(),
        });

        Ok(ServiceResult {
            accessible: simplified.unwrap_or(document.text),
            analysis: serde_json::to_string_pretty(&details).unwrap_or_else(|_| details.to_string()),
            audio: None,
        })
    }

    /// Turn the outcome of a session into published state. Runs under the
    /// session lock so a concurrent supersession cannot interleave.
    fn settle(
        &self,
        active: &mut Option<ActiveSession>,
        session: &Session,
        content: Option<&Arc<ContentUnit>>,
        key: &str,
        outcome: Result<Processed>,
    ) -> Result<ServiceResult> {
        let Some(current) = active.as_mut().filter(|a| a.id == session.id) else {
            self.handles.release_session(session.id);
            tracing::debug!(session = session.id, "Discarding result of superseded session");
            return Err(ProcessingError::Cancelled);
        };

        // Work that finished after an explicit cancel is still discarded
        let outcome = match outcome {
            Ok(_) if session.cancel.is_cancelled() => Err(ProcessingError::Cancelled),
            other => other,
        };

        match outcome {
            Ok(processed) => {
                if !processed.from_cache {
                    if let Some(cache) = &self.cache {
                        cache.put(key, &processed.result);
                    }
                }

                let audio_url = processed.result.audio.as_ref().and_then(|audio| {
                    let name = format!("narration.{}", audio.extension());
                    match self.handles.create(session.id, &name, &audio.data) {
                        Ok(uri) => Some(uri),
                        Err(e) => {
                            tracing::warn!(session = session.id, "Could not store narration: {}", e);
                            None
                        }
                    }
                });

                let result = processed.result.clone();
                self.publish(session.id, move |state| {
                    state.status = ProcessingState::Completed;
                    state.progress = 100;
                    state.accessible = processed.result.accessible;
                    state.analysis = processed.result.analysis;
                    state.audio_url = audio_url;
                    state.error = None;
                });

                if let Some(content) = content.filter(|c| c.kind() == ContentKind::Image) {
                    current.image = Some(content.clone());
                }

                tracing::info!(session = session.id, "Processing completed");
                Ok(result)
            }
            Err(ProcessingError::Cancelled) => {
                self.handles.release_session(session.id);
                Err(ProcessingError::Cancelled)
            }
            Err(e) => {
                let timed_out = matches!(e, ProcessingError::Timeout(_));
                if timed_out {
                    self.handles.release_session(session.id);
                }

                tracing::warn!(session = session.id, kind = ?e.kind(), "Processing failed: {}", e);
                let message = e.to_string();
                self.publish(session.id, |state| {
                    state.status = ProcessingState::Failed;
                    state.progress = 0;
                    state.error = Some(message);
                    if timed_out {
                        state.original = None;
                    }
                });

                Err(e)
            }
        }
    }

    /// Apply `update` unless a newer session owns the state
    fn publish(&self, session: SessionId, update: impl FnOnce(&mut PreviewState)) -> bool {
        self.state_tx.send_if_modified(|state| {
            if state.session != session {
                return false;
            }
            update(state);
            true
        })
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        if let Some(session) = self.lock_active().take() {
            session.cancel.cancel();
        }
    }
}

/// Width and height read from the image header
fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
