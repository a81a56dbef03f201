use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::app::debounce::DebounceTimer;
use crate::app::model::{Extraction, ExtractionRequest, ExtractionResult, OrchestratorState};
use crate::archive::{ContentArchive, SavedContent};
use crate::backend::ExtractionBackend;
use crate::config::Config;
use crate::error::{ExtractError, TransportError};
use crate::formats::{
    ChapterInfo, ChapterLabel, CheckLockRequest, CheckStatus, Direction, NavigateRequest,
    ScrapeRequest, ScrapeStatus,
};
use crate::history::{HistoryCache, HistoryEntry};
use crate::kv_store::{KeyValueStore, LAST_URL_KEY};
use crate::navigator;
use crate::pattern::{self, ChapterPattern};
use crate::status::{Status, StatusKind, StatusReporter};

const NETWORK_ERROR_MESSAGE: &str = "Network error. Please try again.";
const CANCELLED_MESSAGE: &str = "Extraction cancelled. Please try again.";
const EXTRACTION_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct Session {
    state: OrchestratorState,
    input_url: String,
    pattern: Option<ChapterPattern>,
    chapter_info: Option<ChapterInfo>,
    force_mode: bool,
    auto_extract: bool,
    result: Option<ExtractionResult>,
    seq: u64,
}

impl Session {
    fn set_input(&mut self, url: &str) {
        if self.input_url != url {
            self.chapter_info = None;
        }
        self.input_url = url.to_owned();
        self.pattern = pattern::detect(url);
    }

    fn chapter_label(&self) -> ChapterLabel {
        if let Some(ChapterLabel::Known(n)) = self.chapter_info.as_ref().map(|i| i.current_chapter)
        {
            return ChapterLabel::Known(n);
        }
        self.pattern
            .as_ref()
            .map_or(ChapterLabel::Unknown, |p| ChapterLabel::Known(p.number))
    }
}

/// One user session: the extraction state machine plus the history and
/// status it owns.
///
/// Shared as `Arc<Orchestrator>` between the UI loop and the auto-extract
/// timer. At most one extraction is in flight; a second request made while
/// validating or extracting is rejected with [`ExtractError::Busy`].
pub struct Orchestrator {
    backend: Arc<dyn ExtractionBackend>,
    store: Arc<dyn KeyValueStore>,
    history: tokio::sync::Mutex<HistoryCache>,
    archive: ContentArchive,
    status: StatusReporter,
    extractions: broadcast::Sender<Extraction>,
    session: Mutex<Session>,
    auto_timer: DebounceTimer,
    request_timeout: Duration,
    auto_extract_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ExtractionBackend>,
        store: Arc<dyn KeyValueStore>,
        history: HistoryCache,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            archive: ContentArchive::new(Arc::clone(&store), config.archive_capacity),
            store,
            history: tokio::sync::Mutex::new(history),
            status: StatusReporter::new(config.status_clear_delay),
            extractions: broadcast::channel(EXTRACTION_CHANNEL_CAPACITY).0,
            session: Mutex::new(Session::default()),
            auto_timer: DebounceTimer::new(),
            request_timeout: config.request_timeout,
            auto_extract_delay: config.auto_extract_delay,
        })
    }

    /// Builds a session from persisted history and restores the last URL
    /// into the input without extracting it.
    pub async fn open(
        config: &Config,
        backend: Arc<dyn ExtractionBackend>,
        store: Arc<dyn KeyValueStore>,
    ) -> Arc<Self> {
        let history = HistoryCache::load(Arc::clone(&store), config.history_capacity).await;
        let last_url = match store.get(LAST_URL_KEY).await {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(?err, "load last url failed");
                None
            }
        };

        let orchestrator = Self::new(config, backend, store, history);
        if let Some(url) = last_url {
            tracing::debug!(%url, "restored last url");
            orchestrator.lock_session().set_input(url.trim());
        }
        orchestrator
    }

    pub fn state(&self) -> OrchestratorState {
        self.lock_session().state
    }

    pub fn status(&self) -> Status {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Every successful extraction, including ones started by the
    /// auto-extract timer.
    pub fn subscribe_extractions(&self) -> broadcast::Receiver<Extraction> {
        self.extractions.subscribe()
    }

    pub fn input_url(&self) -> String {
        self.lock_session().input_url.clone()
    }

    pub fn pattern(&self) -> Option<ChapterPattern> {
        self.lock_session().pattern.clone()
    }

    pub fn chapter_info(&self) -> Option<ChapterInfo> {
        self.lock_session().chapter_info.clone()
    }

    pub fn chapter_label(&self) -> ChapterLabel {
        self.lock_session().chapter_label()
    }

    pub fn last_result(&self) -> Option<ExtractionResult> {
        self.lock_session().result.clone()
    }

    pub fn current_text(&self) -> Option<String> {
        match self.lock_session().result.as_ref()? {
            ExtractionResult::Success { text } => Some(text.clone()),
            ExtractionResult::Failure { .. } => None,
        }
    }

    /// Navigation needs a detected pattern.
    pub fn can_navigate(&self) -> bool {
        self.lock_session().pattern.is_some()
    }

    pub fn force_mode(&self) -> bool {
        self.lock_session().force_mode
    }

    pub fn set_force_mode(&self, enabled: bool) {
        self.lock_session().force_mode = enabled;
    }

    pub fn auto_extract(&self) -> bool {
        self.lock_session().auto_extract
    }

    pub fn set_auto_extract(&self, enabled: bool) {
        self.lock_session().auto_extract = enabled;
        if !enabled {
            self.auto_timer.cancel();
        }
        let message = if enabled {
            "Auto Extract mode enabled"
        } else {
            "Manual mode enabled"
        };
        self.status.report(message, StatusKind::Success);
    }

    pub fn auto_extract_pending(&self) -> bool {
        self.auto_timer.is_armed()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().await.list().to_vec()
    }

    pub async fn saved_content(&self) -> anyhow::Result<Vec<SavedContent>> {
        self.archive.list().await
    }

    pub async fn clear_history(&self) -> anyhow::Result<()> {
        self.history.lock().await.clear().await?;
        self.status.report("History cleared", StatusKind::Success);
        Ok(())
    }

    /// Records an input change from the UI. Any pending auto-extract is
    /// cancelled; with auto-extract on, a valid URL re-arms it.
    pub fn set_input(self: &Arc<Self>, raw: &str) {
        let url = raw.trim().to_owned();
        if self.auto_timer.cancel() {
            tracing::debug!("cancelled pending auto-extract");
        }

        let arm = {
            let mut session = self.lock_session();
            session.set_input(&url);
            session.auto_extract && is_valid_url(&url)
        };
        if !arm {
            return;
        }

        tracing::debug!(%url, delay = ?self.auto_extract_delay, "arming auto-extract");
        let this = Arc::clone(self);
        self.auto_timer
            .arm(self.auto_extract_delay, move || async move {
                this.fire_auto_extract(&url).await;
            });
    }

    async fn fire_auto_extract(&self, expected_url: &str) {
        let force_mode = {
            let session = self.lock_session();
            if !session.auto_extract || session.input_url != expected_url {
                tracing::debug!(%expected_url, "input changed; skipping auto-extract");
                return;
            }
            session.force_mode
        };

        if let Err(err) = self.extract(expected_url, force_mode).await {
            tracing::debug!(kind = err.kind(), %err, "auto-extract failed");
        }
    }

    /// Extracts the current input with the current force mode.
    pub async fn extract_input(&self) -> Result<Extraction, ExtractError> {
        let (url, force_mode) = {
            let session = self.lock_session();
            (session.input_url.clone(), session.force_mode)
        };
        self.extract(&url, force_mode).await
    }

    pub async fn extract(&self, url: &str, force_mode: bool) -> Result<Extraction, ExtractError> {
        let (request, _in_flight) = self.begin(url, force_mode)?;
        tracing::info!(seq = request.seq, url = %request.url, force_mode, "extract");
        self.save_last_url(&request.url).await;

        let mut chapter = self.lock_session().chapter_label();

        if !force_mode {
            let check = CheckLockRequest {
                pattern: String::new(),
                url: request.url.clone(),
            };
            let response = match self.call(self.backend.check_lock(&check)).await {
                Ok(response) => response,
                Err(err) => return Err(self.fail(&request, err.into())),
            };

            if response.status != CheckStatus::Success {
                let message = response
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Unable to detect chapter pattern".to_string());
                return Err(self.fail(&request, ExtractError::Pattern(message)));
            }

            chapter = self.apply(&request, OrchestratorState::Validating, |session| {
                session.chapter_info = response.chapter_info.clone();
                session.state = OrchestratorState::Extracting;
                session.chapter_label()
            })?;
            tracing::debug!(
                seq = request.seq,
                %chapter,
                auto_detected = response.auto_detected,
                "pattern validated"
            );
            self.remember(&request.url, chapter).await;

            let message = if response.auto_detected {
                "Auto-detected pattern, extracting..."
            } else {
                "Pattern validated, extracting..."
            };
            self.status.report(message, StatusKind::Loading);
        }

        let scrape = ScrapeRequest {
            url: request.url.clone(),
            force: force_mode,
        };
        let response = match self.call(self.backend.scrape(&scrape)).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(&request, err.into())),
        };

        let message = response.message.filter(|m| !m.trim().is_empty());
        let err = match response.status {
            ScrapeStatus::Success if !response.content.trim().is_empty() => None,
            ScrapeStatus::Success | ScrapeStatus::NoContent => Some(ExtractError::Backend(
                message.unwrap_or_else(|| "No textual content found".to_string()),
            )),
            ScrapeStatus::NoPattern => Some(ExtractError::Pattern(
                message.unwrap_or_else(|| "No pattern detected. Try Force Extract.".to_string()),
            )),
            ScrapeStatus::Error => Some(ExtractError::Backend(
                message.unwrap_or_else(|| "Failed to extract content".to_string()),
            )),
        };
        if let Some(err) = err {
            // The backend answered, so the attempt still counts as visited.
            let err = self.fail(&request, err);
            if !matches!(err, ExtractError::Superseded) {
                self.remember(&request.url, chapter).await;
            }
            return Err(err);
        }

        let text = response.content;
        self.apply(&request, OrchestratorState::Extracting, |session| {
            session.state = OrchestratorState::Success;
            session.result = Some(ExtractionResult::Success { text: text.clone() });
        })?;
        self.remember(&request.url, chapter).await;

        let message = if force_mode {
            "Content extracted successfully (force mode)!"
        } else {
            "Content extracted successfully!"
        };
        self.status.report(message, StatusKind::Success);

        let extraction = Extraction {
            url: request.url,
            text,
            chapter,
            forced: force_mode,
        };
        tracing::info!(seq = request.seq, words = extraction.word_count(), %chapter, "extracted");
        if let Err(err) = self.archive.record(&extraction).await {
            tracing::warn!(?err, url = %extraction.url, "save content failed");
        }
        // No subscribers is fine.
        let _ = self.extractions.send(extraction.clone());
        Ok(extraction)
    }

    /// Steps the detected chapter pattern by `delta` and extracts the result.
    pub async fn navigate(&self, delta: i64) -> Result<Extraction, ExtractError> {
        let (pattern, force_mode) = {
            let session = self.lock_session();
            if session.state.is_busy() {
                return Err(ExtractError::Busy);
            }
            (session.pattern.clone(), session.force_mode)
        };

        let Some(pattern) = pattern else {
            return Err(self.boundary("No chapter pattern detected; navigation is unavailable"));
        };
        let Some(url) = navigator::step(&pattern, delta) else {
            return Err(self.boundary("No such chapter"));
        };

        tracing::debug!(from = pattern.number, delta, %url, "navigate");
        self.replace_input(&url);
        self.extract(&url, force_mode).await
    }

    /// Asks the backend for the sibling page and extracts it. Works for URLs
    /// without a detectable pattern, since the backend follows page links.
    pub async fn follow(&self, direction: Direction) -> Result<Extraction, ExtractError> {
        let (request, force_mode) = {
            let mut session = self.lock_session();
            if session.state.is_busy() {
                return Err(ExtractError::Busy);
            }
            let current_url = session.input_url.clone();
            if current_url.is_empty() {
                drop(session);
                return Err(self.reject_input("Please enter a URL"));
            }
            session.seq += 1;
            session.state = OrchestratorState::Validating;
            let request = ExtractionRequest {
                seq: session.seq,
                url: current_url,
                force_mode: session.force_mode,
            };
            (request, session.force_mode)
        };
        let _in_flight = InFlight::new(self, request.seq);

        self.status
            .report(format!("Looking for the {direction} page..."), StatusKind::Loading);
        let navigate = NavigateRequest {
            direction,
            current_url: request.url.clone(),
        };
        let response = match self.call(self.backend.navigate(&navigate)).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(&request, err.into())),
        };

        let new_url = response
            .new_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty() && response.status == CheckStatus::Success)
            .map(str::to_owned);
        let Some(new_url) = new_url else {
            self.apply(&request, OrchestratorState::Validating, |session| {
                session.state = OrchestratorState::Idle;
            })?;
            let message = response
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("No {direction} link found."));
            return Err(self.boundary(&message));
        };

        tracing::debug!(%new_url, chapter = %response.chapter, "backend navigation");
        self.apply(&request, OrchestratorState::Validating, |session| {
            session.state = OrchestratorState::Idle;
        })?;
        self.replace_input(&new_url);
        self.extract(&new_url, force_mode).await
    }

    fn begin(
        &self,
        url: &str,
        force_mode: bool,
    ) -> Result<(ExtractionRequest, InFlight<'_>), ExtractError> {
        let url = url.trim();
        let mut session = self.lock_session();
        if session.state.is_busy() {
            tracing::debug!(state = ?session.state, %url, "rejecting extract while busy");
            return Err(ExtractError::Busy);
        }

        if url.is_empty() {
            session.state = OrchestratorState::Error;
            drop(session);
            return Err(self.reject_input("Please enter a URL"));
        }
        if !is_valid_url(url) {
            session.state = OrchestratorState::Error;
            drop(session);
            return Err(self.reject_input("Please enter a valid http(s) URL"));
        }

        session.seq += 1;
        session.state = if force_mode {
            OrchestratorState::Extracting
        } else {
            OrchestratorState::Validating
        };
        session.set_input(url);
        let request = ExtractionRequest {
            seq: session.seq,
            url: url.to_owned(),
            force_mode,
        };
        drop(session);

        let message = if force_mode {
            "Force Extract enabled. Scraping directly..."
        } else {
            "Checking chapter pattern..."
        };
        self.status.report(message, StatusKind::Loading);
        let in_flight = InFlight::new(self, request.seq);
        Ok((request, in_flight))
    }

    /// Applies a response only if `request` is still the current one and the
    /// session is still in the phase that issued it.
    fn apply<T>(
        &self,
        request: &ExtractionRequest,
        expected: OrchestratorState,
        update: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, ExtractError> {
        let mut session = self.lock_session();
        if session.seq != request.seq || session.state != expected {
            tracing::warn!(
                seq = request.seq,
                current_seq = session.seq,
                state = ?session.state,
                "discarding stale response"
            );
            return Err(ExtractError::Superseded);
        }
        Ok(update(&mut session))
    }

    fn fail(&self, request: &ExtractionRequest, err: ExtractError) -> ExtractError {
        let reason = match &err {
            ExtractError::Transport(_) => NETWORK_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        };

        {
            let mut session = self.lock_session();
            if session.seq != request.seq || !session.state.is_busy() {
                tracing::warn!(seq = request.seq, %err, "dropping failure for stale request");
                return ExtractError::Superseded;
            }
            session.state = OrchestratorState::Error;
            session.result = Some(ExtractionResult::Failure {
                reason: reason.clone(),
            });
        }

        tracing::warn!(seq = request.seq, url = %request.url, kind = err.kind(), %err, "extract failed");
        self.status.report(reason, StatusKind::Error);
        err
    }

    fn boundary(&self, message: &str) -> ExtractError {
        self.status.report(message, StatusKind::Error);
        ExtractError::Boundary(message.to_string())
    }

    fn reject_input(&self, message: &str) -> ExtractError {
        self.status.report(message, StatusKind::Error);
        ExtractError::Input(message.to_string())
    }

    fn replace_input(&self, url: &str) {
        self.auto_timer.cancel();
        self.lock_session().set_input(url);
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.request_timeout)),
        }
    }

    async fn remember(&self, url: &str, chapter: ChapterLabel) {
        if let Err(err) = self.history.lock().await.add(url, chapter).await {
            tracing::warn!(?err, %url, "save history failed");
        }
    }

    async fn save_last_url(&self, url: &str) {
        if let Err(err) = self.store.set(LAST_URL_KEY, url).await {
            tracing::warn!(?err, %url, "save last url failed");
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held by the future driving request `seq`. If that future is dropped
/// before the request settles, the session leaves the busy state instead of
/// rejecting every later operation.
struct InFlight<'a> {
    orchestrator: &'a Orchestrator,
    seq: u64,
}

impl<'a> InFlight<'a> {
    fn new(orchestrator: &'a Orchestrator, seq: u64) -> Self {
        Self { orchestrator, seq }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut session = self.orchestrator.lock_session();
            if session.seq != self.seq || !session.state.is_busy() {
                return;
            }
            session.state = OrchestratorState::Error;
            session.result = Some(ExtractionResult::Failure {
                reason: CANCELLED_MESSAGE.to_string(),
            });
        }
        tracing::warn!(seq = self.seq, "request dropped before completion");
        self.orchestrator
            .status
            .report(CANCELLED_MESSAGE, StatusKind::Error);
    }
}

fn is_valid_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
