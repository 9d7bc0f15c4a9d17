//! # Lifecycle Controller
//!
//! The single state machine an embedding UI talks to. It owns the capture
//! source exclusively and glues the other components together:
//!
//! ```text
//! Idle ──select_source──▶ SourceReady ──start_capture──▶ Capturing
//!   ▲                        (preview)                       │
//!   └────────────── stop_capture / teardown ◀────────────────┘
//! ```
//!
//! Every exit path — local stop, restart, teardown, or the device being
//! revoked externally — funnels through the same cleanup routine, which
//! stops both loops and releases the device. No device handle outlives the
//! controller.
//!
//! Cross-component data flow is an explicit [`ControllerEvent`] channel
//! handed out at construction, not ambient broadcasting: preview frames,
//! capture receipts, revocation, and user-facing errors all arrive there.

use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::cache::ScreenshotCache;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::{CompressedImage, SourceKind};
use crate::preview::PreviewLoop;
use crate::scheduler::{CaptureScheduler, SchedulerContext, SchedulerStats};
use crate::source::{SharedSource, SourceAcquirer};
use crate::store::{FrameAnalyzer, ScreenshotStore};

/// Notifications the core delivers to its embedder.
#[derive(Debug)]
pub enum ControllerEvent {
    /// A fresh preview frame, one per successful preview tick.
    PreviewFrame(CompressedImage),
    /// One screenshot made it through capture → compress → persist.
    ScreenshotCaptured {
        id: u64,
        /// 1-based position within the current run; resets on restart.
        index: u64,
        timestamp: SystemTime,
        /// Present when real-time analysis ran and succeeded.
        description: Option<String>,
        thumbnail: Option<CompressedImage>,
    },
    /// The device ended outside our stop path; the embedder should call
    /// [`CaptureController::handle_source_ended`].
    SourceEnded,
    /// A user-facing error condition (persistence or analysis failure).
    Error(String),
}

pub type EventSender = mpsc::UnboundedSender<ControllerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ControllerEvent>;

/// Observable controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    /// A source is acquired and previewing.
    SourceReady,
    Capturing,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::SourceReady => "source-ready",
            ControllerState::Capturing => "capturing",
        }
    }
}

/// Owner of one capture session's resources.
pub struct CaptureController {
    config: CaptureConfig,
    acquirer: Arc<dyn SourceAcquirer>,
    store: Arc<dyn ScreenshotStore>,
    analyzer: Option<Arc<dyn FrameAnalyzer>>,
    cache: Arc<ScreenshotCache>,
    session_id: u64,

    events_tx: EventSender,
    events_rx: Option<EventReceiver>,

    state: ControllerState,
    source: Option<SharedSource>,
    preview: Option<PreviewLoop>,
    scheduler: Option<CaptureScheduler>,
    stats: Arc<SchedulerStats>,
}

impl CaptureController {
    pub fn builder() -> CaptureControllerBuilder {
        CaptureControllerBuilder::new()
    }

    /// The event stream. Callable once; the controller keeps the sender.
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events_rx.take()
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Screenshots persisted in the current run.
    pub fn screenshot_count(&self) -> u64 {
        self.stats.captured()
    }

    pub fn cache(&self) -> &Arc<ScreenshotCache> {
        &self.cache
    }

    /// Acquire a source for the configured kind and start previewing it.
    ///
    /// Any prior source (including a running capture) is stopped and
    /// released first — re-selecting never stacks prompts on top of an
    /// active source. Returns the originally requested kind when the
    /// acquirer fell back to a different one, so the caller can decide
    /// whether the substitution is acceptable.
    ///
    /// On failure the controller is back in `Idle` with no half-initialized
    /// source; the acquirer guarantees no dangling device handle.
    pub async fn select_source(&mut self) -> CaptureResult<Option<SourceKind>> {
        self.release_current().await;

        let acquisition = self.acquirer.acquire(self.config.source_kind).await?;
        let fallback = acquisition.fallback_from();
        if let Some(requested) = fallback {
            warn!(
                "requested {} capture, granted {} instead",
                requested,
                acquisition.granted_kind()
            );
        }
        let source: SharedSource = Arc::new(tokio::sync::Mutex::new(acquisition.source()));
        self.preview = Some(PreviewLoop::start(
            Arc::clone(&source),
            self.events_tx.clone(),
            self.config.preview_interval_ms,
        ));
        self.source = Some(source);
        self.state = ControllerState::SourceReady;
        info!("source selected, previewing");
        Ok(fallback)
    }

    /// Begin the committed capture run.
    ///
    /// Requires an actively previewing source; refuses — without changing
    /// state and without touching the acquirer — when there is none. On
    /// success the preview loop stops (capture takes over polling) and the
    /// scheduler starts.
    pub fn start_capture(&mut self) -> CaptureResult<()> {
        if self.state != ControllerState::SourceReady || self.source.is_none() {
            return Err(CaptureError::PreviewNotActive {
                state: self.state.as_str().to_string(),
            });
        }
        if let Some(mut preview) = self.preview.take() {
            preview.stop();
        }
        let source = Arc::clone(self.source.as_ref().expect("checked above"));
        self.stats.reset();
        self.scheduler = Some(CaptureScheduler::start_with_stats(
            SchedulerContext {
                source,
                store: Arc::clone(&self.store),
                analyzer: self.analyzer.clone(),
                cache: Arc::clone(&self.cache),
                events: self.events_tx.clone(),
                config: self.config.clone(),
                session_id: self.session_id,
            },
            Arc::clone(&self.stats),
        ));
        self.state = ControllerState::Capturing;
        info!("capture started");
        Ok(())
    }

    /// Stop whatever is running and release the device. Safe to call
    /// redundantly from any state; this is the cleanup routine every exit
    /// path shares.
    pub async fn stop_capture(&mut self) {
        self.release_current().await;
    }

    /// Discard the current run and begin again: stop, clear accumulated
    /// screenshots and counters, acquire a fresh source, start capturing.
    pub async fn restart_capture(&mut self) -> CaptureResult<Option<SourceKind>> {
        self.release_current().await;
        self.stats.reset();
        self.cache.clear();
        let fallback = self.select_source().await?;
        self.start_capture()?;
        Ok(fallback)
    }

    /// React to the device being revoked externally (user clicked "stop
    /// sharing" in OS chrome, display unplugged). Identical to a local
    /// [`stop_capture`](Self::stop_capture) — same routine, different
    /// trigger.
    pub async fn handle_source_ended(&mut self) {
        info!("source ended externally, cleaning up");
        self.release_current().await;
    }

    /// Unconditional cleanup for component teardown, regardless of state.
    pub async fn teardown(&mut self) {
        self.release_current().await;
    }

    async fn release_current(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        if let Some(mut preview) = self.preview.take() {
            preview.stop();
        }
        if let Some(source) = self.source.take() {
            let mut guard = source.lock().await;
            guard.release();
            debug!("capture source released");
        }
        self.state = ControllerState::Idle;
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        // Best-effort synchronous cleanup: stop both loops, then release the
        // device if no in-flight tick holds it (a holder's own teardown drops
        // it otherwise via the source's Drop).
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        if let Some(mut preview) = self.preview.take() {
            preview.stop();
        }
        if let Some(source) = self.source.take() {
            if let Ok(mut guard) = source.try_lock() {
                guard.release();
            }
        }
    }
}

/// Fluent construction for [`CaptureController`].
pub struct CaptureControllerBuilder {
    config: CaptureConfig,
    acquirer: Option<Arc<dyn SourceAcquirer>>,
    store: Option<Arc<dyn ScreenshotStore>>,
    analyzer: Option<Arc<dyn FrameAnalyzer>>,
    session_id: u64,
}

impl CaptureControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: CaptureConfig::default(),
            acquirer: None,
            store: None,
            analyzer: None,
            session_id: 1,
        }
    }

    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_acquirer(mut self, acquirer: Arc<dyn SourceAcquirer>) -> Self {
        self.acquirer = Some(acquirer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ScreenshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn FrameAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_session(mut self, session_id: u64) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn build(self) -> CaptureResult<CaptureController> {
        self.config.validate()?;
        let acquirer = self
            .acquirer
            .ok_or_else(|| CaptureError::config("acquirer", "none", "a source acquirer is required"))?;
        let store = self
            .store
            .ok_or_else(|| CaptureError::config("store", "none", "a screenshot store is required"))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cache = Arc::new(ScreenshotCache::new(self.config.cache_capacity));
        Ok(CaptureController {
            config: self.config,
            acquirer,
            store,
            analyzer: self.analyzer,
            cache,
            session_id: self.session_id,
            events_tx,
            events_rx: Some(events_rx),
            state: ControllerState::Idle,
            source: None,
            preview: None,
            scheduler: None,
            stats: Arc::new(SchedulerStats::default()),
        })
    }
}

impl Default for CaptureControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
