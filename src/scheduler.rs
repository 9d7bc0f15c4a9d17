//! # Capture Scheduler
//!
//! Produces the durable, timestamped screenshot sequence for a session.
//!
//! ## State machine
//!
//! `idle -> armed -> running -> idle`. Arming requires an actively
//! previewing source — the lifecycle controller enforces that precondition
//! before constructing a scheduler; it is a refusal, not best-effort.
//!
//! ## Tick semantics
//!
//! The first capture fires immediately on start (the first user-visible
//! screenshot must appear without delay); subsequent captures fire every
//! `interval_secs`. Within one tick the order is strict: frame pull →
//! compression → persistence → cache insert → event. Across ticks there is
//! no ordering guarantee — a slow save in tick N must not stall tick N+1's
//! capture, so only the frame pull happens on the timer loop; everything
//! after it runs on a task of its own (an open design choice; serialize in
//! the store if displayed ordering matters more than drift).
//!
//! A tick that cannot get a frame logs and skips; a tick whose compression,
//! save, or analysis fails logs and drops that screenshot. Neither stops
//! the interval. Only external device revocation ends the run, and even
//! then the scheduler just reports [`ControllerEvent::SourceEnded`] — the
//! controller owns the actual release.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{ScreenshotCache, derive_thumbnail};
use crate::compress::Compressor;
use crate::config::CaptureConfig;
use crate::controller::{ControllerEvent, EventSender};
use crate::error::CaptureError;
use crate::frame::{AnalysisStatus, FrameSample};
use crate::source::SharedSource;
use crate::store::{FrameAnalyzer, ScreenshotStore};

/// Counters for one scheduler run. Reset on restart.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    captured: AtomicU64,
    skipped: AtomicU64,
}

impl SchedulerStats {
    /// Screenshots successfully persisted this run.
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Ticks skipped because no renderable frame was available.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.captured.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }
}

/// Everything one scheduler run needs; assembled by the controller.
pub struct SchedulerContext {
    pub source: SharedSource,
    pub store: Arc<dyn ScreenshotStore>,
    pub analyzer: Option<Arc<dyn FrameAnalyzer>>,
    pub cache: Arc<ScreenshotCache>,
    pub events: EventSender,
    pub config: CaptureConfig,
    pub session_id: u64,
}

/// Timer-driven screenshot producer.
pub struct CaptureScheduler {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    stats: Arc<SchedulerStats>,
}

impl CaptureScheduler {
    /// Arm and run: captures once immediately, then on every interval tick.
    pub fn start(ctx: SchedulerContext) -> Self {
        Self::start_with_stats(ctx, Arc::new(SchedulerStats::default()))
    }

    /// Run with caller-provided counters; used by restart to hand the
    /// freshly reset stats back in.
    pub fn start_with_stats(ctx: SchedulerContext, stats: Arc<SchedulerStats>) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task_stats = Arc::clone(&stats);
        let task = tokio::spawn(async move {
            let ctx = Arc::new(ctx);
            let compressor = Compressor::default();
            let mut interval =
                tokio::time::interval(Duration::from_secs(ctx.config.interval_secs.max(1) as u64));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(
                "capture scheduler running: every {}s, {} byte budget",
                ctx.config.interval_secs, ctx.config.target_bytes
            );
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {
                        match pull_frame(&ctx, &task_stats).await {
                            FramePull::Frame(frame) => {
                                // Post-pull work runs detached so a slow save
                                // cannot stall the next tick's frame pull.
                                tokio::spawn(process_capture(
                                    Arc::clone(&ctx),
                                    compressor.clone(),
                                    Arc::clone(&task_stats),
                                    frame,
                                ));
                            }
                            FramePull::NotReady => {}
                            FramePull::Ended => break,
                        }
                    }
                }
            }
            debug!("capture scheduler stopped");
        });
        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
            stats,
        }
    }

    /// Cancel the pending timer. Idempotent. An in-flight tick that already
    /// pulled its frame settles on its own (partial encode/persist work is
    /// not cheaply cancellable). Releasing the device is the controller's
    /// job, not ours — the scheduler only borrows the source.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outcome of one timer tick's frame pull.
enum FramePull {
    Frame(FrameSample),
    /// Transient; the tick is skipped and the timer keeps running.
    NotReady,
    /// The source was revoked externally; the run must end.
    Ended,
}

/// Pull one frame, holding the source lock only for the pull itself.
async fn pull_frame(ctx: &SchedulerContext, stats: &SchedulerStats) -> FramePull {
    let mut guard = ctx.source.lock().await;
    match guard.current_frame().await {
        Ok(Some(frame)) => FramePull::Frame(frame),
        Ok(None) => {
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(
                "capture tick skipped: {}",
                CaptureError::TransientFrameUnavailable
            );
            FramePull::NotReady
        }
        Err(CaptureError::DeviceRevoked { .. }) => {
            info!("capture source ended externally");
            let _ = ctx.events.send(ControllerEvent::SourceEnded);
            FramePull::Ended
        }
        Err(err) => {
            warn!("capture tick frame pull failed: {}", err);
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            FramePull::NotReady
        }
    }
}

/// The post-pull portion of one tick: compress → persist → analyze → cache
/// → event. Runs on its own task; ticks are independent of one another.
async fn process_capture(
    ctx: Arc<SchedulerContext>,
    compressor: Compressor,
    stats: Arc<SchedulerStats>,
    frame: FrameSample,
) {
    // Compression: encode at the configured initial quality, then bound.
    let full = match compressor.encode_frame(&frame, ctx.config.initial_quality) {
        Ok(encoded) => compressor.compress(&encoded, ctx.config.target_bytes),
        Err(err) => {
            warn!("capture tick dropped: {}", err);
            return;
        }
    };

    // Persistence. Called once; failures are logged, never retried.
    let saved = match ctx
        .store
        .save_screenshot(ctx.session_id, &full, AnalysisStatus::Pending)
        .await
    {
        Ok(saved) => saved,
        Err(err) => {
            warn!("capture tick dropped: {}", err);
            let _ = ctx.events.send(ControllerEvent::Error(err.to_string()));
            return;
        }
    };

    // Optional real-time analysis; failure marks the screenshot failed
    // without affecting capture continuation.
    let description = match &ctx.analyzer {
        Some(analyzer) if ctx.config.realtime_analysis => {
            match analyzer.analyze(saved.id, &full).await {
                Ok(text) => {
                    if let Err(err) = ctx.store.mark_status(saved.id, AnalysisStatus::Completed).await
                    {
                        warn!("could not mark screenshot {} completed: {}", saved.id, err);
                    }
                    Some(text)
                }
                Err(err) => {
                    warn!("{}", err);
                    let _ = ctx.events.send(ControllerEvent::Error(err.to_string()));
                    if let Err(err) = ctx.store.mark_status(saved.id, AnalysisStatus::Failed).await {
                        warn!("could not mark screenshot {} failed: {}", saved.id, err);
                    }
                    None
                }
            }
        }
        _ => None,
    };

    // Cache update: thumbnail derivation is best-effort.
    let thumbnail = derive_thumbnail(
        &compressor,
        &full,
        ctx.config.thumbnail_max_dimension,
        ctx.config.thumbnail_target_bytes(),
    )
    .inspect_err(|err| debug!("thumbnail derivation failed: {}", err))
    .ok();
    ctx.cache.put(saved.id, full, thumbnail.clone());

    let index = stats.captured.fetch_add(1, Ordering::Relaxed) + 1;
    let _ = ctx.events.send(ControllerEvent::ScreenshotCaptured {
        id: saved.id,
        index,
        timestamp: saved.timestamp,
        description,
        thumbnail,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CompressedImage, SavedScreenshot, Size, SourceKind};
    use crate::source::synthetic::SyntheticSource;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::SystemTime;
    use tokio::sync::mpsc;

    struct CountingStore {
        next_id: AtomicU64,
        saved: Mutex<Vec<u64>>,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1),
                saved: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScreenshotStore for CountingStore {
        async fn save_screenshot(
            &self,
            _session_id: u64,
            _image: &CompressedImage,
            _status: AnalysisStatus,
        ) -> crate::error::CaptureResult<SavedScreenshot> {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.saved.lock().unwrap().push(id);
            Ok(SavedScreenshot {
                id,
                timestamp: SystemTime::now(),
            })
        }

        async fn mark_status(
            &self,
            _screenshot_id: u64,
            _status: AnalysisStatus,
        ) -> crate::error::CaptureResult<()> {
            Ok(())
        }
    }

    fn context(
        source: SyntheticSource,
        store: Arc<CountingStore>,
        events: EventSender,
    ) -> SchedulerContext {
        let mut config = CaptureConfig::default();
        config.interval_secs = 1;
        SchedulerContext {
            source: Arc::new(tokio::sync::Mutex::new(Box::new(source) as _)),
            store,
            analyzer: None,
            cache: Arc::new(ScreenshotCache::new(config.cache_capacity)),
            events,
            config,
            session_id: 1,
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_capture_is_immediate_then_one_per_interval() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = Arc::new(CountingStore::new());
        let source = SyntheticSource::new(Size::new(32, 32), SourceKind::Screen);
        let mut scheduler = CaptureScheduler::start(context(source, Arc::clone(&store), tx));

        // Over a 3.5-interval window the scheduler fires exactly 4 times:
        // once immediately, then at 1s, 2s, 3s.
        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(store.saved.lock().unwrap().len(), 1);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        tokio::time::advance(Duration::from_millis(499)).await;
        settle().await;
        assert_eq!(store.saved.lock().unwrap().len(), 4);
        assert_eq!(scheduler.stats().captured(), 4);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn unready_frames_skip_without_corrupting_state() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = Arc::new(CountingStore::new());
        // First three pulls return None; the fourth produces a frame.
        let source = SyntheticSource::new(Size::new(32, 32), SourceKind::Screen).with_warmup(3);
        let mut scheduler = CaptureScheduler::start(context(source, Arc::clone(&store), tx));

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        // Three skips, then the fourth tick persisted a screenshot.
        assert_eq!(store.saved.lock().unwrap().len(), 1);
        assert_eq!(scheduler.stats().skipped(), 3);
        assert_eq!(scheduler.stats().captured(), 1);
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_future_ticks() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = Arc::new(CountingStore::new());
        let source = SyntheticSource::new(Size::new(32, 32), SourceKind::Screen);
        let mut scheduler = CaptureScheduler::start(context(source, Arc::clone(&store), tx));

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        scheduler.stop();
        scheduler.stop();
        settle().await;
        let after_stop = store.saved.lock().unwrap().len();
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(store.saved.lock().unwrap().len(), after_stop);
        assert!(!scheduler.is_running());
    }

    struct SlowStore {
        started: AtomicU64,
    }

    #[async_trait]
    impl ScreenshotStore for SlowStore {
        async fn save_screenshot(
            &self,
            _session_id: u64,
            _image: &CompressedImage,
            _status: AnalysisStatus,
        ) -> crate::error::CaptureResult<SavedScreenshot> {
            let id = self.started.fetch_add(1, Ordering::Relaxed) + 1;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(SavedScreenshot {
                id,
                timestamp: SystemTime::now(),
            })
        }

        async fn mark_status(
            &self,
            _screenshot_id: u64,
            _status: AnalysisStatus,
        ) -> crate::error::CaptureResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_saves_do_not_stall_subsequent_ticks() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = Arc::new(SlowStore {
            started: AtomicU64::new(0),
        });
        let source = SyntheticSource::new(Size::new(32, 32), SourceKind::Screen);
        let mut config = CaptureConfig::default();
        config.interval_secs = 1;
        let ctx = SchedulerContext {
            source: Arc::new(tokio::sync::Mutex::new(Box::new(source) as _)),
            store: store.clone(),
            analyzer: None,
            cache: Arc::new(ScreenshotCache::new(config.cache_capacity)),
            events: tx,
            config,
            session_id: 1,
        };
        let mut scheduler = CaptureScheduler::start(ctx);

        // Each save takes 5 virtual seconds; with a 1s interval every tick
        // must still pull and start its own save on schedule.
        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        for _ in 0..9 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        assert_eq!(store.started.load(Ordering::Relaxed), 10);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn captured_screenshots_land_in_cache() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = Arc::new(CountingStore::new());
        let source = SyntheticSource::new(Size::new(32, 32), SourceKind::Screen);
        let ctx = context(source, Arc::clone(&store), tx);
        let cache = Arc::clone(&ctx.cache);
        let mut scheduler = CaptureScheduler::start(ctx);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        let event = rx.try_recv().expect("capture event");
        match event {
            ControllerEvent::ScreenshotCaptured { id, index, .. } => {
                assert_eq!(index, 1);
                assert!(cache.get(id).is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        scheduler.stop();
    }
}
