//! Shared test doubles for the integration suite: an instrumented source
//! and acquirer that count acquire/release calls, plus in-memory stores and
//! analyzers with recordable behavior.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use screenlog::error::{CaptureError, CaptureResult};
use screenlog::{
    Acquisition, AnalysisStatus, CompressedImage, FrameAnalyzer, FrameSample, FrameSource,
    SavedScreenshot, ScreenshotStore, Size, SourceAcquirer, SourceKind,
};

/// Shared counters observing one acquirer and every source it hands out.
#[derive(Default)]
pub struct SourceProbe {
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    pub frames: AtomicUsize,
}

impl SourceProbe {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

/// A gradient-rendering source that reports every release to its probe.
/// Release is idempotent at the probe level: only the first call counts.
pub struct TrackedSource {
    size: Size,
    kind: SourceKind,
    active: bool,
    counter: u32,
    probe: Arc<SourceProbe>,
}

impl TrackedSource {
    pub fn new(size: Size, kind: SourceKind, probe: Arc<SourceProbe>) -> Self {
        Self {
            size,
            kind,
            active: true,
            counter: 0,
            probe,
        }
    }
}

#[async_trait]
impl FrameSource for TrackedSource {
    async fn current_frame(&mut self) -> CaptureResult<Option<FrameSample>> {
        if !self.active {
            return Err(CaptureError::DeviceRevoked { kind: self.kind });
        }
        self.counter = self.counter.wrapping_add(1);
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        let mut rgba = Vec::with_capacity(self.size.rgba_bytes());
        for y in 0..self.size.h {
            for x in 0..self.size.w {
                rgba.extend_from_slice(&[
                    (x.wrapping_add(self.counter) % 256) as u8,
                    (y % 256) as u8,
                    (self.counter % 256) as u8,
                    255,
                ]);
            }
        }
        Ok(FrameSample::new(self.size, rgba))
    }

    fn size(&self) -> Size {
        self.size
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Acquirer handing out [`TrackedSource`]s wired to one shared probe.
pub struct TrackedAcquirer {
    size: Size,
    probe: Arc<SourceProbe>,
}

impl TrackedAcquirer {
    pub fn new(probe: Arc<SourceProbe>) -> Self {
        Self {
            size: Size::new(32, 32),
            probe,
        }
    }
}

#[async_trait]
impl SourceAcquirer for TrackedAcquirer {
    async fn acquire(&self, preferred: SourceKind) -> CaptureResult<Acquisition> {
        self.probe.acquires.fetch_add(1, Ordering::SeqCst);
        let source = Box::new(TrackedSource::new(
            self.size,
            SourceKind::Screen,
            Arc::clone(&self.probe),
        ));
        Ok(match preferred {
            SourceKind::Screen | SourceKind::Window => Acquisition::Granted(source),
            other => Acquisition::FellBack {
                requested: other,
                source,
            },
        })
    }
}

/// In-memory store that journals every save and status change.
#[derive(Default)]
pub struct RecordingStore {
    next_id: AtomicU64,
    pub saves: Mutex<Vec<(u64, usize, AnalysisStatus)>>,
    pub status_changes: Mutex<Vec<(u64, AnalysisStatus)>>,
    /// Fail this many saves up front before succeeding.
    fail_first: AtomicUsize,
}

impl RecordingStore {
    pub fn failing_first(count: usize) -> Self {
        let store = Self::default();
        store.fail_first.store(count, Ordering::SeqCst);
        store
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }
}

#[async_trait]
impl ScreenshotStore for RecordingStore {
    async fn save_screenshot(
        &self,
        session_id: u64,
        image: &CompressedImage,
        status: AnalysisStatus,
    ) -> CaptureResult<SavedScreenshot> {
        if self.fail_first.load(Ordering::SeqCst) > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);
            return Err(CaptureError::persistence("backend unavailable"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.saves
            .lock()
            .unwrap()
            .push((session_id, image.byte_len(), status));
        Ok(SavedScreenshot {
            id,
            timestamp: SystemTime::now(),
        })
    }

    async fn mark_status(&self, screenshot_id: u64, status: AnalysisStatus) -> CaptureResult<()> {
        self.status_changes
            .lock()
            .unwrap()
            .push((screenshot_id, status));
        Ok(())
    }
}

/// Analyzer producing a deterministic description per screenshot.
pub struct EchoAnalyzer;

#[async_trait]
impl FrameAnalyzer for EchoAnalyzer {
    async fn analyze(&self, screenshot_id: u64, image: &CompressedImage) -> CaptureResult<String> {
        Ok(format!(
            "screenshot {} showing a {} frame",
            screenshot_id, image.size
        ))
    }
}

/// Analyzer that always gives up.
pub struct BrokenAnalyzer;

#[async_trait]
impl FrameAnalyzer for BrokenAnalyzer {
    async fn analyze(&self, screenshot_id: u64, _image: &CompressedImage) -> CaptureResult<String> {
        Err(CaptureError::analysis(screenshot_id, "model offline"))
    }
}

/// Let spawned loop tasks run between paused-clock advances.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
