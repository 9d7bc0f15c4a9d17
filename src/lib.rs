//! # screenlog
//!
//! Periodic screen-capture core for activity documentation tools: acquire a
//! display source, preview it, capture timestamped screenshots on a fixed
//! interval, compress each one under a byte budget, hand it to external
//! persistence/analysis, and keep a bounded in-memory working set.
//!
//! ## Architecture
//!
//! - `source`: frame source adapter — acquire a capturable surface, pull
//!   still frames on demand, release the device on every exit path
//! - `preview`: low-cost preview loop running before capture commits
//! - `scheduler`: the committed capture loop (frame → compress → persist →
//!   cache, once per interval)
//! - `compress`: byte-budgeted JPEG reduction (dimensions first, then
//!   quality)
//! - `cache`: bounded insertion-order-evicting screenshot cache
//! - `controller`: the lifecycle state machine an embedder drives
//! - `store`: persistence and vision-model boundaries
//! - `config` / `error`: validated options and the error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use screenlog::{CaptureConfig, CaptureController, DiskScreenshotStore};
//! use screenlog::source::synthetic::SyntheticAcquirer;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut controller = CaptureController::builder()
//!     .with_config(CaptureConfig::default())
//!     .with_acquirer(Arc::new(SyntheticAcquirer::default()))
//!     .with_store(Arc::new(DiskScreenshotStore::create("./shots")?))
//!     .build()?;
//!
//! let mut events = controller.take_events().unwrap();
//! controller.select_source().await?;
//! controller.start_capture()?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! controller.teardown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod cache;
pub mod compress;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod preview;
pub mod scheduler;
pub mod source;
pub mod store;

pub use cache::{ScreenshotCache, derive_thumbnail};
pub use compress::{Compressor, estimated_bytes_from_base64_len};
pub use config::CaptureConfig;
pub use controller::{
    CaptureController, CaptureControllerBuilder, ControllerEvent, ControllerState, EventReceiver,
    EventSender,
};
pub use error::{CaptureError, CaptureResult, HasSeverity, Recoverable, Retryable};
pub use frame::{AnalysisStatus, CompressedImage, FrameSample, SavedScreenshot, Size, SourceKind};
pub use preview::PreviewLoop;
pub use scheduler::{CaptureScheduler, SchedulerStats};
pub use source::{Acquisition, FrameSource, SourceAcquirer};
pub use store::{
    DiskScreenshotStore, FrameAnalyzer, HttpFrameAnalyzer, HttpScreenshotStore, ScreenshotStore,
};

/// Whether this process can capture a live display at all.
///
/// False when the `screen-capture` feature is disabled or no display is
/// reachable (headless session). The synthetic source works regardless.
pub fn capture_supported() -> bool {
    #[cfg(feature = "screen-capture")]
    {
        scrap::Display::primary().is_ok()
    }
    #[cfg(not(feature = "screen-capture"))]
    {
        false
    }
}

/// Acquirer for the best available backend: live capture when supported,
/// otherwise the synthetic test pattern.
pub fn default_acquirer() -> Arc<dyn SourceAcquirer> {
    #[cfg(feature = "screen-capture")]
    {
        if capture_supported() {
            return Arc::new(source::scrap::ScrapAcquirer::new());
        }
    }
    Arc::new(source::synthetic::SyntheticAcquirer::default())
}
