//! # Capture Configuration
//!
//! Validated configuration for a capture session. This is the common surface
//! between the CLI, an embedding UI, and the core library.
//!
//! ## Recognized options
//!
//! | Parameter | Type | Range | Description |
//! |-----------|------|-------|-------------|
//! | `interval_secs` | `u32` | 1–60 | Seconds between scheduled captures |
//! | `preview_interval_ms` | `u64` | 50–5000 | Preview refresh cadence |
//! | `source_kind` | `SourceKind` | screen/window/tab/element | Surface to capture |
//! | `target_bytes` | `usize` | ≥ 8 KiB | Byte budget per compressed screenshot |
//! | `cache_capacity` | `usize` | ≥ 1 | Bounded in-memory screenshot working set |
//! | `realtime_analysis` | `bool` | — | Run the analyzer after every save |
//!
//! Defaults favor a documentation workflow: one screenshot every 10 seconds,
//! 400 KiB per image, a 30-entry cache.

use crate::error::{CaptureError, CaptureResult};
use crate::frame::SourceKind;

/// Configuration for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Seconds between scheduled captures. Bounded to 1–60.
    pub interval_secs: u32,
    /// Milliseconds between preview refreshes while no capture is running.
    pub preview_interval_ms: u64,
    /// What the user asked to capture.
    pub source_kind: SourceKind,
    /// Byte budget each persisted screenshot is compressed toward.
    pub target_bytes: usize,
    /// Maximum number of full screenshots held in the in-memory cache.
    pub cache_capacity: usize,
    /// Whether to run the external analyzer after each successful save.
    pub realtime_analysis: bool,
    /// JPEG quality the first encode of each frame uses, before the
    /// compressor steps it down toward the byte budget.
    pub initial_quality: f32,
    /// Longest edge of derived thumbnails, in pixels.
    pub thumbnail_max_dimension: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            preview_interval_ms: 500,
            source_kind: SourceKind::Screen,
            target_bytes: 400 * 1024,
            cache_capacity: 30,
            realtime_analysis: false,
            initial_quality: 0.92,
            thumbnail_max_dimension: 320,
        }
    }
}

impl CaptureConfig {
    /// Validate all fields, returning the first violation found.
    pub fn validate(&self) -> CaptureResult<()> {
        if !(1..=60).contains(&self.interval_secs) {
            return Err(CaptureError::config(
                "interval_secs",
                self.interval_secs,
                "capture interval must be between 1 and 60 seconds",
            ));
        }
        if !(50..=5000).contains(&self.preview_interval_ms) {
            return Err(CaptureError::config(
                "preview_interval_ms",
                self.preview_interval_ms,
                "preview cadence must be between 50 and 5000 milliseconds",
            ));
        }
        if self.target_bytes < 8 * 1024 {
            return Err(CaptureError::config(
                "target_bytes",
                self.target_bytes,
                "compressed size budget must be at least 8 KiB",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(CaptureError::config(
                "cache_capacity",
                self.cache_capacity,
                "cache must hold at least one entry",
            ));
        }
        if !(0.1..=1.0).contains(&self.initial_quality) {
            return Err(CaptureError::config(
                "initial_quality",
                self.initial_quality,
                "initial JPEG quality must be within 0.1–1.0",
            ));
        }
        if self.thumbnail_max_dimension < 32 {
            return Err(CaptureError::config(
                "thumbnail_max_dimension",
                self.thumbnail_max_dimension,
                "thumbnails below 32px are unusable",
            ));
        }
        Ok(())
    }

    /// Byte budget used when deriving thumbnails. A fixed fraction of the
    /// full-image budget, floored so tiny budgets still produce an image.
    pub fn thumbnail_target_bytes(&self) -> usize {
        (self.target_bytes / 8).max(4 * 1024)
    }
}
