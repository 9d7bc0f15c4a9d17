//! Synthetic frame source: a moving gradient test pattern.
//!
//! Stands in for a real display when the `screen-capture` feature is off,
//! when running headless, and in the integration tests. Models the warm-up
//! window real devices exhibit by reporting `None` for the first few pulls.

use async_trait::async_trait;

use crate::error::CaptureResult;
use crate::frame::{FrameSample, Size, SourceKind};
use crate::source::{Acquisition, FrameSource, SourceAcquirer};

/// Test-pattern source with a configurable warm-up window.
pub struct SyntheticSource {
    size: Size,
    kind: SourceKind,
    active: bool,
    /// Pulls remaining before the source starts producing frames.
    warmup_remaining: u32,
    frame_counter: u64,
}

impl SyntheticSource {
    pub fn new(size: Size, kind: SourceKind) -> Self {
        Self {
            size,
            kind,
            active: true,
            warmup_remaining: 0,
            frame_counter: 0,
        }
    }

    /// Report `None` for the first `ticks` frame pulls, as a not-yet-ready
    /// device would.
    pub fn with_warmup(mut self, ticks: u32) -> Self {
        self.warmup_remaining = ticks;
        self
    }

    fn render(&self) -> FrameSample {
        let Size { w, h } = self.size;
        let shift = (self.frame_counter * 7 % 256) as u8;
        let mut rgba = Vec::with_capacity(self.size.rgba_bytes());
        for y in 0..h {
            for x in 0..w {
                rgba.extend_from_slice(&[
                    ((x * 255) / w.max(1)) as u8,
                    ((y * 255) / h.max(1)) as u8,
                    shift,
                    255,
                ]);
            }
        }
        FrameSample { size: self.size, rgba }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn current_frame(&mut self) -> CaptureResult<Option<FrameSample>> {
        if !self.active {
            return Ok(None);
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Ok(None);
        }
        self.frame_counter += 1;
        Ok(Some(self.render()))
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
        self.active = false;
    }
}

/// Acquirer handing out synthetic sources. Mirrors the desktop acquirer's
/// fallback behavior: browser-only kinds fall back to `Screen`, explicitly.
pub struct SyntheticAcquirer {
    size: Size,
}

impl SyntheticAcquirer {
    pub fn new(size: Size) -> Self {
        Self { size }
    }
}

impl Default for SyntheticAcquirer {
    fn default() -> Self {
        Self::new(Size::new(640, 360))
    }
}

#[async_trait]
impl SourceAcquirer for SyntheticAcquirer {
    async fn acquire(&self, preferred: SourceKind) -> CaptureResult<Acquisition> {
        match preferred {
            SourceKind::Screen | SourceKind::Window => Ok(Acquisition::Granted(Box::new(
                SyntheticSource::new(self.size, preferred),
            ))),
            SourceKind::Tab | SourceKind::Element => Ok(Acquisition::FellBack {
                requested: preferred,
                source: Box::new(SyntheticSource::new(self.size, SourceKind::Screen)),
            }),
        }
    }
}
