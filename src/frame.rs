//! # Frame & Screenshot Data Model
//!
//! Shared value types for the capture pipeline:
//!
//! - [`Size`]: pixel dimensions with the scaling arithmetic the compressor
//!   relies on
//! - [`FrameSample`]: one decoded RGBA still pulled from a source
//! - [`CompressedImage`]: a JPEG-encoded screenshot tagged with the quality
//!   it was encoded at
//! - [`SourceKind`], [`AnalysisStatus`], [`SavedScreenshot`]: enums and
//!   records shared with the persistence boundary

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::CaptureError;

/// Pixel dimensions of a frame or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Byte length of an RGBA buffer at these dimensions.
    pub fn rgba_bytes(&self) -> usize {
        self.w as usize * self.h as usize * 4
    }

    /// Scale both axes by `factor`. A non-empty size never collapses to
    /// zero: each axis bottoms out at one pixel.
    pub fn scaled_by(&self, factor: f32) -> Size {
        if self.is_empty() {
            return *self;
        }
        Size {
            w: ((self.w as f32 * factor) as u32).max(1),
            h: ((self.h as f32 * factor) as u32).max(1),
        }
    }

    /// Shrink so the longest edge is at most `max_dimension`, preserving
    /// aspect ratio. Sizes already within the bound come back unchanged.
    pub fn fit_within(&self, max_dimension: u32) -> Size {
        let longest = self.w.max(self.h);
        if self.is_empty() || longest <= max_dimension {
            return *self;
        }
        self.scaled_by(max_dimension as f32 / longest as f32)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// One decoded still frame: tightly packed RGBA, no stride padding.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub size: Size,
    pub rgba: Vec<u8>,
}

impl FrameSample {
    /// Returns `None` when `rgba` does not match `size` or the size is
    /// empty.
    pub fn new(size: Size, rgba: Vec<u8>) -> Option<Self> {
        if size.is_empty() || rgba.len() != size.rgba_bytes() {
            return None;
        }
        Some(Self { size, rgba })
    }
}

/// A JPEG-encoded screenshot, tagged with the quality it was encoded at so
/// the compressor can pick up where encoding left off.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub jpeg: Vec<u8>,
    pub size: Size,
    /// Encoder quality in `0.0..=1.0`.
    pub quality: f32,
}

impl CompressedImage {
    pub fn byte_len(&self) -> usize {
        self.jpeg.len()
    }

    /// Render as a `data:image/jpeg;base64,…` URL for JSON transports.
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.jpeg))
    }
}

/// What kind of surface a capture source shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A whole display.
    Screen,
    /// A single application window.
    Window,
    /// A browser tab.
    Tab,
    /// A single DOM element within a tab.
    Element,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Screen => "screen",
            SourceKind::Window => "window",
            SourceKind::Tab => "tab",
            SourceKind::Element => "element",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "screen" | "display" => Ok(SourceKind::Screen),
            "window" => Ok(SourceKind::Window),
            "tab" => Ok(SourceKind::Tab),
            "element" => Ok(SourceKind::Element),
            other => Err(CaptureError::config(
                "source",
                other,
                "expected one of: screen, window, tab, element",
            )),
        }
    }
}

/// Lifecycle of a screenshot's activity description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Saved, not yet described.
    Pending,
    /// Description stored.
    Completed,
    /// Analysis gave up; the screenshot itself is still saved.
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

/// Receipt from a [`ScreenshotStore`](crate::store::ScreenshotStore) save.
#[derive(Debug, Clone, Copy)]
pub struct SavedScreenshot {
    pub id: u64,
    pub timestamp: SystemTime,
}
