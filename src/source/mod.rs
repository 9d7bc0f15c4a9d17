//! # Frame Source Adapter
//!
//! Abstracts access to a live capture-capable source and produces still
//! frames on demand. Two implementations ship with the crate:
//!
//! - [`scrap`]: live display/window capture (feature `screen-capture`)
//! - [`synthetic`]: a moving test pattern for demos and tests
//!
//! ## Contract
//!
//! - Acquisition requests the narrowest capability that still serves still
//!   frames: dimensions capped at 1920×1080, polling well below video rates.
//! - Acquisition maps to exactly one user-facing selection; callers reuse an
//!   active source instead of re-acquiring per frame.
//! - `current_frame` returns `Ok(None)` while the source has not yet produced
//!   a renderable frame — a normal transient the caller tolerates by retrying
//!   next tick, never a user-facing error.
//! - `release` is idempotent and safe on partially initialized sources; no
//!   device handle may outlive its source. Failed acquisitions clean up
//!   internally before returning.
//! - When the requested [`SourceKind`] cannot be honored, the acquirer
//!   reports the substitution explicitly through [`Acquisition::FellBack`]
//!   instead of substituting silently.

pub mod synthetic;

#[cfg(feature = "screen-capture")]
pub mod scrap;

use async_trait::async_trait;

use crate::error::CaptureResult;
use crate::frame::{FrameSample, Size, SourceKind};

/// Widest frame requested from any device; only stills are needed.
pub const MAX_CAPTURE_WIDTH: u32 = 1920;
pub const MAX_CAPTURE_HEIGHT: u32 = 1080;
/// Source-side polling ceiling, frames per second.
pub const MAX_SOURCE_FPS: u32 = 15;

/// An acquired handle to a live capturable surface.
///
/// Exclusively owned by the lifecycle controller; the preview loop and the
/// capture scheduler borrow it and must never release it themselves.
#[async_trait]
pub trait FrameSource: Send {
    /// Decode the source's current state into a still frame.
    ///
    /// `Ok(None)` means the source exists but has no renderable frame yet.
    /// An `Err` of `DeviceRevoked` means the underlying device ended outside
    /// our control (user clicked "stop sharing", display unplugged).
    async fn current_frame(&mut self) -> CaptureResult<Option<FrameSample>>;

    /// Native dimensions of the source; may be empty before the first frame.
    fn size(&self) -> Size;

    /// The surface kind actually granted.
    fn kind(&self) -> SourceKind;

    /// False once released or externally revoked.
    fn is_active(&self) -> bool;

    /// Stop every still-live device track and detach rendering state.
    /// Idempotent; safe on a partially initialized source.
    fn release(&mut self);
}

/// Outcome of a source selection, with fallback made explicit.
pub enum Acquisition {
    /// The requested kind was granted.
    Granted(Box<dyn FrameSource>),
    /// A different kind was granted; the caller decides whether the
    /// substitution is acceptable.
    FellBack {
        requested: SourceKind,
        source: Box<dyn FrameSource>,
    },
}

impl Acquisition {
    pub fn source(self) -> Box<dyn FrameSource> {
        match self {
            Acquisition::Granted(source) => source,
            Acquisition::FellBack { source, .. } => source,
        }
    }

    /// `Some(requested)` when the granted kind differs from the request.
    pub fn fallback_from(&self) -> Option<SourceKind> {
        match self {
            Acquisition::Granted(_) => None,
            Acquisition::FellBack { requested, .. } => Some(*requested),
        }
    }

    pub fn granted_kind(&self) -> SourceKind {
        match self {
            Acquisition::Granted(source) => source.kind(),
            Acquisition::FellBack { source, .. } => source.kind(),
        }
    }
}

/// Factory for frame sources. One `acquire` call corresponds to one
/// user-facing selection/permission prompt.
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    async fn acquire(&self, preferred: SourceKind) -> CaptureResult<Acquisition>;
}

/// A source shared between its owning controller and the borrowing loops.
/// Borrowers pull frames through the lock but never release the source.
pub type SharedSource = std::sync::Arc<tokio::sync::Mutex<Box<dyn FrameSource>>>;
