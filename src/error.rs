//! # Error Taxonomy
//!
//! Domain errors for the capture core, with classification traits that let
//! callers decide how loudly to react.
//!
//! ## Propagation policy
//!
//! - **Acquisition-time** errors ([`CaptureError::PermissionDenied`],
//!   [`CaptureError::UserCancelled`], [`CaptureError::UnsupportedEnvironment`])
//!   propagate synchronously to the caller so a UI can react immediately.
//! - **Per-tick** errors during an active session (transient frames,
//!   persistence and analysis failures) never propagate past the scheduler —
//!   they are terminal only for that single tick and are logged instead.
//! - [`CaptureError::CompressionShortfall`] is informational: the best-effort
//!   image is still used.
//!
//! ## Classification
//!
//! - [`Retryable`]: the same operation may succeed on a later tick
//! - [`Recoverable`]: the session survives the error
//! - [`HasSeverity`]: log-level guidance for embedders

use std::error::Error as StdError;
use std::fmt;

use crate::frame::SourceKind;

/// Severity levels for capture errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected transients; debug-level noise at most.
    Debug,
    /// Informational conditions (best-effort shortfalls).
    Info,
    /// Degraded but continuing (a dropped tick).
    Warning,
    /// Operation failed and was surfaced to the caller.
    Error,
}

/// Result alias used throughout the capture core.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors raised by the capture core.
#[derive(Debug)]
pub enum CaptureError {
    /// The user declined the capture permission prompt.
    PermissionDenied { kind: SourceKind, reason: String },
    /// The user dismissed the selection/permission prompt without choosing.
    UserCancelled { kind: SourceKind },
    /// The runtime cannot capture at all (no display, feature disabled).
    UnsupportedEnvironment { reason: String },
    /// A single tick could not get a usable frame yet. Internal; logged, never
    /// surfaced to the user.
    TransientFrameUnavailable,
    /// The byte target could not be reached within the attempt budget. The
    /// best-effort image is still returned alongside this being logged.
    CompressionShortfall {
        target_bytes: usize,
        achieved_bytes: usize,
        quality: f32,
    },
    /// The external save call failed; the tick's screenshot is dropped.
    Persistence {
        reason: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    /// The external analyze call failed; the screenshot is marked failed.
    Analysis { screenshot_id: u64, reason: String },
    /// The active source was terminated outside the controller's own stop
    /// path (user revoked sharing at the OS level, display disappeared).
    DeviceRevoked { kind: SourceKind },
    /// `start_capture` was refused because no preview is active.
    PreviewNotActive { state: String },
    /// Configuration validation failure.
    Config {
        field: &'static str,
        value: String,
        reason: String,
    },
    /// Image encode/decode failure inside the compression engine.
    Encoding {
        operation: &'static str,
        reason: String,
    },
    /// I/O failure at the persistence boundary.
    Io {
        operation: String,
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn permission_denied(kind: SourceKind, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            kind,
            reason: reason.into(),
        }
    }

    pub fn user_cancelled(kind: SourceKind) -> Self {
        Self::UserCancelled { kind }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedEnvironment {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn persistence_with(
        reason: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn analysis(screenshot_id: u64, reason: impl Into<String>) -> Self {
        Self::Analysis {
            screenshot_id,
            reason: reason.into(),
        }
    }

    pub fn config(
        field: &'static str,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn encoding(operation: &'static str, reason: impl fmt::Display) -> Self {
        Self::Encoding {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PermissionDenied { kind, reason } => {
                write!(f, "permission denied for {} capture: {}", kind, reason)
            }
            CaptureError::UserCancelled { kind } => {
                write!(f, "user cancelled {} capture selection", kind)
            }
            CaptureError::UnsupportedEnvironment { reason } => {
                write!(f, "capture not supported in this environment: {}", reason)
            }
            CaptureError::TransientFrameUnavailable => {
                write!(f, "no renderable frame available yet")
            }
            CaptureError::CompressionShortfall {
                target_bytes,
                achieved_bytes,
                quality,
            } => write!(
                f,
                "could not reach {} bytes (best effort {} bytes at quality {:.2})",
                target_bytes, achieved_bytes, quality
            ),
            CaptureError::Persistence { reason, .. } => {
                write!(f, "failed to persist screenshot: {}", reason)
            }
            CaptureError::Analysis {
                screenshot_id,
                reason,
            } => write!(
                f,
                "analysis failed for screenshot {}: {}",
                screenshot_id, reason
            ),
            CaptureError::DeviceRevoked { kind } => {
                write!(f, "{} capture source was ended externally", kind)
            }
            CaptureError::PreviewNotActive { state } => write!(
                f,
                "cannot start capture without an active preview (state: {})",
                state
            ),
            CaptureError::Config {
                field,
                value,
                reason,
            } => write!(f, "invalid config {}={}: {}", field, value, reason),
            CaptureError::Encoding { operation, reason } => {
                write!(f, "image {} failed: {}", operation, reason)
            }
            CaptureError::Io { operation, source } => {
                write!(f, "I/O failure during {}: {}", operation, source)
            }
        }
    }
}

impl StdError for CaptureError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CaptureError::Persistence {
                source: Some(src), ..
            } => Some(src.as_ref()),
            CaptureError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors where retrying the same operation on a later tick makes sense.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Errors the running session survives.
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

/// Log-level guidance for embedders.
pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl Retryable for CaptureError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::TransientFrameUnavailable
                | CaptureError::Persistence { .. }
                | CaptureError::Analysis { .. }
        )
    }
}

impl Recoverable for CaptureError {
    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CaptureError::UnsupportedEnvironment { .. } | CaptureError::DeviceRevoked { .. }
        )
    }
}

impl HasSeverity for CaptureError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            CaptureError::TransientFrameUnavailable => ErrorSeverity::Debug,
            CaptureError::CompressionShortfall { .. } => ErrorSeverity::Info,
            CaptureError::Persistence { .. } | CaptureError::Analysis { .. } => {
                ErrorSeverity::Warning
            }
            _ => ErrorSeverity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable_and_quiet() {
        let err = CaptureError::TransientFrameUnavailable;
        assert!(err.is_retryable());
        assert!(err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Debug);
    }

    #[test]
    fn revocation_is_terminal_for_the_session() {
        let err = CaptureError::DeviceRevoked {
            kind: SourceKind::Screen,
        };
        assert!(!err.is_recoverable());
        assert!(!err.is_retryable());
    }

    #[test]
    fn shortfall_is_informational() {
        let err = CaptureError::CompressionShortfall {
            target_bytes: 1000,
            achieved_bytes: 1200,
            quality: 0.3,
        };
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert!(err.is_recoverable());
    }

    #[test]
    fn persistence_failure_keeps_the_session_alive() {
        let err = CaptureError::persistence("backend returned 500");
        assert!(err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }
}
