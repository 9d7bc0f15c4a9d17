//! # Preview Loop
//!
//! Continuously surfaces a low-stakes view of the active source before a
//! committed capture begins. Runs only while capture is not active — the
//! scheduler and the preview loop never poll the same source concurrently,
//! which would double the device load.
//!
//! The loop produces one frame immediately on start, then continues on a
//! fixed timer. A tick where the source has no renderable frame yet is
//! swallowed silently: the previously displayed frame stays valid until a
//! new one arrives. The loop borrows the source and never releases it; the
//! lifecycle controller owns teardown.

use std::time::Duration;

use log::{trace, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::compress::Compressor;
use crate::controller::{ControllerEvent, EventSender};
use crate::error::CaptureError;
use crate::source::SharedSource;

/// Quality factor preview frames are encoded at; they are transient, so
/// encode cost matters more than fidelity.
const PREVIEW_QUALITY: f32 = 0.7;

/// Timer-driven preview frame producer.
pub struct PreviewLoop {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl PreviewLoop {
    /// Start previewing `source`, delivering frames as
    /// [`ControllerEvent::PreviewFrame`] every `interval_ms`, beginning
    /// immediately.
    pub fn start(source: SharedSource, events: EventSender, interval_ms: u64) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let compressor = Compressor::default();
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {
                        if !preview_tick(&source, &events, &compressor).await {
                            break;
                        }
                    }
                }
            }
        });
        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Cancel the pending timer. Idempotent; an in-flight tick that already
    /// pulled its frame settles on its own rather than being aborted
    /// mid-encode.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PreviewLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One preview tick. Returns false when the loop should end (source revoked
/// or every consumer of events is gone).
async fn preview_tick(source: &SharedSource, events: &EventSender, compressor: &Compressor) -> bool {
    let frame = {
        let mut guard = source.lock().await;
        match guard.current_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                // Not an error: the last displayed frame remains valid.
                trace!("preview tick: {}", CaptureError::TransientFrameUnavailable);
                return true;
            }
            Err(CaptureError::DeviceRevoked { .. }) => {
                let _ = events.send(ControllerEvent::SourceEnded);
                return false;
            }
            Err(err) => {
                warn!("preview frame pull failed: {}", err);
                return true;
            }
        }
    };
    match compressor.encode_frame(&frame, PREVIEW_QUALITY) {
        Ok(image) => events.send(ControllerEvent::PreviewFrame(image)).is_ok(),
        Err(err) => {
            warn!("preview encode failed: {}", err);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Size, SourceKind};
    use crate::source::synthetic::SyntheticSource;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn shared(source: SyntheticSource) -> SharedSource {
        Arc::new(tokio::sync::Mutex::new(Box::new(source) as _))
    }

    #[tokio::test(start_paused = true)]
    async fn first_frame_is_immediate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = shared(SyntheticSource::new(Size::new(16, 16), SourceKind::Screen));
        let mut preview = PreviewLoop::start(source, tx, 500);

        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        let event = rx.try_recv().expect("immediate preview frame");
        assert!(matches!(event, ControllerEvent::PreviewFrame(_)));
        preview.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_ticks_are_swallowed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = shared(
            SyntheticSource::new(Size::new(16, 16), SourceKind::Screen).with_warmup(2),
        );
        let mut preview = PreviewLoop::start(source, tx, 100);

        // Two warmup ticks produce nothing; the third delivers a frame.
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ControllerEvent::PreviewFrame(_))
        ));
        preview.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let source = shared(SyntheticSource::new(Size::new(8, 8), SourceKind::Screen));
        let mut preview = PreviewLoop::start(source, tx, 100);
        preview.stop();
        preview.stop();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(!preview.is_running());
    }
}
