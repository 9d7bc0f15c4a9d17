//! Live display/window capture built on `scrap`.
//!
//! `scrap::Capturer` is not `Send`, so the capturer lives on a dedicated
//! worker thread and the async side talks to it over channels: one request
//! per frame pull, one oneshot reply per request. Releasing the source drops
//! the request channel and joins the worker, which stops the underlying
//! device track.
//!
//! Frames are polled on demand only — no free-running grab loop — which
//! keeps the device load far below the `MAX_SOURCE_FPS` ceiling. Frames
//! wider than the 1920×1080 capability cap are decimated in the worker
//! before crossing the channel.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use log::{debug, warn};
use scrap::{Capturer, Display};
use tokio::sync::oneshot;

use crate::error::{CaptureError, CaptureResult};
use crate::frame::{FrameSample, Size, SourceKind};
use crate::source::{
    Acquisition, FrameSource, MAX_CAPTURE_HEIGHT, MAX_CAPTURE_WIDTH, SourceAcquirer,
};

/// Picks a window from the listed titles; `None` cancels the selection.
pub type WindowPicker = Arc<dyn Fn(&[String]) -> Option<usize> + Send + Sync>;

enum Request {
    Frame(oneshot::Sender<Result<Option<FrameSample>, String>>),
}

enum SetupError {
    NoDisplay(String),
    Denied(String),
    Cancelled,
}

/// A live capture source backed by a scrap worker thread.
pub struct ScrapSource {
    kind: SourceKind,
    size: Size,
    requests: Option<std_mpsc::Sender<Request>>,
    worker: Option<JoinHandle<()>>,
    active: bool,
}

#[async_trait]
impl FrameSource for ScrapSource {
    async fn current_frame(&mut self) -> CaptureResult<Option<FrameSample>> {
        let Some(requests) = self.requests.as_ref() else {
            return Ok(None);
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if requests.send(Request::Frame(reply_tx)).is_err() {
            // Worker is gone: the device ended outside our stop path.
            self.active = false;
            return Err(CaptureError::DeviceRevoked { kind: self.kind });
        }
        match reply_rx.await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(reason)) => {
                warn!("capture device ended: {}", reason);
                self.active = false;
                Err(CaptureError::DeviceRevoked { kind: self.kind })
            }
            Err(_) => {
                self.active = false;
                Err(CaptureError::DeviceRevoked { kind: self.kind })
            }
        }
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
        // Dropping the sender makes the worker's recv fail and exit,
        // dropping the Capturer (the live device track) with it.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("scrap worker thread panicked during release");
            }
        }
    }
}

impl Drop for ScrapSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Acquires live sources via scrap. `Screen` captures the primary display;
/// `Window` runs the configured picker (desktop platforms); the browser-only
/// kinds fall back to `Screen` with the substitution reported explicitly.
pub struct ScrapAcquirer {
    window_picker: WindowPicker,
}

impl ScrapAcquirer {
    pub fn new() -> Self {
        // Default picker: first listed window.
        Self {
            window_picker: Arc::new(|titles| if titles.is_empty() { None } else { Some(0) }),
        }
    }

    pub fn with_window_picker(mut self, picker: WindowPicker) -> Self {
        self.window_picker = picker;
        self
    }

    async fn spawn_worker(&self, kind: SourceKind) -> CaptureResult<ScrapSource> {
        let (setup_tx, setup_rx) = oneshot::channel::<Result<Size, SetupError>>();
        let (request_tx, request_rx) = std_mpsc::channel::<Request>();
        let picker = Arc::clone(&self.window_picker);

        let worker = std::thread::Builder::new()
            .name("screenlog-capture".into())
            .spawn(move || worker_main(kind, picker, setup_tx, request_rx))
            .map_err(|e| CaptureError::unsupported(format!("cannot spawn capture thread: {}", e)))?;

        let size = match setup_rx.await {
            Ok(Ok(size)) => size,
            Ok(Err(SetupError::NoDisplay(reason))) => {
                let _ = worker.join();
                return Err(CaptureError::unsupported(reason));
            }
            Ok(Err(SetupError::Denied(reason))) => {
                let _ = worker.join();
                return Err(CaptureError::permission_denied(kind, reason));
            }
            Ok(Err(SetupError::Cancelled)) => {
                let _ = worker.join();
                return Err(CaptureError::user_cancelled(kind));
            }
            Err(_) => {
                let _ = worker.join();
                return Err(CaptureError::unsupported("capture thread died during setup"));
            }
        };

        debug!("acquired {} source at {}", kind, size);
        Ok(ScrapSource {
            kind,
            size,
            requests: Some(request_tx),
            worker: Some(worker),
            active: true,
        })
    }
}

impl Default for ScrapAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAcquirer for ScrapAcquirer {
    async fn acquire(&self, preferred: SourceKind) -> CaptureResult<Acquisition> {
        let supported = match preferred {
            SourceKind::Screen => true,
            SourceKind::Window => cfg!(any(target_os = "windows", target_os = "macos")),
            SourceKind::Tab | SourceKind::Element => false,
        };
        if supported {
            let source = self.spawn_worker(preferred).await?;
            Ok(Acquisition::Granted(Box::new(source)))
        } else {
            let source = self.spawn_worker(SourceKind::Screen).await?;
            Ok(Acquisition::FellBack {
                requested: preferred,
                source: Box::new(source),
            })
        }
    }
}

fn worker_main(
    kind: SourceKind,
    picker: WindowPicker,
    setup_tx: oneshot::Sender<Result<Size, SetupError>>,
    requests: std_mpsc::Receiver<Request>,
) {
    let (mut capturer, size) = match build_capturer(kind, picker) {
        Ok(ok) => ok,
        Err(err) => {
            let _ = setup_tx.send(Err(err));
            return;
        }
    };
    if setup_tx.send(Ok(size)).is_err() {
        // Acquirer went away before setup finished; drop the device.
        return;
    }

    while let Ok(Request::Frame(reply)) = requests.recv() {
        let result = match capturer.frame() {
            Ok(frame) => Ok(convert_frame(&frame, size)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.to_string()),
        };
        let fatal = result.is_err();
        let _ = reply.send(result);
        if fatal {
            break;
        }
    }
    // Receiver loop ended: request channel dropped (release) or device error.
    // Capturer drops here, stopping the device track.
}

fn build_capturer(
    kind: SourceKind,
    picker: WindowPicker,
) -> Result<(Capturer, Size), SetupError> {
    match kind {
        #[cfg(any(target_os = "windows", target_os = "macos"))]
        SourceKind::Window => {
            let windows = scrap::Window::all()
                .map_err(|e| SetupError::NoDisplay(format!("cannot list windows: {}", e)))?;
            let titles: Vec<String> = windows.iter().map(|w| w.title().to_string()).collect();
            let index = picker(&titles).ok_or(SetupError::Cancelled)?;
            let window = windows
                .into_iter()
                .nth(index)
                .ok_or(SetupError::Cancelled)?;
            let capturer = Capturer::new(window)
                .map_err(|e| SetupError::Denied(format!("cannot open window capturer: {}", e)))?;
            let size = Size::new(capturer.width() as u32, capturer.height() as u32);
            Ok((capturer, size))
        }
        _ => {
            let _ = picker;
            let display = Display::primary()
                .map_err(|e| SetupError::NoDisplay(format!("no primary display: {}", e)))?;
            let capturer = Capturer::new(display)
                .map_err(|e| SetupError::Denied(format!("cannot open display capturer: {}", e)))?;
            let size = Size::new(capturer.width() as u32, capturer.height() as u32);
            Ok((capturer, size))
        }
    }
}

/// BGRA device frame → tightly packed RGBA sample, honoring row stride and
/// the 1920×1080 capability cap (integer decimation, stills don't need
/// filtering quality).
fn convert_frame(data: &[u8], size: Size) -> Option<FrameSample> {
    if size.is_empty() || data.is_empty() {
        return None;
    }
    let stride = data.len() / size.h as usize;
    if stride < size.w as usize * 4 {
        return None;
    }
    let step = ((size.w + MAX_CAPTURE_WIDTH - 1) / MAX_CAPTURE_WIDTH)
        .max((size.h + MAX_CAPTURE_HEIGHT - 1) / MAX_CAPTURE_HEIGHT)
        .max(1) as usize;
    let out = Size::new(size.w / step as u32, size.h / step as u32);
    if out.is_empty() {
        return None;
    }
    let mut rgba = Vec::with_capacity(out.rgba_bytes());
    for y in 0..out.h as usize {
        let row = &data[y * step * stride..];
        for x in 0..out.w as usize {
            let i = x * step * 4;
            rgba.extend_from_slice(&[row[i + 2], row[i + 1], row[i], 255]);
        }
    }
    Some(FrameSample { size: out, rgba })
}
