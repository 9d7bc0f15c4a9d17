//! # Persistence & Analysis Boundary
//!
//! The capture core does not own storage or the vision model; it calls out
//! through these traits once per tick. Contract highlights:
//!
//! - [`ScreenshotStore::save_screenshot`] is invoked exactly once per tick;
//!   on failure the core logs and drops that tick's screenshot — it never
//!   retries.
//! - [`FrameAnalyzer::analyze`] is awaited after persistence when real-time
//!   analysis is on; failure marks the screenshot failed rather than
//!   aborting capture.
//!
//! Two implementations ship with the crate: a disk store writing numbered
//! JPEGs plus a `manifest.jsonl` journal, and HTTP clients for a REST
//! backend and a vision-model endpoint.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use crate::error::{CaptureError, CaptureResult};
use crate::frame::{AnalysisStatus, CompressedImage, SavedScreenshot};

/// Where durable screenshot copies live.
#[async_trait]
pub trait ScreenshotStore: Send + Sync {
    /// Persist one screenshot and return its assigned id and timestamp.
    async fn save_screenshot(
        &self,
        session_id: u64,
        image: &CompressedImage,
        status: AnalysisStatus,
    ) -> CaptureResult<SavedScreenshot>;

    /// Update the analysis status of an already-saved screenshot.
    async fn mark_status(&self, screenshot_id: u64, status: AnalysisStatus) -> CaptureResult<()>;
}

/// Vision-model boundary: turns one screenshot into a natural-language
/// activity description.
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    async fn analyze(&self, screenshot_id: u64, image: &CompressedImage) -> CaptureResult<String>;
}

#[derive(Serialize)]
struct ManifestRecord<'a> {
    id: u64,
    session_id: u64,
    timestamp_ms: u128,
    bytes: usize,
    width: u32,
    height: u32,
    status: &'a str,
}

#[derive(Serialize)]
struct StatusRecord<'a> {
    id: u64,
    status: &'a str,
}

/// Disk-backed store: `<dir>/<id>.jpg` per screenshot plus an append-only
/// `manifest.jsonl` journal of saves and status changes.
pub struct DiskScreenshotStore {
    dir: PathBuf,
    next_id: AtomicU64,
    manifest: Mutex<fs::File>,
}

impl DiskScreenshotStore {
    pub fn create(dir: impl Into<PathBuf>) -> CaptureResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CaptureError::io("create output directory", e))?;
        let manifest = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("manifest.jsonl"))
            .map_err(|e| CaptureError::io("open manifest", e))?;
        Ok(Self {
            dir,
            next_id: AtomicU64::new(1),
            manifest: Mutex::new(manifest),
        })
    }

    fn append_line(&self, line: String) -> CaptureResult<()> {
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        writeln!(manifest, "{}", line).map_err(|e| CaptureError::io("append manifest", e))
    }
}

#[async_trait]
impl ScreenshotStore for DiskScreenshotStore {
    async fn save_screenshot(
        &self,
        session_id: u64,
        image: &CompressedImage,
        status: AnalysisStatus,
    ) -> CaptureResult<SavedScreenshot> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timestamp = SystemTime::now();
        let path = self.dir.join(format!("{:06}.jpg", id));
        fs::write(&path, &image.jpeg).map_err(|e| CaptureError::io("write screenshot", e))?;

        let record = ManifestRecord {
            id,
            session_id,
            timestamp_ms: timestamp
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_millis(),
            bytes: image.byte_len(),
            width: image.size.w,
            height: image.size.h,
            status: status.as_str(),
        };
        self.append_line(
            serde_json::to_string(&record)
                .map_err(|e| CaptureError::persistence_with("serialize manifest record", e))?,
        )?;
        debug!("saved screenshot {} ({} bytes) to {:?}", id, image.byte_len(), path);
        Ok(SavedScreenshot { id, timestamp })
    }

    async fn mark_status(&self, screenshot_id: u64, status: AnalysisStatus) -> CaptureResult<()> {
        let record = StatusRecord {
            id: screenshot_id,
            status: status.as_str(),
        };
        self.append_line(
            serde_json::to_string(&record)
                .map_err(|e| CaptureError::persistence_with("serialize status record", e))?,
        )
    }
}

/// REST-backed store posting base64 data URLs to a backend.
pub struct HttpScreenshotStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScreenshotStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ScreenshotStore for HttpScreenshotStore {
    async fn save_screenshot(
        &self,
        session_id: u64,
        image: &CompressedImage,
        status: AnalysisStatus,
    ) -> CaptureResult<SavedScreenshot> {
        let body = serde_json::json!({
            "session_id": session_id,
            "image": image.to_data_url(),
            "width": image.size.w,
            "height": image.size.h,
            "analysis_status": status.as_str(),
        });
        let response = self
            .client
            .post(format!("{}/screenshots", self.base_url))
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CaptureError::persistence_with("save request failed", e))?;
        if !response.status().is_success() {
            return Err(CaptureError::persistence(format!(
                "backend returned {}",
                response.status()
            )));
        }
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CaptureError::persistence_with("malformed save response", e))?;
        let id = payload
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| CaptureError::persistence("save response missing id"))?;
        Ok(SavedScreenshot {
            id,
            timestamp: SystemTime::now(),
        })
    }

    async fn mark_status(&self, screenshot_id: u64, status: AnalysisStatus) -> CaptureResult<()> {
        let response = self
            .client
            .patch(format!("{}/screenshots/{}", self.base_url, screenshot_id))
            .json(&serde_json::json!({ "analysis_status": status.as_str() }))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CaptureError::persistence_with("status update failed", e))?;
        if !response.status().is_success() {
            return Err(CaptureError::persistence(format!(
                "status update returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Vision-model client posting a data-URL prompt, in the shape the
/// `/v1/responses` style endpoints expect.
pub struct HttpFrameAnalyzer {
    client: reqwest::Client,
    url: String,
    prompt: String,
}

impl HttpFrameAnalyzer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            prompt: "Describe the user activity visible in this screenshot in one or two \
                     sentences, focusing on the application and the task in progress."
                .to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

#[async_trait]
impl FrameAnalyzer for HttpFrameAnalyzer {
    async fn analyze(&self, screenshot_id: u64, image: &CompressedImage) -> CaptureResult<String> {
        let input = format!("{} {}", self.prompt, image.to_data_url());
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "input": input }))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CaptureError::analysis(screenshot_id, e.to_string()))?;
        if !response.status().is_success() {
            return Err(CaptureError::analysis(
                screenshot_id,
                format!("model endpoint returned {}", response.status()),
            ));
        }
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CaptureError::analysis(screenshot_id, e.to_string()))?;
        let text = payload
            .get("output")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Size;

    fn img() -> CompressedImage {
        CompressedImage {
            jpeg: vec![0xff, 0xd8, 0xff, 0xe0],
            size: Size::new(2, 2),
            quality: 0.9,
        }
    }

    #[tokio::test]
    async fn disk_store_assigns_sequential_ids_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskScreenshotStore::create(dir.path()).unwrap();

        let first = store
            .save_screenshot(1, &img(), AnalysisStatus::Pending)
            .await
            .unwrap();
        let second = store
            .save_screenshot(1, &img(), AnalysisStatus::Pending)
            .await
            .unwrap();
        assert_eq!(first.id + 1, second.id);
        assert!(dir.path().join("000001.jpg").exists());
        assert!(dir.path().join("000002.jpg").exists());
    }

    #[tokio::test]
    async fn disk_store_journals_saves_and_status_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskScreenshotStore::create(dir.path()).unwrap();
        let saved = store
            .save_screenshot(7, &img(), AnalysisStatus::Pending)
            .await
            .unwrap();
        store
            .mark_status(saved.id, AnalysisStatus::Failed)
            .await
            .unwrap();

        let manifest = std::fs::read_to_string(dir.path().join("manifest.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = manifest
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["session_id"], 7);
        assert_eq!(lines[0]["status"], "pending");
        assert_eq!(lines[1]["status"], "failed");
    }
}
