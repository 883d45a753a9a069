//! Bounded-duration evidence capture.
//!
//! Capture runs beside dispatch and never delays it. Audio and video record
//! until the duration cap or a manual stop, whichever comes first; an image
//! is a single still frame. The media stream is released exactly once on
//! every exit path through [`StreamGuard`].

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::RemoteStore;
use crate::model::{AlertRecord, EmergencyCategory, GeoPoint, MediaPayload};
use crate::platform::{
    Connectivity, EvidenceVault, MediaConstraints, MediaDevices, MediaKind, MediaStream,
    PlatformError, Prompter, ShareSheet,
};

/// User-configurable handling of finished artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceSettings {
    pub save_locally: bool,
    pub share_after_capture: bool,
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self {
            save_locally: true,
            share_after_capture: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub kind: MediaKind,
    pub duration_cap: Duration,
    /// Started by an alert rather than by the human; failures stay silent.
    pub is_automatic: bool,
    /// Alert the follow-up upload belongs to.
    pub category: Option<EmergencyCategory>,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: MediaKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: MediaKind, bytes: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            file_name: format!(
                "SOS_Evidence_{}.{}",
                captured_at.timestamp_millis(),
                kind.extension()
            ),
            bytes,
            captured_at,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }
}

/// Why a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationCap,
    Manual,
    /// Image capture takes no time.
    Still,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { id: i64 },
    Offline,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceOutcome {
    Captured {
        artifact: Artifact,
        stopped_by: StopReason,
        saved: bool,
        shared: bool,
        upload: UploadOutcome,
    },
    Failed(PlatformError),
}

/// Releases the stream when dropped, so every exit path releases once.
struct StreamGuard {
    stream: Box<dyn MediaStream>,
}

impl StreamGuard {
    fn stream(&mut self) -> &mut dyn MediaStream {
        &mut *self.stream
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stream.release();
        debug!("Media stream released");
    }
}

/// Collaborators an artifact flows to after capture.
#[derive(Clone)]
pub struct EvidenceSinks {
    pub vault: Arc<dyn EvidenceVault>,
    pub share: Option<Arc<dyn ShareSheet>>,
    pub store: Arc<dyn RemoteStore>,
    pub connectivity: Arc<dyn Connectivity>,
    pub prompter: Arc<dyn Prompter>,
}

pub struct EvidenceCapturer {
    devices: Arc<dyn MediaDevices>,
    sinks: EvidenceSinks,
    settings: EvidenceSettings,
}

/// A capture running on its own task.
pub struct CaptureHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<EvidenceOutcome>,
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("stoppable", &self.stop.is_some())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl CaptureHandle {
    /// Stop recording early. Later calls do nothing.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    pub async fn join(self) -> EvidenceOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => EvidenceOutcome::Failed(PlatformError::Failed(e.to_string())),
        }
    }
}

impl EvidenceCapturer {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        sinks: EvidenceSinks,
        settings: EvidenceSettings,
    ) -> Self {
        Self {
            devices,
            sinks,
            settings,
        }
    }

    pub fn settings(&self) -> EvidenceSettings {
        self.settings
    }

    /// Spawn a capture. Keep the handle to stop it early.
    pub fn start(self: &Arc<Self>, request: CaptureRequest) -> CaptureHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let capturer = Arc::clone(self);
        let task = tokio::spawn(async move { capturer.capture(request, stop_rx).await });
        CaptureHandle {
            stop: Some(stop_tx),
            task,
        }
    }

    /// Capture, then save/share/upload the artifact.
    pub async fn capture(
        &self,
        request: CaptureRequest,
        stop: oneshot::Receiver<()>,
    ) -> EvidenceOutcome {
        let (artifact, stopped_by) = match self.record(&request, stop).await {
            Ok(captured) => captured,
            Err(e) => {
                warn!(kind = ?request.kind, error = %e, "Evidence capture failed");
                if !request.is_automatic {
                    self.sinks.prompter.notify("Recording failed.");
                }
                return EvidenceOutcome::Failed(e);
            }
        };

        info!(
            kind = ?artifact.kind,
            bytes = artifact.bytes.len(),
            stopped_by = ?stopped_by,
            "Evidence captured"
        );

        let saved = self.save(&artifact).await;
        let shared = self.share(&artifact).await;
        let upload = self.upload(&request, &artifact).await;

        if !request.is_automatic {
            let notice = match (&upload, saved) {
                (UploadOutcome::Failed(_), _) => "Evidence captured, upload failed.",
                (_, true) => "Evidence saved.",
                (_, false) => "Evidence captured.",
            };
            self.sinks.prompter.notify(notice);
        }

        EvidenceOutcome::Captured {
            artifact,
            stopped_by,
            saved,
            shared,
            upload,
        }
    }

    async fn record(
        &self,
        request: &CaptureRequest,
        stop: oneshot::Receiver<()>,
    ) -> Result<(Artifact, StopReason), PlatformError> {
        let stream = self
            .devices
            .open(MediaConstraints::for_kind(request.kind))
            .await?;
        let mut guard = StreamGuard { stream };

        if request.kind == MediaKind::Image {
            let frame = guard.stream().grab_frame().await?;
            return Ok((Artifact::new(request.kind, frame, Utc::now()), StopReason::Still));
        }

        guard.stream().start_recording().await?;
        let stopped_by = tokio::select! {
            _ = tokio::time::sleep(request.duration_cap) => StopReason::DurationCap,
            // A dropped handle counts as "no manual stop": wait for the cap.
            Ok(()) = stop => StopReason::Manual,
        };
        let bytes = guard.stream().stop_recording().await?;

        Ok((Artifact::new(request.kind, bytes, Utc::now()), stopped_by))
    }

    async fn save(&self, artifact: &Artifact) -> bool {
        if !self.settings.save_locally {
            return false;
        }
        match self
            .sinks
            .vault
            .save(&artifact.file_name, artifact.mime_type(), &artifact.bytes)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Saving evidence locally failed");
                false
            }
        }
    }

    async fn share(&self, artifact: &Artifact) -> bool {
        if !self.settings.share_after_capture {
            return false;
        }
        let Some(share) = &self.sinks.share else {
            return false;
        };
        match share
            .share(&artifact.file_name, artifact.mime_type(), &artifact.bytes)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Share handoff failed");
                false
            }
        }
    }

    async fn upload(&self, request: &CaptureRequest, artifact: &Artifact) -> UploadOutcome {
        if !self.sinks.connectivity.is_online() {
            return UploadOutcome::Offline;
        }

        let category = request.category.unwrap_or(EmergencyCategory::Critical);
        let record = AlertRecord {
            category,
            message: format!("Evidence for {}", category.title()),
            recipients: Vec::new(),
            location: request.location,
            created_at: artifact.captured_at,
            media: Some(MediaPayload {
                data: STANDARD.encode(&artifact.bytes),
                mime_type: artifact.mime_type().to_string(),
            }),
        };

        match self.sinks.store.submit_alert(&record).await {
            Ok(ack) => UploadOutcome::Uploaded { id: ack.id },
            Err(e) => {
                warn!(error = %e, "Evidence upload failed");
                UploadOutcome::Failed(e.to_string())
            }
        }
    }
}
