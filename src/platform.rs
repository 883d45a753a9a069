//! Device capabilities consumed by the alert core.
//!
//! Each collaborator the shell provides (GPS, camera and microphone, SMS and
//! dial handoffs, prompts, local storage) sits behind a trait here. The core
//! never queries the platform for features; it asks for a [`Capability`] and
//! takes the fallback branch when the answer is `Unavailable`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::{Contact, LocationSample};

/// Errors reported by device collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out")]
    Timeout,

    #[error("platform failure: {0}")]
    Failed(String),
}

/// A capability the platform may or may not offer.
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }
}

/// Options for a position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest platform-cached fix the request may return.
    pub maximum_age: Duration,
}

impl PositionOptions {
    /// A fresh high-accuracy fix within `timeout`.
    pub fn fresh(timeout: Duration) -> Self {
        Self {
            high_accuracy: true,
            timeout,
            maximum_age: Duration::ZERO,
        }
    }

    /// Options for the background watch; coarse fixes in low-power mode.
    pub fn tracking(timeout: Duration, low_power: bool) -> Self {
        Self {
            high_accuracy: !low_power,
            timeout,
            maximum_age: Duration::ZERO,
        }
    }
}

/// Receiving end of a continuous position watch.
pub type PositionWatch = mpsc::Receiver<Result<LocationSample, PlatformError>>;

#[async_trait]
pub trait Geolocator: Send + Sync {
    /// One position fix. Implementations should honor `options.timeout`,
    /// but callers bound the wait themselves as well.
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> Result<LocationSample, PlatformError>;

    /// Start a continuous watch. Dropping the receiver ends it.
    fn watch_position(&self, options: PositionOptions) -> Result<PositionWatch, PlatformError>;
}

/// Whether the network is currently reachable.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Shell family, which decides the SMS recipient separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellFamily {
    Ios,
    #[default]
    Other,
}

impl ShellFamily {
    pub fn sms_separator(self) -> char {
        match self {
            ShellFamily::Ios => ';',
            ShellFamily::Other => ',',
        }
    }
}

/// A batched SMS compose request: one handoff, many recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsCompose {
    pub recipients: Vec<String>,
    pub body: String,
}

impl SmsCompose {
    /// The `sms:` URI the shell opens for this compose.
    pub fn to_uri(&self, shell: ShellFamily) -> String {
        let separator = shell.sms_separator().to_string();
        format!(
            "sms:{}?body={}",
            self.recipients.join(&separator),
            urlencoding::encode(&self.body)
        )
    }
}

/// Native SMS compose handoff.
#[async_trait]
pub trait SmsComposer: Send + Sync {
    async fn compose(&self, sms: &SmsCompose) -> Result<(), PlatformError>;
}

/// Native dial handoff.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, number: &str) -> Result<(), PlatformError>;
}

/// Interaction with the human holding the device.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question. `false` on decline or dismissal.
    async fn confirm(&self, question: &str) -> bool;

    /// Ask for a line of text. `None` on cancel.
    async fn ask(&self, question: &str) -> Option<String>;

    /// Show a short non-blocking notice.
    fn notify(&self, message: &str);
}

/// What kind of evidence to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

impl MediaKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/webm",
            MediaKind::Video => "video/webm",
            MediaKind::Image => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Audio | MediaKind::Video => "webm",
            MediaKind::Image => "jpg",
        }
    }
}

/// Constraints for opening a media stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub rear_camera: bool,
}

impl MediaConstraints {
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => Self {
                audio: true,
                video: false,
                rear_camera: false,
            },
            MediaKind::Video | MediaKind::Image => Self {
                audio: true,
                video: true,
                rear_camera: true,
            },
        }
    }
}

/// An open camera/microphone stream.
#[async_trait]
pub trait MediaStream: Send {
    async fn start_recording(&mut self) -> Result<(), PlatformError>;

    /// Stop the recorder and return the encoded bytes.
    async fn stop_recording(&mut self) -> Result<Vec<u8>, PlatformError>;

    /// Grab one still frame.
    async fn grab_frame(&mut self) -> Result<Vec<u8>, PlatformError>;

    /// Stop every track. Called exactly once per stream.
    fn release(&mut self);
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, PlatformError>;
}

/// Local persistence for evidence artifacts.
#[async_trait]
pub trait EvidenceVault: Send + Sync {
    async fn save(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<(), PlatformError>;
}

/// Native share sheet.
#[async_trait]
pub trait ShareSheet: Send + Sync {
    async fn share(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<(), PlatformError>;
}

/// The native contact picker.
#[async_trait]
pub trait ContactPicker: Send + Sync {
    /// Let the human pick contacts. Entries are `(name, phone)`.
    async fn select(&self) -> Result<Vec<(String, String)>, PlatformError>;
}

/// Offline copy of the contact list and last location.
pub trait LocalCache: Send + Sync {
    fn load_contacts(&self, owner_id: &str) -> Option<Vec<Contact>>;
    fn store_contacts(&self, owner_id: &str, contacts: &[Contact]);
    fn store_location(&self, sample: &LocationSample);
    fn load_location(&self) -> Option<LocationSample>;
}
