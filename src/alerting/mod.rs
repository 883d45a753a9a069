//! The on-device alert core.
//!
//! A burst of taps (or a wearable trigger) becomes a [`Gesture`], the
//! gesture is classified into an emergency class, and the class fans out to
//! location resolution, dispatch and evidence capture. Device collaborators
//! are reached only through the traits in [`crate::platform`].

pub mod classify;
pub mod contacts;
pub mod dispatch;
pub mod evidence;
pub mod location;
pub mod session;
pub mod tap;
pub mod wearable;

pub use classify::{ClassifyError, EmergencyClass, GestureClassifier, GestureRule, TapRange};
pub use contacts::{ContactBook, ContactError, ContactSource};
pub use dispatch::{AlertDispatcher, DispatchChannels, DispatchOutcome, compose_message};
pub use evidence::{
    CaptureHandle, CaptureRequest, EvidenceCapturer, EvidenceOutcome, EvidenceSettings,
    EvidenceSinks,
};
pub use location::{Freshness, LastKnownCache, LocationResolver, LocationTracker, ResolvedLocation};
pub use session::{AlertPipeline, AlertSession, SessionEvent};
pub use tap::TapAccumulator;
pub use wearable::{WearableListener, WearableSignal};

/// A finished tap burst, ready to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gesture {
    pub taps: u32,
    /// Triggered from a paired wearable rather than the screen.
    pub from_device: bool,
}
