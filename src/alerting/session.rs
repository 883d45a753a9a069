//! Wires the stages together for one device.
//!
//! [`AlertSession`] owns the gesture channel: on-screen bursts from the
//! [`TapAccumulator`] and wearable triggers both land there. Each gesture is
//! handled by the [`AlertPipeline`] on its own task, so taps during an
//! in-flight alert start a fresh cycle instead of waiting for it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Gesture;
use super::classify::{ClassifyError, EmergencyClass, GestureClassifier};
use super::contacts::ContactBook;
use super::dispatch::{AlertDispatcher, DispatchOutcome};
use super::evidence::{CaptureHandle, CaptureRequest, EvidenceCapturer};
use super::location::{LocationResolver, LocationTracker, ResolvedLocation};
use super::tap::TapAccumulator;
use super::wearable::WearableListener;
use crate::config::AlertConfig;
use crate::model::GeoPoint;
use crate::platform::Prompter;

/// What became of one gesture.
#[derive(Debug)]
pub enum SessionEvent {
    /// No rule covers the tap count.
    Ignored { taps: u32 },
    /// The class needs contacts and none are configured.
    ContactsRequired { interactive: bool },
    /// The human declined the confirmation; nothing was sent or captured.
    Declined { class: EmergencyClass },
    Dispatched {
        class: EmergencyClass,
        location: ResolvedLocation,
        outcome: DispatchOutcome,
        /// Evidence keeps recording after dispatch returns.
        evidence: CaptureHandle,
    },
}

/// Classification and fan-out for a single gesture.
pub struct AlertPipeline {
    classifier: GestureClassifier,
    contacts: Arc<Mutex<ContactBook>>,
    resolver: LocationResolver,
    dispatcher: AlertDispatcher,
    capturer: Arc<EvidenceCapturer>,
    prompter: Arc<dyn Prompter>,
    capture_cap: Duration,
    fix_timeout: Duration,
}

impl AlertPipeline {
    pub fn new(
        config: &AlertConfig,
        contacts: Arc<Mutex<ContactBook>>,
        resolver: LocationResolver,
        dispatcher: AlertDispatcher,
        capturer: Arc<EvidenceCapturer>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            classifier: GestureClassifier::standard(&config.services),
            contacts,
            resolver,
            dispatcher,
            capturer,
            prompter,
            capture_cap: config.capture_cap,
            fix_timeout: config.fix_timeout,
        }
    }

    pub fn with_classifier(mut self, classifier: GestureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// The contact list the classifier reads; shared with the management UI.
    pub fn contacts(&self) -> Arc<Mutex<ContactBook>> {
        Arc::clone(&self.contacts)
    }

    pub async fn handle(&self, gesture: Gesture) -> SessionEvent {
        let contacts = self.contacts.lock().await.contacts().to_vec();

        let class = match self
            .classifier
            .classify(gesture.taps, gesture.from_device, &contacts)
        {
            Ok(class) => class,
            Err(ClassifyError::NoGesture) => {
                debug!(taps = gesture.taps, "Gesture matches no rule");
                return SessionEvent::Ignored { taps: gesture.taps };
            }
            Err(ClassifyError::NoContactsConfigured) => {
                let interactive = !gesture.from_device;
                info!(interactive, "Gesture needs contacts, none configured");
                if interactive {
                    self.prompter
                        .notify("No emergency contacts found! Please add contacts first.");
                }
                return SessionEvent::ContactsRequired { interactive };
            }
        };

        if !self.dispatcher.confirm(&class).await {
            return SessionEvent::Declined { class };
        }

        // The capture is tagged with whatever fix is already known; the
        // resolver may improve on it for the alert itself.
        let known_point = self
            .resolver
            .cache()
            .sample()
            .map(|s| s.point())
            .unwrap_or(GeoPoint::UNKNOWN);
        let evidence = self.capturer.start(CaptureRequest {
            kind: class.evidence,
            duration_cap: self.capture_cap,
            is_automatic: true,
            category: Some(class.category),
            location: known_point,
        });

        let location = self.resolver.resolve(self.fix_timeout).await;
        let outcome = self.dispatcher.dispatch_confirmed(&class, &location).await;

        SessionEvent::Dispatched {
            class,
            location,
            outcome,
            evidence,
        }
    }
}

/// A running alert session. Drop or [`AlertSession::shutdown`] to stop it.
pub struct AlertSession {
    taps: TapAccumulator,
    gestures: mpsc::UnboundedSender<Gesture>,
    router: JoinHandle<()>,
    tracker: Option<LocationTracker>,
    wearable: Option<WearableListener>,
}

impl AlertSession {
    /// Start routing gestures into `pipeline`. Every handled gesture is
    /// reported on the returned receiver.
    pub fn start(
        pipeline: Arc<AlertPipeline>,
        quiet_period: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (gesture_tx, mut gesture_rx) = mpsc::unbounded_channel::<Gesture>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let router = tokio::spawn(async move {
            while let Some(gesture) = gesture_rx.recv().await {
                info!(taps = gesture.taps, from_device = gesture.from_device, "Gesture received");
                let pipeline = Arc::clone(&pipeline);
                let events = event_tx.clone();
                tokio::spawn(async move {
                    let event = pipeline.handle(gesture).await;
                    let _ = events.send(event);
                });
            }
        });

        let session = Self {
            taps: TapAccumulator::new(quiet_period, gesture_tx.clone()),
            gestures: gesture_tx,
            router,
            tracker: None,
            wearable: None,
        };
        (session, event_rx)
    }

    pub fn register_tap(&self) {
        self.taps.register_tap();
    }

    pub fn pending_taps(&self) -> u32 {
        self.taps.pending_taps()
    }

    /// Inject a finished gesture, bypassing the accumulator.
    pub fn trigger(&self, gesture: Gesture) {
        let _ = self.gestures.send(gesture);
    }

    /// Keep a background tracker alive for as long as the session runs.
    pub fn attach_tracker(&mut self, tracker: LocationTracker) {
        if let Some(previous) = self.tracker.replace(tracker) {
            previous.stop();
        }
    }

    /// Route wearable characteristic notifications into the session.
    pub fn attach_wearable(&mut self, notifications: mpsc::Receiver<Vec<u8>>) {
        let listener = WearableListener::start(notifications, self.gestures.clone());
        if let Some(previous) = self.wearable.replace(listener) {
            previous.stop();
        }
    }

    /// Cancel the pending burst and the location watch. Alerts already in
    /// flight finish, and their captures run to the cap.
    pub fn shutdown(&mut self) {
        self.taps.cancel();
        if let Some(tracker) = self.tracker.take() {
            tracker.stop();
        }
        if let Some(wearable) = self.wearable.take() {
            wearable.stop();
        }
        self.router.abort();
        info!("Alert session stopped");
    }
}

impl Drop for AlertSession {
    fn drop(&mut self) {
        self.router.abort();
    }
}
