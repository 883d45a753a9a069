//! In-memory stand-ins for every device collaborator and the remote store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use suraksha::alerting::{
    AlertDispatcher, AlertPipeline, ContactBook, DispatchChannels, EvidenceCapturer,
    EvidenceSettings, EvidenceSinks, LastKnownCache, LocationResolver,
};
use suraksha::client::{ClientError, RemoteStore};
use suraksha::config::AlertConfig;
use suraksha::model::{AlertAck, AlertRecord, Contact, LocationSample, NewContact};
use suraksha::platform::{
    Capability, Connectivity, ContactPicker, Dialer, EvidenceVault, Geolocator, LocalCache,
    MediaConstraints, MediaDevices, MediaStream, PlatformError, PositionOptions, PositionWatch,
    Prompter, SmsCompose, SmsComposer,
};

/// Remote store keeping everything in memory; can be switched to failing.
#[derive(Default)]
pub struct MemoryStore {
    pub alerts: Mutex<Vec<AlertRecord>>,
    pub contacts: Mutex<Vec<Contact>>,
    pub failing: AtomicBool,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 503,
                message: "store unavailable".to_string(),
            });
        }
        Ok(())
    }

    /// Alerts sent by dispatch, leaving out evidence follow-ups.
    pub fn dispatched_alerts(&self) -> Vec<AlertRecord> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.media.is_none())
            .cloned()
            .collect()
    }

    pub fn evidence_uploads(&self) -> Vec<AlertRecord> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.media.is_some())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn submit_alert(&self, alert: &AlertRecord) -> Result<AlertAck, ClientError> {
        self.check()?;
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(AlertAck {
            success: true,
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            msg: "SOS Saved Successfully".to_string(),
        })
    }

    async fn add_contact(&self, contact: &NewContact) -> Result<Contact, ClientError> {
        self.check()?;
        let stored = Contact {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            owner_id: contact.owner_id.clone(),
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            relation: contact.relation.clone(),
        };
        self.contacts.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list_contacts(&self, owner_id: &str) -> Result<Vec<Contact>, ClientError> {
        self.check()?;
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn delete_contact(&self, id: i64) -> Result<(), ClientError> {
        self.check()?;
        self.contacts.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }
}

/// Remote store that takes every request and never answers.
pub struct HangingStore;

#[async_trait]
impl RemoteStore for HangingStore {
    async fn submit_alert(&self, _alert: &AlertRecord) -> Result<AlertAck, ClientError> {
        std::future::pending().await
    }

    async fn add_contact(&self, _contact: &NewContact) -> Result<Contact, ClientError> {
        std::future::pending().await
    }

    async fn list_contacts(&self, _owner_id: &str) -> Result<Vec<Contact>, ClientError> {
        std::future::pending().await
    }

    async fn delete_contact(&self, _id: i64) -> Result<(), ClientError> {
        std::future::pending().await
    }
}

pub struct Network(AtomicBool);

impl Network {
    pub fn online() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn offline() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for Network {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// GPS that answers every request with the same result.
pub struct FixedGps {
    fix: Option<LocationSample>,
    /// Watches whose receiver has been dropped.
    pub watches_closed: Arc<AtomicUsize>,
}

impl FixedGps {
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            fix: Some(LocationSample::new(lat, lng, Some(8.0), Utc::now())),
            watches_closed: Arc::default(),
        }
    }

    pub fn denied() -> Self {
        Self {
            fix: None,
            watches_closed: Arc::default(),
        }
    }
}

#[async_trait]
impl Geolocator for FixedGps {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<LocationSample, PlatformError> {
        self.fix
            .clone()
            .map(|s| LocationSample { timestamp: Utc::now(), ..s })
            .ok_or_else(|| PlatformError::PermissionDenied("location".to_string()))
    }

    fn watch_position(&self, _options: PositionOptions) -> Result<PositionWatch, PlatformError> {
        let (tx, rx) = mpsc::channel(1);
        if let Some(fix) = self.fix.clone() {
            let _ = tx.try_send(Ok(fix));
        }
        // Keep the watch open until the receiver goes away.
        let closed = Arc::clone(&self.watches_closed);
        tokio::spawn(async move {
            tx.closed().await;
            closed.fetch_add(1, Ordering::SeqCst);
        });
        Ok(rx)
    }
}

#[derive(Default)]
pub struct RecordingSms {
    pub composed: Mutex<Vec<SmsCompose>>,
}

#[async_trait]
impl SmsComposer for RecordingSms {
    async fn compose(&self, sms: &SmsCompose) -> Result<(), PlatformError> {
        self.composed.lock().unwrap().push(sms.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDialer {
    pub dialed: Mutex<Vec<String>>,
}

#[async_trait]
impl Dialer for RecordingDialer {
    async fn dial(&self, number: &str) -> Result<(), PlatformError> {
        self.dialed.lock().unwrap().push(number.to_string());
        Ok(())
    }
}

/// Prompter with scripted answers.
pub struct ScriptedPrompter {
    confirm: bool,
    answers: Mutex<Vec<String>>,
    pub questions: Mutex<Vec<String>>,
    pub notices: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn accepting() -> Self {
        Self::new(true, Vec::new())
    }

    pub fn declining() -> Self {
        Self::new(false, Vec::new())
    }

    /// Answers `ask` calls in order, then cancels.
    pub fn answering(answers: &[&str]) -> Self {
        Self::new(true, answers.iter().map(|a| a.to_string()).collect())
    }

    fn new(confirm: bool, answers: Vec<String>) -> Self {
        Self {
            confirm,
            answers: Mutex::new(answers),
            questions: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
        }
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, question: &str) -> bool {
        self.questions.lock().unwrap().push(question.to_string());
        self.confirm
    }

    async fn ask(&self, question: &str) -> Option<String> {
        self.questions.lock().unwrap().push(question.to_string());
        let mut answers = self.answers.lock().unwrap();
        if answers.is_empty() {
            None
        } else {
            Some(answers.remove(0))
        }
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

/// Camera and microphone producing canned bytes.
#[derive(Default)]
pub struct FakeCamera {
    pub opened: Mutex<Vec<MediaConstraints>>,
    pub released: Arc<AtomicUsize>,
    pub frames: Arc<AtomicUsize>,
}

struct FakeStream {
    released: Arc<AtomicUsize>,
    frames: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaStream for FakeStream {
    async fn start_recording(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<Vec<u8>, PlatformError> {
        Ok(b"webm".to_vec())
    }

    async fn grab_frame(&mut self) -> Result<Vec<u8>, PlatformError> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(b"jpeg".to_vec())
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaDevices for FakeCamera {
    async fn open(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, PlatformError> {
        self.opened.lock().unwrap().push(constraints);
        Ok(Box::new(FakeStream {
            released: Arc::clone(&self.released),
            frames: Arc::clone(&self.frames),
        }))
    }
}

#[derive(Default)]
pub struct MemoryVault {
    pub files: Mutex<Vec<String>>,
}

#[async_trait]
impl EvidenceVault for MemoryVault {
    async fn save(
        &self,
        file_name: &str,
        _mime_type: &str,
        _bytes: &[u8],
    ) -> Result<(), PlatformError> {
        self.files.lock().unwrap().push(file_name.to_string());
        Ok(())
    }
}

/// Picker returning a fixed selection.
pub struct FixedPicker(pub Vec<(String, String)>);

#[async_trait]
impl ContactPicker for FixedPicker {
    async fn select(&self) -> Result<Vec<(String, String)>, PlatformError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    pub contacts: Mutex<HashMap<String, Vec<Contact>>>,
    pub location: Mutex<Option<LocationSample>>,
}

impl LocalCache for MemoryCache {
    fn load_contacts(&self, owner_id: &str) -> Option<Vec<Contact>> {
        self.contacts.lock().unwrap().get(owner_id).cloned()
    }

    fn store_contacts(&self, owner_id: &str, contacts: &[Contact]) {
        self.contacts
            .lock()
            .unwrap()
            .insert(owner_id.to_string(), contacts.to_vec());
    }

    fn store_location(&self, sample: &LocationSample) {
        *self.location.lock().unwrap() = Some(sample.clone());
    }

    fn load_location(&self) -> Option<LocationSample> {
        self.location.lock().unwrap().clone()
    }
}

pub fn contact(owner: &str, name: &str, phone: &str) -> Contact {
    Contact {
        id: 1,
        owner_id: owner.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        relation: "Emergency".to_string(),
    }
}

/// A whole device: every fake wired into one pipeline.
pub struct Device {
    pub store: Arc<MemoryStore>,
    pub network: Arc<Network>,
    pub sms: Arc<RecordingSms>,
    pub dialer: Arc<RecordingDialer>,
    pub prompter: Arc<ScriptedPrompter>,
    pub camera: Arc<FakeCamera>,
    pub vault: Arc<MemoryVault>,
    pub cache: Arc<MemoryCache>,
    pub gps: Arc<FixedGps>,
    pub config: AlertConfig,
}

impl Device {
    pub fn new(
        store: MemoryStore,
        network: Network,
        prompter: ScriptedPrompter,
        gps: FixedGps,
    ) -> Self {
        Self {
            store: Arc::new(store),
            network: Arc::new(network),
            sms: Arc::new(RecordingSms::default()),
            dialer: Arc::new(RecordingDialer::default()),
            prompter: Arc::new(prompter),
            camera: Arc::new(FakeCamera::default()),
            vault: Arc::new(MemoryVault::default()),
            cache: Arc::new(MemoryCache::default()),
            gps: Arc::new(gps),
            config: AlertConfig {
                capture_cap: Duration::from_secs(10),
                fix_timeout: Duration::from_secs(4),
                submit_timeout: Duration::from_secs(8),
                dial_delay: Duration::from_millis(1500),
                ..AlertConfig::default()
            },
        }
    }

    pub fn contact_book(&self, owner: &str) -> ContactBook {
        ContactBook::new(
            owner,
            self.store.clone(),
            self.cache.clone(),
            self.network.clone(),
            Capability::Unavailable,
            self.prompter.clone(),
        )
    }

    /// Pipeline whose contact book holds `contacts` without touching the store.
    pub async fn pipeline(&self, contacts: &[Contact]) -> AlertPipeline {
        self.cache.store_contacts("alice", contacts);
        let mut offline_view = ContactBook::new(
            "alice",
            self.store.clone(),
            self.cache.clone(),
            Arc::new(Network::offline()),
            Capability::Unavailable,
            self.prompter.clone(),
        );
        offline_view.load().await;
        self.pipeline_with_book(offline_view)
    }

    pub fn pipeline_with_book(&self, book: ContactBook) -> AlertPipeline {
        let resolver = LocationResolver::new(self.gps.clone(), LastKnownCache::new())
            .with_local_cache(self.cache.clone());
        let dispatcher = self.dispatcher(self.store.clone());
        let capturer = EvidenceCapturer::new(
            self.camera.clone(),
            EvidenceSinks {
                vault: self.vault.clone(),
                share: None,
                store: self.store.clone(),
                connectivity: self.network.clone(),
                prompter: self.prompter.clone(),
            },
            EvidenceSettings::default(),
        );
        AlertPipeline::new(
            &self.config,
            Arc::new(tokio::sync::Mutex::new(book)),
            resolver,
            dispatcher,
            Arc::new(capturer),
            self.prompter.clone(),
        )
    }

    /// Dispatcher wired to this device's fakes and the given store.
    pub fn dispatcher(&self, store: Arc<dyn RemoteStore>) -> AlertDispatcher {
        AlertDispatcher::new(
            DispatchChannels {
                store,
                connectivity: self.network.clone(),
                sms: self.sms.clone(),
                dialer: self.dialer.clone(),
                prompter: self.prompter.clone(),
            },
            self.config.dial_delay,
        )
        .with_submit_timeout(self.config.submit_timeout)
    }

    pub fn composed(&self) -> Vec<SmsCompose> {
        self.sms.composed.lock().unwrap().clone()
    }

    pub fn dialed(&self) -> Vec<String> {
        self.dialer.dialed.lock().unwrap().clone()
    }
}
