//! The emergency contact list of one owner, usable offline.
//!
//! The list is loaded from the remote store when possible and mirrored into
//! the local cache; offline, the cached copy is used. Adding contacts goes
//! through the native picker when the platform has one and falls back to
//! manual entry otherwise.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::dispatch::UNKNOWN_PLACE;
use super::location::ResolvedLocation;
use crate::client::RemoteStore;
use crate::model::{Contact, NewContact, UNKNOWN_LOCATION_PHRASE, map_link};
use crate::platform::{
    Capability, Connectivity, ContactPicker, LocalCache, PlatformError, Prompter, SmsCompose,
    SmsComposer,
};

/// Not yet stored remotely.
fn is_pending(contact: &Contact) -> bool {
    contact.id < 0
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContactError {
    #[error("no emergency contacts configured")]
    NoContacts,

    #[error("contact entry cancelled")]
    Cancelled,

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Where the current contact list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactSource {
    Remote,
    LocalCache,
    Empty,
}

pub struct ContactBook {
    owner_id: String,
    contacts: Vec<Contact>,
    store: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalCache>,
    connectivity: Arc<dyn Connectivity>,
    picker: Capability<Arc<dyn ContactPicker>>,
    prompter: Arc<dyn Prompter>,
}

impl ContactBook {
    pub fn new(
        owner_id: impl Into<String>,
        store: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalCache>,
        connectivity: Arc<dyn Connectivity>,
        picker: Capability<Arc<dyn ContactPicker>>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            contacts: Vec::new(),
            store,
            local,
            connectivity,
            picker,
            prompter,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Refresh from the remote store, falling back to the local copy.
    ///
    /// Contacts added while offline are uploaded first. Any that still
    /// cannot be stored stay on the list with their local id.
    pub async fn load(&mut self) -> ContactSource {
        let mut cached = self.local.load_contacts(&self.owner_id);

        if self.connectivity.is_online() {
            if let Some(cached) = cached.as_mut() {
                if self.upload_pending(cached).await > 0 {
                    self.local.store_contacts(&self.owner_id, cached.as_slice());
                }
            }

            match self.store.list_contacts(&self.owner_id).await {
                Ok(mut contacts) => {
                    contacts.extend(cached.iter().flatten().filter(|c| is_pending(c)).cloned());
                    info!(count = contacts.len(), "Contacts loaded from remote store");
                    self.local.store_contacts(&self.owner_id, &contacts);
                    self.contacts = contacts;
                    return ContactSource::Remote;
                }
                Err(e) => warn!(error = %e, "Loading contacts failed, using local copy"),
            }
        }

        match cached {
            Some(contacts) => {
                debug!(count = contacts.len(), "Contacts loaded from local cache");
                self.contacts = contacts;
                ContactSource::LocalCache
            }
            None => {
                self.contacts.clear();
                ContactSource::Empty
            }
        }
    }

    /// Store pending contacts remotely, replacing them with the stored
    /// records. Stops at the first failure. Returns how many were uploaded.
    async fn upload_pending(&self, contacts: &mut [Contact]) -> usize {
        let mut uploaded = 0;
        for contact in contacts.iter_mut().filter(|c| is_pending(c)) {
            let request = NewContact {
                owner_id: contact.owner_id.clone(),
                name: contact.name.clone(),
                phone: contact.phone.clone(),
                relation: contact.relation.clone(),
            };
            match self.store.add_contact(&request).await {
                Ok(stored) => {
                    *contact = stored;
                    uploaded += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Uploading pending contact failed");
                    break;
                }
            }
        }
        if uploaded > 0 {
            info!(count = uploaded, "Pending contacts uploaded");
        }
        uploaded
    }

    /// Add contacts through the picker, or by manual entry without one.
    ///
    /// Returns how many contacts were added.
    pub async fn add_contacts(&mut self) -> Result<usize, ContactError> {
        let picked = match &self.picker {
            Capability::Available(picker) => match picker.select().await {
                Ok(entries) => Some(entries),
                Err(e) => {
                    debug!(error = %e, "Contact picker failed, asking manually");
                    None
                }
            },
            Capability::Unavailable => None,
        };

        let entries = match picked {
            Some(entries) => entries,
            None => vec![self.manual_entry().await?],
        };

        let mut added = 0;
        for (name, phone) in entries {
            self.save(NewContact::new(self.owner_id.clone(), name, phone)).await;
            added += 1;
        }
        Ok(added)
    }

    async fn manual_entry(&self) -> Result<(String, String), ContactError> {
        let name = self
            .prompter
            .ask("Enter Name:")
            .await
            .filter(|n| !n.trim().is_empty())
            .ok_or(ContactError::Cancelled)?;
        let phone = self
            .prompter
            .ask("Enter Phone Number:")
            .await
            .filter(|p| !p.trim().is_empty())
            .ok_or(ContactError::Cancelled)?;
        Ok((name.trim().to_string(), phone.trim().to_string()))
    }

    /// Keep the contact locally at once; save remotely best-effort.
    /// Unsaved contacts are uploaded by the next online [`Self::load`].
    async fn save(&mut self, contact: NewContact) {
        let stored = if self.connectivity.is_online() {
            match self.store.add_contact(&contact).await {
                Ok(stored) => Some(stored),
                Err(e) => {
                    warn!(error = %e, "Saving contact remotely failed");
                    None
                }
            }
        } else {
            None
        };

        let stored = stored.unwrap_or_else(|| Contact {
            id: self.next_local_id(),
            owner_id: contact.owner_id,
            name: contact.name,
            phone: contact.phone,
            relation: contact.relation,
        });

        self.contacts.push(stored);
        self.local.store_contacts(&self.owner_id, &self.contacts);
    }

    /// Ids below zero are local to this device until the remote store
    /// accepts the contact.
    fn next_local_id(&self) -> i64 {
        self.contacts.iter().map(|c| c.id).min().unwrap_or(0).min(0) - 1
    }

    /// Remove a contact locally and, best-effort, remotely.
    pub async fn remove(&mut self, id: i64) -> bool {
        let before = self.contacts.len();
        self.contacts.retain(|c| c.id != id);
        let removed = self.contacts.len() != before;

        if removed {
            self.local.store_contacts(&self.owner_id, &self.contacts);
            if self.connectivity.is_online() && id > 0 {
                if let Err(e) = self.store.delete_contact(id).await {
                    warn!(contact_id = id, error = %e, "Deleting contact remotely failed");
                }
            }
        }
        removed
    }

    /// Send the current location to every contact in one SMS compose.
    pub async fn share_location(
        &self,
        location: &ResolvedLocation,
        sms: &dyn SmsComposer,
    ) -> Result<SmsCompose, ContactError> {
        if self.contacts.is_empty() {
            self.prompter.notify("Please add emergency contacts first!");
            return Err(ContactError::NoContacts);
        }

        let place = location.place.as_deref().unwrap_or(UNKNOWN_PLACE);
        let link = if location.is_unknown() {
            None
        } else {
            map_link(location.sample.point())
        };
        let body = match link {
            Some(link) => format!("SOS! Sharing Location. I am at {place}. Location Map: {link}"),
            None => format!("SOS! Sharing Location. {UNKNOWN_LOCATION_PHRASE}."),
        };

        let compose = SmsCompose {
            recipients: self.contacts.iter().map(|c| c.phone.clone()).collect(),
            body,
        };
        info!(recipients = compose.recipients.len(), "Sharing location");
        sms.compose(&compose).await?;
        Ok(compose)
    }
}
