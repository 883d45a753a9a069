//! Client for the remote store API.
//!
//! Used by the alert core to submit alerts and manage contacts. The store
//! reports failures as a generic `{"error": "..."}` payload, so errors here
//! only distinguish transport, status and decoding problems.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::DEFAULT_HTTP_TIMEOUT;
use crate::model::{AlertAck, AlertRecord, Contact, NewContact};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote store returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// The remote store as seen by the alert core.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn submit_alert(&self, alert: &AlertRecord) -> Result<AlertAck, ClientError>;
    async fn add_contact(&self, contact: &NewContact) -> Result<Contact, ClientError>;
    async fn list_contacts(&self, owner_id: &str) -> Result<Vec<Contact>, ClientError>;
    async fn delete_contact(&self, id: i64) -> Result<(), ClientError>;
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

/// reqwest-backed [`RemoteStore`].
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    /// Every request fails with a transport error after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            message: body.error,
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn submit_alert(&self, alert: &AlertRecord) -> Result<AlertAck, ClientError> {
        let response = self.client.post(self.url("/alerts")).json(alert).send().await?;
        let ack = Self::check(response).await?.json::<AlertAck>().await?;
        Ok(ack)
    }

    async fn add_contact(&self, contact: &NewContact) -> Result<Contact, ClientError> {
        let response = self
            .client
            .post(self.url("/contacts"))
            .json(contact)
            .send()
            .await?;
        let contact = Self::check(response).await?.json::<Contact>().await?;
        Ok(contact)
    }

    async fn list_contacts(&self, owner_id: &str) -> Result<Vec<Contact>, ClientError> {
        let url = format!(
            "{}?owner={}",
            self.url("/contacts"),
            urlencoding::encode(owner_id)
        );
        let response = self.client.get(&url).send().await?;
        let contacts = Self::check(response).await?.json::<Vec<Contact>>().await?;
        Ok(contacts)
    }

    async fn delete_contact(&self, id: i64) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/contacts/{id}")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
