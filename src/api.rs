//! HTTP API handlers for the remote store.
//!
//! - **POST /contacts**: store an emergency contact for an owner.
//! - **GET /contacts?owner=**: list one owner's contacts. No owner, no contacts.
//! - **DELETE /contacts/{id}**: remove a contact.
//! - **POST /alerts**: store an SOS alert and relay it by SMS.
//! - **GET /alerts**: recent alerts without media bodies.
//!
//! Phone numbers and message bodies are never logged; counts and categories are.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::model::{
    AlertAck, AlertRecord, AlertRequest, AlertsQuery, Contact, ContactsQuery, GeoPoint,
    LegacySosRequest, NewContact, StoredAlert, is_sms_capable, server_alert_message,
};
use crate::relay::NotificationRelay;
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub relay: Arc<dyn NotificationRelay>,
}

/// Errors surfaced to clients as `{"success": false, "error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// Malformed input gets the same payload as every other failure.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Build the router with every route, legacy aliases included.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/contacts", post(post_contact).get(list_contacts))
        .route("/contacts/:id", delete(delete_contact))
        .route("/alerts", post(post_alert).get(list_alerts))
        .route("/health", get(health_check))
        .route("/api/contacts/add", post(post_contact))
        .route("/api/contacts/list", get(list_contacts))
        .route("/api/contacts/:id", delete(delete_contact))
        .route("/api/sos", post(post_legacy_sos))
        .with_state(state)
}

/// POST /contacts - Store an emergency contact.
///
/// # Request Body
///
/// ```json
/// { "owner_id": "u-123", "name": "Mom", "phone": "9998887777", "relation": "Mother" }
/// ```
///
/// `relation` defaults to "Emergency". Returns `201 Created` with the record.
#[instrument(skip_all)]
pub async fn post_contact(
    State(state): State<AppState>,
    payload: Result<Json<NewContact>, JsonRejection>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let Json(request) = payload?;
    if request.owner_id.trim().is_empty() {
        return Err(ApiError::BadRequest("owner_id is required".to_string()));
    }
    if request.name.trim().is_empty() || request.phone.trim().is_empty() {
        return Err(ApiError::BadRequest("name and phone are required".to_string()));
    }

    match state.storage.insert_contact(&request).await {
        Ok(contact) => {
            info!(contact_id = contact.id, "Contact stored");
            Ok((StatusCode::CREATED, Json(contact)))
        }
        Err(e) => {
            warn!(error = %e, "Failed to store contact");
            Err(ApiError::Internal(e))
        }
    }
}

/// GET /contacts?owner=<id> - List an owner's contacts.
///
/// A missing or blank owner yields an empty array rather than every record.
#[instrument(skip_all)]
pub async fn list_contacts(
    State(state): State<AppState>,
    query: Result<Query<ContactsQuery>, QueryRejection>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let Query(query) = query?;
    let Some(owner) = query.owner.filter(|o| !o.trim().is_empty()) else {
        info!("Contact list requested without owner");
        return Ok(Json(Vec::new()));
    };

    match state.storage.list_contacts(&owner).await {
        Ok(contacts) => {
            info!(count = contacts.len(), "Contacts listed");
            Ok(Json(contacts))
        }
        Err(e) => {
            warn!(error = %e, "Failed to list contacts");
            Err(ApiError::Internal(e))
        }
    }
}

/// DELETE /contacts/{id} - Remove a contact.
#[instrument(skip_all)]
pub async fn delete_contact(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = id?;
    match state.storage.delete_contact(id).await {
        Ok(true) => {
            info!(contact_id = id, "Contact deleted");
            Ok(Json(json!({ "message": "Contact deleted" })))
        }
        Ok(false) => Err(ApiError::NotFound(format!("contact {id} not found"))),
        Err(e) => {
            warn!(contact_id = id, error = %e, "Failed to delete contact");
            Err(ApiError::Internal(e))
        }
    }
}

/// POST /alerts - Store an SOS alert.
///
/// # Request Body
///
/// ```json
/// {
///     "category": "family",
///     "message": "SOS ALERT! ...",
///     "recipients": ["9998887777"],
///     "location": { "lat": 28.61, "lng": 77.2 },
///     "media": { "data": "<base64>", "mime_type": "video/webm" }
/// }
/// ```
///
/// Alerts without media are also relayed by SMS to every SMS-capable
/// recipient; evidence follow-ups are stored only, so a recording never
/// re-notifies. Relay failures are logged and do not fail the request.
#[instrument(skip_all, fields(category))]
pub async fn post_alert(
    State(state): State<AppState>,
    payload: Result<Json<AlertRequest>, JsonRejection>,
) -> Result<Json<AlertAck>, ApiError> {
    let Json(request) = payload?;
    tracing::Span::current().record("category", request.category.as_str());
    store_and_relay(&state, request).await.map(Json)
}

/// POST /api/sos - Older clients sending `{type, contacts, mediaData, mediaType}`.
#[instrument(skip_all)]
pub async fn post_legacy_sos(
    State(state): State<AppState>,
    payload: Result<Json<LegacySosRequest>, JsonRejection>,
) -> Result<Json<AlertAck>, ApiError> {
    let Json(request) = payload?;
    let kind = request.kind.clone();
    let Some(request) = request.into_alert_request() else {
        warn!(kind = %kind, "Unknown legacy alert type");
        return Err(ApiError::BadRequest(format!("unknown alert type {kind:?}")));
    };
    store_and_relay(&state, request).await.map(Json)
}

async fn store_and_relay(state: &AppState, request: AlertRequest) -> Result<AlertAck, ApiError> {
    let location = request.location.unwrap_or(GeoPoint::UNKNOWN);
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| server_alert_message(request.category, location));

    let record = AlertRecord {
        category: request.category,
        message,
        recipients: request.recipients,
        location,
        created_at: request.created_at.unwrap_or_else(Utc::now),
        media: request.media,
    };

    let id = match state.storage.insert_alert(&record).await {
        Ok(id) => id,
        Err(e) => {
            warn!(category = record.category.as_str(), error = %e, "Failed to store alert");
            return Err(ApiError::Internal(e));
        }
    };

    info!(
        alert_id = id,
        category = record.category.as_str(),
        recipients = record.recipients.len(),
        has_media = record.media.is_some(),
        "Alert stored"
    );

    if record.media.is_none() {
        let numbers: Vec<String> = record
            .recipients
            .iter()
            .filter(|n| is_sms_capable(n))
            .cloned()
            .collect();
        if !numbers.is_empty() {
            if let Err(e) = state.relay.send(&numbers, &record.message).await {
                warn!(alert_id = id, error = %e, "SMS relay failed");
            }
        }
    }

    Ok(AlertAck {
        success: true,
        id,
        msg: "SOS Saved Successfully".to_string(),
    })
}

/// GET /alerts - Recent alerts, newest first.
///
/// # Query Parameters
///
/// - `limit` (optional): maximum number of alerts (default: 20)
#[instrument(skip_all)]
pub async fn list_alerts(
    State(state): State<AppState>,
    query: Result<Query<AlertsQuery>, QueryRejection>,
) -> Result<Json<Vec<StoredAlert>>, ApiError> {
    let Query(query) = query?;
    match state.storage.recent_alerts(query.limit).await {
        Ok(alerts) => {
            info!(count = alerts.len(), limit = query.limit, "Alerts listed");
            Ok(Json(alerts))
        }
        Err(e) => {
            warn!(error = %e, "Failed to list alerts");
            Err(ApiError::Internal(e))
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
