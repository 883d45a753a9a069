//! Data models shared by the alert core and the remote store.
//!
//! # Location honesty
//!
//! `(0, 0)` is reserved as the "no fix obtained" sentinel. Nothing in this
//! module ever renders it as a real coordinate: [`map_link`] returns `None`
//! for it and callers substitute [`UNKNOWN_LOCATION_PHRASE`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phrase used in every outgoing message when no fix is available.
pub const UNKNOWN_LOCATION_PHRASE: &str = "Location unavailable";

/// Relation assigned to contacts created without one.
pub const DEFAULT_RELATION: &str = "Emergency";

/// Minimum digit count for a number to be worth an SMS.
///
/// Service short-codes such as `100` or `108` are meant for dialing.
const MIN_SMS_DIGITS: usize = 7;

/// The emergency category a gesture was classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyCategory {
    /// Single tap: routed to the police short-code.
    Police,
    /// Two taps: routed to the ambulance short-code.
    Medical,
    /// Three taps: routed to the stored emergency contacts.
    Family,
    /// Four or more taps: ambulance plus every contact.
    Critical,
}

impl EmergencyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EmergencyCategory::Police => "police",
            EmergencyCategory::Medical => "medical",
            EmergencyCategory::Family => "family",
            EmergencyCategory::Critical => "critical",
        }
    }

    /// Human-readable label used in prompts and messages.
    pub fn title(self) -> &'static str {
        match self {
            EmergencyCategory::Police => "Police Emergency",
            EmergencyCategory::Medical => "Ambulance Emergency",
            EmergencyCategory::Family => "Family Emergency",
            EmergencyCategory::Critical => "Critical Emergency",
        }
    }

    /// Parse either the wire name (`"police"`) or a title (`"Police Emergency"`).
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        let first = lowered.split_whitespace().next().unwrap_or_default();
        match first {
            "police" => Some(EmergencyCategory::Police),
            "medical" | "ambulance" => Some(EmergencyCategory::Medical),
            "family" => Some(EmergencyCategory::Family),
            "critical" | "water" => Some(EmergencyCategory::Critical),
            _ => None,
        }
    }
}

/// A bare coordinate pair as stored with an alert.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// The reserved "no fix" sentinel.
    pub const UNKNOWN: GeoPoint = GeoPoint { lat: 0.0, lng: 0.0 };

    pub fn is_unknown(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// A single location fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    /// Accuracy radius in meters, when the platform reports one.
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(lat: f64, lng: f64, accuracy: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat,
            lng,
            accuracy,
            timestamp,
        }
    }

    /// The `(0, 0)` sentinel stamped with `at`.
    pub fn unknown(at: DateTime<Utc>) -> Self {
        Self::new(0.0, 0.0, None, at)
    }

    pub fn is_unknown(&self) -> bool {
        self.point().is_unknown()
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Map link for a point, or `None` for the sentinel.
pub fn map_link(point: GeoPoint) -> Option<String> {
    if point.is_unknown() {
        return None;
    }
    Some(format!(
        "https://www.google.com/maps?q={},{}",
        point.lat, point.lng
    ))
}

/// Whether `number` looks like a phone that can receive an SMS.
///
/// Separators (`+`, spaces, dashes, parentheses) are ignored; anything else
/// disqualifies the number.
pub fn is_sms_capable(number: &str) -> bool {
    let mut digits = 0;
    for ch in number.chars() {
        match ch {
            '0'..='9' => digits += 1,
            '+' | ' ' | '-' | '(' | ')' => {}
            _ => return false,
        }
    }
    digits >= MIN_SMS_DIGITS
}

/// Order-preserving de-duplication of recipient numbers.
pub fn dedup_recipients<I>(numbers: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for number in numbers {
        let trimmed = number.trim();
        if trimmed.is_empty() || out.iter().any(|n| n == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

/// An emergency contact owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub phone: String,
    pub relation: String,
}

/// Request body for creating a contact.
///
/// `userId` is accepted for older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    #[serde(alias = "userId")]
    pub owner_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default = "default_relation")]
    pub relation: String,
}

fn default_relation() -> String {
    DEFAULT_RELATION.to_string()
}

impl NewContact {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            phone: phone.into(),
            relation: default_relation(),
        }
    }
}

/// Query parameters for listing contacts.
#[derive(Debug, Default, Deserialize)]
pub struct ContactsQuery {
    /// Owner whose contacts are listed. Absent means "nobody".
    #[serde(alias = "userId")]
    pub owner: Option<String>,
}

/// Evidence attached to an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64 encoded artifact bytes.
    pub data: String,
    pub mime_type: String,
}

/// An alert as submitted to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub category: EmergencyCategory,
    pub message: String,
    pub recipients: Vec<String>,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaPayload>,
}

/// Request body for POST /alerts.
///
/// The server fills in `message` when the client left it out.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertRequest {
    pub category: EmergencyCategory,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "contacts")]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media: Option<MediaPayload>,
}

/// Request body of the legacy `POST /api/sos` route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySosRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub media_data: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

impl LegacySosRequest {
    /// Convert into the current request shape. `None` for an unknown type.
    pub fn into_alert_request(self) -> Option<AlertRequest> {
        let category = EmergencyCategory::parse(&self.kind)?;
        let media = match (self.media_data, self.media_type) {
            (Some(data), Some(mime_type)) => Some(MediaPayload { data, mime_type }),
            (Some(data), None) => Some(MediaPayload {
                data,
                mime_type: "application/octet-stream".to_string(),
            }),
            _ => None,
        };
        Some(AlertRequest {
            category,
            message: None,
            recipients: self.contacts,
            location: self.location,
            created_at: None,
            media,
        })
    }
}

/// Message the server composes when the client did not send one.
pub fn server_alert_message(category: EmergencyCategory, location: GeoPoint) -> String {
    let where_ = map_link(location).unwrap_or_else(|| UNKNOWN_LOCATION_PHRASE.to_string());
    format!("SOS ALERT! {} I need help. Location: {}", category.title(), where_)
}

/// Alert as returned by GET /alerts. Media bodies are left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: i64,
    pub category: EmergencyCategory,
    pub message: String,
    pub recipients: Vec<String>,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub media_type: Option<String>,
}

/// Acknowledgement for a stored alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAck {
    pub success: bool,
    pub id: i64,
    pub msg: String,
}

/// Query parameters for GET /alerts.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Maximum number of alerts (default: 20).
    #[serde(default = "default_alert_limit")]
    pub limit: u32,
}

fn default_alert_limit() -> u32 {
    20
}
