//! SQLite storage layer for contacts and alerts.
//!
//! Every contact row carries its `owner_id`; list queries always filter on
//! it so one user never sees another user's contacts.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::model::{AlertRecord, Contact, EmergencyCategory, GeoPoint, NewContact, StoredAlert};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:suraksha.db"
    ///   or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Each connection to "sqlite::memory:" is its own database, so an
        // in-memory store keeps exactly one connection open for its lifetime.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                relation TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_contacts_owner
            ON contacts(owner_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                message TEXT NOT NULL,
                recipients TEXT NOT NULL,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                media_data TEXT,
                media_type TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a contact and return the stored record.
    pub async fn insert_contact(&self, contact: &NewContact) -> anyhow::Result<Contact> {
        let result = sqlx::query(
            r#"
            INSERT INTO contacts (owner_id, name, phone, relation)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&contact.owner_id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.relation)
        .execute(&self.pool)
        .await?;

        Ok(Contact {
            id: result.last_insert_rowid(),
            owner_id: contact.owner_id.clone(),
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            relation: contact.relation.clone(),
        })
    }

    /// List the contacts of `owner_id`, oldest first.
    pub async fn list_contacts(&self, owner_id: &str) -> anyhow::Result<Vec<Contact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, name, phone, relation
            FROM contacts
            WHERE owner_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Contact {
                id: r.get("id"),
                owner_id: r.get("owner_id"),
                name: r.get("name"),
                phone: r.get("phone"),
                relation: r.get("relation"),
            })
            .collect())
    }

    /// Delete a contact by id. Returns `false` when no row matched.
    pub async fn delete_contact(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store an alert and return its id.
    pub async fn insert_alert(&self, alert: &AlertRecord) -> anyhow::Result<i64> {
        let recipients = serde_json::to_string(&alert.recipients)?;
        let (media_data, media_type) = match &alert.media {
            Some(media) => (Some(media.data.as_str()), Some(media.mime_type.as_str())),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO alerts
                (category, message, recipients, lat, lng, media_data, media_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.category.as_str())
        .bind(&alert.message)
        .bind(recipients)
        .bind(alert.location.lat)
        .bind(alert.location.lng)
        .bind(media_data)
        .bind(media_type)
        .bind(alert.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent alerts first, without their media bodies.
    pub async fn recent_alerts(&self, limit: u32) -> anyhow::Result<Vec<StoredAlert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, category, message, recipients, lat, lng, media_type, created_at
            FROM alerts
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_alert_from_row).collect()
    }
}

fn stored_alert_from_row(row: &SqliteRow) -> anyhow::Result<StoredAlert> {
    let category: String = row.get("category");
    let category = EmergencyCategory::parse(&category)
        .ok_or_else(|| anyhow::anyhow!("unknown alert category {category:?}"))?;
    let recipients: String = row.get("recipients");
    let created_ms: i64 = row.get("created_at");

    Ok(StoredAlert {
        id: row.get("id"),
        category,
        message: row.get("message"),
        recipients: serde_json::from_str(&recipients)?,
        location: GeoPoint {
            lat: row.get("lat"),
            lng: row.get("lng"),
        },
        created_at: millis_to_datetime(created_ms)?,
        media_type: row.get("media_type"),
    })
}

fn millis_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid timestamp {ms}"))
}
