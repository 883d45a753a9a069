//! Suraksha remote store: contacts and alerts over HTTP.
//!
//! # API Endpoints
//!
//! - `POST /contacts` - Store an emergency contact
//! - `GET /contacts?owner=` - List an owner's contacts
//! - `DELETE /contacts/:id` - Delete a contact
//! - `POST /alerts` - Record an alert and relay it by SMS
//! - `GET /alerts?limit=` - Most recent alerts
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use suraksha::api::{self, AppState};
use suraksha::config::ServerConfig;
use suraksha::relay::{DisabledRelay, Fast2SmsRelay, NotificationRelay};
use suraksha::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Phone numbers and message bodies are only ever logged at debug.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("suraksha=info".parse()?))
        .init();

    let config = ServerConfig::from_env();
    info!(port = config.port, db_url = %config.database_url, "Starting Suraksha server");

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let relay: Arc<dyn NotificationRelay> = match (&config.sms_api_key, &config.sms_api_url) {
        (Some(key), Some(url)) => Arc::new(Fast2SmsRelay::with_base_url(url, key.clone())),
        (Some(key), None) => Arc::new(Fast2SmsRelay::new(key.clone())),
        (None, _) => {
            warn!("FAST2SMS_API_KEY not set, SMS relay disabled");
            Arc::new(DisabledRelay)
        }
    };

    let app = api::router(AppState { storage, relay })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Suraksha is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
