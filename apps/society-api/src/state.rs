//! Application state for the Society Hub API

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::integrations::{GatewayNotifier, LocalMediaStore, MediaStore, Notifier};
use crate::realtime::ChatHub;
use crate::store::DocumentStore;

pub struct AppState {
    pub store: DocumentStore,
    pub config: Config,
    pub notifier: Arc<dyn Notifier>,
    pub media: Arc<dyn MediaStore>,
    pub chat: ChatHub,
    /// Serializes read-modify-write of shared counters (attendance days, poll tallies)
    pub writes: Mutex<()>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let store =
            DocumentStore::connect(&config.database_url, config.database_max_connections).await?;

        let notifier = GatewayNotifier::from_config(&config);
        if !notifier.is_configured() {
            info!("No SMS/push gateway configured, notifications will only be logged");
        }

        let media = LocalMediaStore::new(&config.media_dir, &config.media_base_url);
        info!("Storing media under {}", config.media_dir.display());

        Ok(Self::with_parts(
            store,
            config,
            Arc::new(notifier),
            Arc::new(media),
        ))
    }

    pub fn with_parts(
        store: DocumentStore,
        config: Config,
        notifier: Arc<dyn Notifier>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            store,
            config,
            notifier,
            media,
            chat: ChatHub::new(),
            writes: Mutex::new(()),
        }
    }

    /// Send an SMS, logging instead of failing
    pub async fn sms(&self, to: &str, body: &str) {
        if let Err(e) = self.notifier.send_sms(to, body).await {
            tracing::warn!("Failed to send SMS to {}: {}", to, e);
        }
    }

    /// Send a push notification, logging instead of failing
    pub async fn push(&self, device_token: &str, title: &str, body: &str) {
        if let Err(e) = self.notifier.send_push(device_token, title, body).await {
            tracing::warn!("Failed to send push notification: {}", e);
        }
    }
}
