//! Outbound integrations: SMS, push notifications and image hosting
//!
//! Handlers only see the [`Notifier`] and [`MediaStore`] traits. Notification
//! failures are logged by the caller and never fail a request.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected request: {status} {body}")]
    Rejected { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid media id: {0}")]
    InvalidMediaId(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError>;

    async fn send_push(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), IntegrationError>;
}

/// Writes notifications to the log instead of sending them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError> {
        info!(to, body, "SMS (not sent, no gateway configured)");
        Ok(())
    }

    async fn send_push(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), IntegrationError> {
        info!(device_token, title, body, "Push (not sent, no gateway configured)");
        Ok(())
    }
}

struct TwilioCredentials {
    account_sid: String,
    auth_token: String,
    from: String,
}

/// Twilio for SMS, FCM legacy HTTP for push; a missing channel falls back to logging
pub struct GatewayNotifier {
    client: reqwest::Client,
    twilio: Option<TwilioCredentials>,
    fcm_server_key: Option<String>,
}

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";
const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

impl GatewayNotifier {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            twilio: config
                .twilio()
                .map(|(account_sid, auth_token, from)| TwilioCredentials {
                    account_sid,
                    auth_token,
                    from,
                }),
            fcm_server_key: config.fcm_server_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.twilio.is_some() || self.fcm_server_key.is_some()
    }
}

async fn check(response: reqwest::Response) -> Result<(), IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Notifier for GatewayNotifier {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError> {
        let Some(twilio) = &self.twilio else {
            return LogNotifier.send_sms(to, body).await;
        };

        let url = format!("{}/Accounts/{}/Messages.json", TWILIO_API, twilio.account_sid);
        let response = self
            .client
            .post(url)
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&[("To", to), ("From", twilio.from.as_str()), ("Body", body)])
            .send()
            .await?;
        check(response).await?;

        debug!("SMS sent to {}", to);
        Ok(())
    }

    async fn send_push(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), IntegrationError> {
        let Some(key) = &self.fcm_server_key else {
            return LogNotifier.send_push(device_token, title, body).await;
        };

        let response = self
            .client
            .post(FCM_SEND_URL)
            .header(reqwest::header::AUTHORIZATION, format!("key={}", key))
            .json(&json!({
                "to": device_token,
                "notification": { "title": title, "body": body },
            }))
            .send()
            .await?;
        check(response).await?;

        debug!("Push sent to {}", device_token);
        Ok(())
    }
}

/// Where an uploaded file ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Handle for later deletion
    pub public_id: String,
    pub url: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(
        &self,
        folder: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<StoredMedia, IntegrationError>;

    async fn destroy(&self, public_id: &str) -> Result<(), IntegrationError>;
}

/// Media kept on local disk under a root directory
pub struct LocalMediaStore {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, public_id: &str) -> Result<PathBuf, IntegrationError> {
        let relative = Path::new(public_id);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || public_id.is_empty() {
            return Err(IntegrationError::InvalidMediaId(public_id.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(
        &self,
        folder: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<StoredMedia, IntegrationError> {
        let public_id = format!("{}/{}.{}", folder, Uuid::new_v4(), extension);
        let path = self.resolve(&public_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(StoredMedia {
            url: format!("{}/{}", self.base_url, public_id),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), IntegrationError> {
        let path = self.resolve(public_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Image formats accepted for upload, sniffed from magic bytes
pub fn image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}
