//! Direct and society-wide chat messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery receipts only ever move forward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub society_id: String,
    pub sender_id: String,
    pub sender_name: String,
    /// `None` posts to the whole society group
    #[serde(default)]
    pub recipient_id: Option<String>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub const DELETED_PLACEHOLDER: &'static str = "This message was deleted";

    pub fn is_group(&self) -> bool {
        self.recipient_id.is_none()
    }

    /// Hide the content but keep the record. Idempotent.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        if self.deleted {
            return;
        }
        self.deleted = true;
        self.deleted_at = Some(at);
        self.content = Self::DELETED_PLACEHOLDER.to_string();
    }

    /// Advance the receipt; returns false when nothing changed
    pub fn advance(&mut self, to: MessageStatus) -> bool {
        if to > self.status {
            self.status = to;
            true
        } else {
            false
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.recipient_id.as_deref() == Some(user_id)
    }
}
