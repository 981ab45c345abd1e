//! Realtime chat fan-out and presence
//!
//! One broadcast channel carries every chat event; each SSE subscriber
//! filters it down to what the connected user may see. Presence is a
//! per-society count of open streams per user, released by [`PresenceGuard`]
//! when the stream is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use society_types::ChatMessage;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Message {
        message: ChatMessage,
    },
    Read {
        society_id: String,
        message_id: String,
        sender_id: String,
        reader_id: String,
    },
    Deleted {
        society_id: String,
        message_id: String,
        sender_id: String,
        recipient_id: Option<String>,
    },
    Presence {
        society_id: String,
        user_id: String,
        online: bool,
    },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Message { .. } => "message",
            ChatEvent::Read { .. } => "read",
            ChatEvent::Deleted { .. } => "deleted",
            ChatEvent::Presence { .. } => "presence",
        }
    }

    fn society_id(&self) -> &str {
        match self {
            ChatEvent::Message { message } => &message.society_id,
            ChatEvent::Read { society_id, .. }
            | ChatEvent::Deleted { society_id, .. }
            | ChatEvent::Presence { society_id, .. } => society_id,
        }
    }

    /// Whether `user_id` in `society_id` should receive this event
    pub fn visible_to(&self, society_id: &str, user_id: &str) -> bool {
        if self.society_id() != society_id {
            return false;
        }
        match self {
            ChatEvent::Message { message } => message.is_group() || message.involves(user_id),
            ChatEvent::Read { sender_id, .. } => sender_id == user_id,
            ChatEvent::Deleted {
                recipient_id,
                sender_id,
                ..
            } => match recipient_id {
                None => true,
                Some(recipient) => recipient == user_id || sender_id == user_id,
            },
            ChatEvent::Presence { user_id: who, .. } => who != user_id,
        }
    }
}

type PresenceMap = HashMap<String, HashMap<String, usize>>;

#[derive(Clone)]
pub struct ChatHub {
    tx: broadcast::Sender<ChatEvent>,
    presence: Arc<Mutex<PresenceMap>>,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            presence: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn publish(&self, event: ChatEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    /// Mark the user online until the returned guard is dropped
    pub fn connect(&self, society_id: &str, user_id: &str) -> PresenceGuard {
        let first = {
            let mut presence = self.presence.lock().unwrap_or_else(|e| e.into_inner());
            let count = presence
                .entry(society_id.to_string())
                .or_default()
                .entry(user_id.to_string())
                .or_insert(0);
            *count += 1;
            *count == 1
        };

        if first {
            self.publish(ChatEvent::Presence {
                society_id: society_id.to_string(),
                user_id: user_id.to_string(),
                online: true,
            });
        }

        PresenceGuard {
            hub: self.clone(),
            society_id: society_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    fn disconnect(&self, society_id: &str, user_id: &str) {
        let last = {
            let mut presence = self.presence.lock().unwrap_or_else(|e| e.into_inner());
            let Some(users) = presence.get_mut(society_id) else {
                return;
            };
            let last = match users.get_mut(user_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    users.remove(user_id);
                    true
                }
                None => false,
            };
            if users.is_empty() {
                presence.remove(society_id);
            }
            last
        };

        if last {
            self.publish(ChatEvent::Presence {
                society_id: society_id.to_string(),
                user_id: user_id.to_string(),
                online: false,
            });
        }
    }

    pub fn is_online(&self, society_id: &str, user_id: &str) -> bool {
        let presence = self.presence.lock().unwrap_or_else(|e| e.into_inner());
        presence
            .get(society_id)
            .is_some_and(|users| users.contains_key(user_id))
    }

    pub fn online(&self, society_id: &str) -> Vec<String> {
        let presence = self.presence.lock().unwrap_or_else(|e| e.into_inner());
        let mut users: Vec<String> = presence
            .get(society_id)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }
}

pub struct PresenceGuard {
    hub: ChatHub,
    society_id: String,
    user_id: String,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.hub.disconnect(&self.society_id, &self.user_id);
    }
}
