//! Society chat: direct messages, the group feed, receipts, and live events

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use society_auth::{validate_token, Role};
use society_types::{
    new_id, ChatMessage, MessageStatus, Resident, SecurityGuard, Society, Tenant,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::ListResponse;
use crate::auth::{Account, AuthUser};
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::realtime::{ChatEvent, PresenceGuard};
use crate::state::AppState;
use crate::store::Filter;

pub const MAX_MESSAGE_CHARS: usize = 2000;
const DEFAULT_PAGE: i64 = 100;

async fn display_name(state: &AppState, user: &AuthUser) -> Result<String, ApiError> {
    let id = user.id();
    let name = match user.role() {
        Role::Society => state.store.require::<Society>(id).await?.admin_name,
        Role::Resident => state.store.require::<Resident>(id).await?.name,
        Role::Tenant => state.store.require::<Tenant>(id).await?.name,
        Role::Security => state.store.require::<SecurityGuard>(id).await?.name,
    };
    Ok(name)
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Omit to post to the society group
    #[serde(default)]
    pub recipient_id: Option<String>,
    pub content: String,
}

/// Handler: POST /api/chat/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::InvalidRequest("content is required".to_string()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::InvalidRequest(format!(
            "message exceeds {} characters",
            MAX_MESSAGE_CHARS
        )));
    }

    if let Some(recipient) = req.recipient_id.as_deref() {
        if recipient == user.id() {
            return Err(ApiError::InvalidRequest(
                "cannot message yourself".to_string(),
            ));
        }
        let known = state
            .store
            .exists::<Account>(
                &Filter::new()
                    .society(user.society_id())
                    .eq("profile_id", recipient),
            )
            .await?;
        if !known {
            return Err(ApiError::NotFound(format!("recipient {}", recipient)));
        }
    }

    let mut message = ChatMessage {
        id: new_id(),
        society_id: user.society_id().to_string(),
        sender_id: user.id().to_string(),
        sender_name: display_name(&state, &user).await?,
        recipient_id: req.recipient_id,
        content: content.to_string(),
        sent_at: Utc::now(),
        status: MessageStatus::Sent,
        deleted: false,
        deleted_at: None,
    };
    if let Some(recipient) = message.recipient_id.as_deref() {
        if state.chat.is_online(&message.society_id, recipient) {
            message.advance(MessageStatus::Delivered);
        }
    }

    state.store.insert(&mut message).await?;
    state.chat.publish(ChatEvent::Message {
        message: message.clone(),
    });

    debug!(
        "{} sent message {} ({})",
        message.sender_id,
        message.id,
        if message.is_group() { "group" } else { "direct" }
    );
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Other party of a direct conversation; absent means the group feed
    pub with: Option<String>,
    pub limit: Option<i64>,
}

/// Handler: GET /api/chat/messages
///
/// Oldest first, capped at the most recent `limit` messages.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<MessageQuery>,
) -> Result<Json<ListResponse<ChatMessage>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, 500);
    let base = Filter::new().society(user.society_id()).limit(limit);

    let mut messages: Vec<ChatMessage> = match query.with.as_deref() {
        Some(other) => {
            let mut sent: Vec<ChatMessage> = state
                .store
                .find(&base.clone().eq("sender_id", user.id()).eq("recipient_id", other))
                .await?;
            let received: Vec<ChatMessage> = state
                .store
                .find(&base.eq("sender_id", other).eq("recipient_id", user.id()))
                .await?;
            sent.extend(received);
            sent
        }
        None => state.store.find(&base.is_null("recipient_id")).await?,
    };

    messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
    messages.truncate(limit as usize);
    messages.reverse();

    Ok(Json(messages.into()))
}

async fn load_message(
    state: &AppState,
    user: &AuthUser,
    id: &str,
) -> Result<ChatMessage, ApiError> {
    let message: ChatMessage = state.store.require(id).await?;
    if message.society_id != user.society_id() {
        return Err(ApiError::NotFound(format!("message {}", id)));
    }
    Ok(message)
}

/// Handler: PATCH /api/chat/messages/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ChatMessage>, ApiError> {
    let mut message = load_message(&state, &user, &id).await?;
    if message.recipient_id.as_deref() != Some(user.id()) {
        return Err(ApiError::Forbidden(
            "Only the recipient can mark a message read".to_string(),
        ));
    }

    if message.advance(MessageStatus::Read) {
        state.store.save(&mut message).await?;
        state.chat.publish(ChatEvent::Read {
            society_id: message.society_id.clone(),
            message_id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            reader_id: user.id().to_string(),
        });
    }

    Ok(Json(message))
}

/// Handler: DELETE /api/chat/messages/:id
///
/// The record stays; only its content is replaced.
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ChatMessage>, ApiError> {
    let mut message = load_message(&state, &user, &id).await?;
    if message.sender_id != user.id() {
        return Err(ApiError::Forbidden(
            "Only the sender can delete a message".to_string(),
        ));
    }

    if !message.deleted {
        message.soft_delete(Utc::now());
        state.store.save(&mut message).await?;
        state.chat.publish(ChatEvent::Deleted {
            society_id: message.society_id.clone(),
            message_id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
        });
        info!("Message {} deleted by sender", message.id);
    }

    Ok(Json(message))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// For clients that cannot set headers on an EventSource
    pub token: Option<String>,
}

struct Subscription {
    rx: broadcast::Receiver<ChatEvent>,
    society_id: String,
    user_id: String,
    _presence: PresenceGuard,
}

fn to_sse(event: &ChatEvent) -> Option<Event> {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!("Failed to encode chat event: {}", e);
            None
        }
    }
}

/// Handler: GET /api/chat/stream
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let claims = match (user, query.token) {
        (Some(AuthUser(claims)), _) => claims,
        (None, Some(token)) => validate_token(&token, &state.config.jwt_secret)?,
        (None, None) => {
            return Err(ApiError::Unauthorized("Missing bearer token".to_string()))
        }
    };

    // subscribe before announcing presence so our own view is consistent
    let rx = state.chat.subscribe();
    let presence = state.chat.connect(&claims.society_id, &claims.sub);
    info!("{} joined chat stream for {}", claims.sub, claims.society_id);

    let subscription = Subscription {
        rx,
        society_id: claims.society_id,
        user_id: claims.sub,
        _presence: presence,
    };

    let stream = stream::unfold(subscription, |mut sub| async move {
        loop {
            match sub.rx.recv().await {
                Ok(event) => {
                    if !event.visible_to(&sub.society_id, &sub.user_id) {
                        continue;
                    }
                    if let Some(sse) = to_sse(&event) {
                        return Some((Ok(sse), sub));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Chat stream for {} skipped {} events", sub.user_id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub online: Vec<String>,
}

/// Handler: GET /api/chat/presence
pub async fn presence(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Json<PresenceResponse> {
    Json(PresenceResponse {
        online: state.chat.online(user.society_id()),
    })
}
