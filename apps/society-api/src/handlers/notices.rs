//! Notice board and polls

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use society_auth::Role;
use society_types::{new_id, Notice, Poll, PollOption, Resident, VerificationStatus};
use tracing::info;

use super::ListResponse;
use crate::auth::AuthUser;
use crate::error::{require_field, ApiError};
use crate::extract::{Json, Path};
use crate::state::AppState;
use crate::store::Filter;

#[derive(Debug, Deserialize)]
pub struct CreateNoticeRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Handler: POST /api/notices
pub async fn create_notice(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateNoticeRequest>,
) -> Result<(StatusCode, Json<Notice>), ApiError> {
    user.require_admin()?;
    require_field(&req.title, "title")?;
    require_field(&req.body, "body")?;

    let now = Utc::now();
    if req.expires_at.is_some_and(|exp| exp <= now) {
        return Err(ApiError::InvalidRequest(
            "expires_at must be in the future".to_string(),
        ));
    }

    let mut notice = Notice {
        id: new_id(),
        society_id: user.society_id().to_string(),
        title: req.title,
        body: req.body,
        category: req
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "General".to_string()),
        author_id: user.id().to_string(),
        pinned: req.pinned,
        created_at: now,
        expires_at: req.expires_at,
    };
    state.store.insert(&mut notice).await?;
    info!("Posted notice {} to society {}", notice.id, notice.society_id);

    let residents: Vec<Resident> = state
        .store
        .find(
            &Filter::new()
                .society(&notice.society_id)
                .eq("verification", VerificationStatus::Approved.as_str()),
        )
        .await?;
    let tokens: Vec<String> = residents
        .into_iter()
        .filter_map(|r| r.push_token)
        .collect();
    for token in &tokens {
        state.push(token, &notice.title, &notice.body).await;
    }
    if !tokens.is_empty() {
        info!("Pushed notice {} to {} devices", notice.id, tokens.len());
    }

    Ok((StatusCode::CREATED, Json(notice)))
}

/// Handler: GET /api/notices
///
/// Live notices only, pinned first, then newest.
pub async fn list_notices(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ListResponse<Notice>>, ApiError> {
    let now = Utc::now();
    let mut notices: Vec<Notice> = state
        .store
        .find(&Filter::new().society(user.society_id()))
        .await?;

    notices.retain(|n| n.is_live(now));
    // stable, so newest-first holds within each group
    notices.sort_by_key(|n| !n.pinned);

    Ok(Json(notices.into()))
}

/// Handler: DELETE /api/notices/:id
pub async fn delete_notice(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    user.require_admin()?;
    let notice: Notice = state.store.require(&id).await?;
    user.same_society(&notice.society_id)?;

    state.store.delete::<Notice>(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub closes_at: Option<DateTime<Utc>>,
}

/// Handler: POST /api/polls
pub async fn create_poll(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<Poll>), ApiError> {
    user.require_admin()?;
    require_field(&req.question, "question")?;
    Poll::validate_options(&req.options)?;

    let now = Utc::now();
    if req.closes_at.is_some_and(|closes| closes <= now) {
        return Err(ApiError::InvalidRequest(
            "closes_at must be in the future".to_string(),
        ));
    }

    let mut poll = Poll {
        id: new_id(),
        society_id: user.society_id().to_string(),
        question: req.question,
        options: req
            .options
            .into_iter()
            .map(|label| PollOption {
                label: label.trim().to_string(),
                votes: 0,
            })
            .collect(),
        voters: Vec::new(),
        created_by: user.id().to_string(),
        created_at: now,
        closes_at: req.closes_at,
    };
    state.store.insert(&mut poll).await?;

    info!("Opened poll {} with {} options", poll.id, poll.options.len());
    Ok((StatusCode::CREATED, Json(poll)))
}

/// Handler: GET /api/polls
pub async fn list_polls(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ListResponse<Poll>>, ApiError> {
    let polls: Vec<Poll> = state
        .store
        .find(&Filter::new().society(user.society_id()))
        .await?;
    Ok(Json(polls.into()))
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option: usize,
}

/// Handler: POST /api/polls/:id/vote
pub async fn vote(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<Poll>, ApiError> {
    user.require(&[Role::Resident, Role::Tenant])?;

    let _guard = state.writes.lock().await;
    let mut poll: Poll = state.store.require(&id).await?;
    user.same_society(&poll.society_id)?;

    poll.vote(user.id(), req.option, Utc::now())?;
    state.store.save(&mut poll).await?;

    Ok(Json(poll))
}
