//! Member onboarding review, profiles, and resident photos
//!
//! The list/get/verify/delete handlers are generic over [`MemberDocument`]
//! and mounted once per member kind in the router.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde::Deserialize;
use society_auth::Role;
use society_types::{Resident, VerificationStatus};
use tracing::{info, warn};

use super::ListResponse;
use crate::auth::{Account, AuthUser};
use crate::documents::MemberDocument;
use crate::error::{require_field, ApiError};
use crate::extract::{Json, Path, Query};
use crate::integrations::image_extension;
use crate::state::AppState;
use crate::store::Filter;

/// Decoded photo size cap
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// Request body cap for photo uploads: the base64 form of a full-size photo
/// plus room for a `data:` prefix and the JSON wrapper
pub const MAX_PHOTO_BODY_BYTES: usize = MAX_PHOTO_BYTES.div_ceil(3) * 4 + 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct MemberQuery {
    pub status: Option<VerificationStatus>,
}

/// Handler: GET /api/{residents|tenants|security}
pub async fn list_members<M: MemberDocument>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<MemberQuery>,
) -> Result<Json<ListResponse<M>>, ApiError> {
    user.require(&[Role::Society, Role::Security])?;

    let filter = Filter::new()
        .society(user.society_id())
        .eq_opt("verification", query.status.map(|s| s.as_str()));
    let members: Vec<M> = state.store.find(&filter).await?;

    Ok(Json(members.into()))
}

async fn load_member<M: MemberDocument>(
    state: &AppState,
    user: &AuthUser,
    id: &str,
) -> Result<M, ApiError> {
    let member: M = state.store.require(id).await?;
    // other societies' members look missing
    if member.society_id() != Some(user.society_id()) {
        return Err(ApiError::NotFound(format!("{} {}", M::LABEL, id)));
    }
    Ok(member)
}

/// Handler: GET /api/{kind}/:id
pub async fn get_member<M: MemberDocument>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<M>, ApiError> {
    let member: M = load_member(&state, &user, &id).await?;
    if user.role() != Role::Security {
        user.admin_or_self(user.society_id(), member.id())?;
    }
    Ok(Json(member))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub status: VerificationStatus,
}

/// Handler: PATCH /api/{kind}/:id/verify
pub async fn verify_member<M: MemberDocument>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<M>, ApiError> {
    user.require_admin()?;
    let mut member: M = load_member(&state, &user, &id).await?;

    member.verify(req.status, Utc::now())?;
    state.store.save(&mut member).await?;

    info!("{} {} marked {}", M::LABEL, id, req.status);

    let body = match req.status {
        VerificationStatus::Approved => format!(
            "Hi {}, your society account has been approved. You can now log in.",
            member.name()
        ),
        _ => format!(
            "Hi {}, your society registration was not approved. Contact the society office for details.",
            member.name()
        ),
    };
    state.sms(member.phone(), &body).await;

    Ok(Json(member))
}

/// Handler: DELETE /api/{kind}/:id
pub async fn delete_member<M: MemberDocument>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    user.require_admin()?;
    let _: M = load_member(&state, &user, &id).await?;

    state.store.delete::<M>(&id).await?;
    let accounts: Vec<Account> = state
        .store
        .find(&Filter::new().society(user.society_id()).eq("profile_id", &id))
        .await?;
    for account in accounts {
        state.store.delete::<Account>(&account.id).await?;
    }

    info!("Deleted {} {}", M::LABEL, id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PhotoRequest {
    /// Base64 image, optionally as a `data:` URL
    pub image: String,
}

fn decode_image(image: &str) -> Result<Vec<u8>, ApiError> {
    let encoded = match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid base64 image: {}", e)))?;

    if bytes.is_empty() {
        return Err(ApiError::InvalidRequest("image is empty".to_string()));
    }
    if bytes.len() > MAX_PHOTO_BYTES {
        return Err(ApiError::InvalidRequest(format!(
            "image exceeds {} bytes",
            MAX_PHOTO_BYTES
        )));
    }
    Ok(bytes)
}

/// Handler: PUT /api/residents/:id/photo
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<PhotoRequest>,
) -> Result<Json<Resident>, ApiError> {
    let mut resident: Resident = load_member(&state, &user, &id).await?;
    user.admin_or_self(&resident.society_id, &resident.id)?;

    let bytes = decode_image(&req.image)?;
    let extension = image_extension(&bytes).ok_or_else(|| {
        ApiError::InvalidRequest("image must be PNG, JPEG or WebP".to_string())
    })?;

    let folder = format!("societies/{}/residents", resident.society_id);
    let stored = state.media.upload(&folder, &bytes, extension).await?;

    let previous = resident.photo_public_id.take();
    resident.photo_url = Some(stored.url.clone());
    resident.photo_public_id = Some(stored.public_id.clone());
    resident.updated_at = Utc::now();

    if let Err(e) = state.store.save(&mut resident).await {
        // the new upload is orphaned without the document
        if let Err(cleanup) = state.media.destroy(&stored.public_id).await {
            warn!("Failed to remove orphaned upload {}: {}", stored.public_id, cleanup);
        }
        return Err(e.into());
    }

    if let Some(old) = previous {
        if let Err(e) = state.media.destroy(&old).await {
            warn!("Failed to remove previous photo {}: {}", old, e);
        }
    }

    info!("Updated photo for resident {}", resident.id);
    Ok(Json(resident))
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub push_token: String,
}

/// Handler: PUT /api/residents/:id/push-token
pub async fn set_push_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<PushTokenRequest>,
) -> Result<StatusCode, ApiError> {
    require_field(&req.push_token, "push_token")?;
    let mut resident: Resident = load_member(&state, &user, &id).await?;
    if resident.id != user.id() {
        return Err(ApiError::Forbidden(
            "Only the resident can register their device".to_string(),
        ));
    }

    resident.push_token = Some(req.push_token);
    resident.updated_at = Utc::now();
    state.store.save(&mut resident).await?;

    Ok(StatusCode::NO_CONTENT)
}
