//! Animal tags, gate passes, service passes, and PIN verification at the gate

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Duration, Utc};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use society_auth::Role;
use society_types::{
    new_id, passes::validate_window, AnimalTag, GateCheck, GatePass, PassStatus, Pin,
    PinDocument, ServicePass, VerificationStatus,
};
use tracing::info;

use super::ListResponse;
use crate::auth::AuthUser;
use crate::error::{require_field, ApiError};
use crate::extract::{Json, Path, Query};
use crate::pin::insert_with_unique_pin;
use crate::state::AppState;
use crate::store::{Document, Filter};

/// Animal tags stay valid for a year unless given an explicit expiry
pub const DEFAULT_TAG_VALIDITY_DAYS: i64 = 365;

fn placeholder_pin() -> Pin {
    Pin::random(&mut OsRng)
}

/// Occupants see their own passes; admins and guards see the society's
fn scoped_filter(user: &AuthUser) -> Filter {
    let filter = Filter::new().society(user.society_id());
    if user.is_occupant() {
        filter.eq("resident_id", user.id())
    } else {
        filter
    }
}

async fn load_scoped<D: Document>(
    state: &AppState,
    user: &AuthUser,
    id: &str,
) -> Result<D, ApiError> {
    let doc: D = state.store.require(id).await?;
    if doc.society_id() != Some(user.society_id()) {
        return Err(ApiError::NotFound(format!("{} {}", D::COLLECTION, id)));
    }
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Animal tags
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAnimalTagRequest {
    pub pet_name: String,
    pub species: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Handler: POST /api/animal-tags
pub async fn create_animal_tag(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateAnimalTagRequest>,
) -> Result<(StatusCode, Json<AnimalTag>), ApiError> {
    user.require(&[Role::Resident, Role::Tenant])?;
    require_field(&req.pet_name, "pet_name")?;
    require_field(&req.species, "species")?;

    let now = Utc::now();
    let expires_at = req
        .expires_at
        .unwrap_or(now + Duration::days(DEFAULT_TAG_VALIDITY_DAYS));
    validate_window(now, expires_at)?;

    let mut tag = AnimalTag {
        id: new_id(),
        society_id: user.society_id().to_string(),
        resident_id: user.id().to_string(),
        pin: placeholder_pin(),
        pet_name: req.pet_name,
        species: req.species,
        breed: req.breed,
        status: PassStatus::Active,
        issued_at: now,
        expires_at,
    };
    insert_with_unique_pin(&state.store, &mut tag).await?;

    info!("Issued animal tag {} for {}", tag.id, tag.pet_name);
    Ok((StatusCode::CREATED, Json(tag)))
}

/// Handler: GET /api/animal-tags
///
/// Tags past their expiry are flipped to `Expired` as they are read.
pub async fn list_animal_tags(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ListResponse<AnimalTag>>, ApiError> {
    let mut tags: Vec<AnimalTag> = state.store.find(&scoped_filter(&user)).await?;

    let now = Utc::now();
    for tag in tags.iter_mut() {
        if tag.refresh_expiry(now) {
            state.store.save(tag).await?;
        }
    }

    Ok(Json(tags.into()))
}

/// Handler: DELETE /api/animal-tags/:id
pub async fn delete_animal_tag(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let tag: AnimalTag = load_scoped(&state, &user, &id).await?;
    user.admin_or_self(&tag.society_id, &tag.resident_id)?;

    state.store.delete::<AnimalTag>(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Gate and service passes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PassQuery {
    pub status: Option<VerificationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub status: VerificationStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateGatePassRequest {
    pub visitor_name: String,
    pub visitor_phone: String,
    pub purpose: String,
    #[serde(default)]
    pub guests: Option<u32>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Handler: POST /api/gate-passes
pub async fn create_gate_pass(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateGatePassRequest>,
) -> Result<(StatusCode, Json<GatePass>), ApiError> {
    user.require(&[Role::Resident, Role::Tenant])?;
    require_field(&req.visitor_name, "visitor_name")?;
    require_field(&req.purpose, "purpose")?;
    society_types::members::validate_phone(&req.visitor_phone)?;
    validate_window(req.valid_from, req.valid_until)?;

    let mut pass = GatePass {
        id: new_id(),
        society_id: user.society_id().to_string(),
        resident_id: user.id().to_string(),
        pin: placeholder_pin(),
        visitor_name: req.visitor_name,
        visitor_phone: req.visitor_phone,
        purpose: req.purpose,
        guests: req.guests.unwrap_or(1).max(1),
        status: VerificationStatus::Pending,
        valid_from: req.valid_from,
        valid_until: req.valid_until,
        created_at: Utc::now(),
    };
    insert_with_unique_pin(&state.store, &mut pass).await?;

    info!("Created gate pass {} for {}", pass.id, pass.visitor_name);
    Ok((StatusCode::CREATED, Json(pass)))
}

/// Handler: GET /api/gate-passes
pub async fn list_gate_passes(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<PassQuery>,
) -> Result<Json<ListResponse<GatePass>>, ApiError> {
    let filter = scoped_filter(&user).eq_opt("status", query.status.map(|s| s.as_str()));
    let passes: Vec<GatePass> = state.store.find(&filter).await?;
    Ok(Json(passes.into()))
}

/// Handler: PATCH /api/gate-passes/:id/status
///
/// Approval texts the PIN to the visitor.
pub async fn decide_gate_pass(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<GatePass>, ApiError> {
    user.require(&[Role::Society, Role::Security])?;
    let mut pass: GatePass = load_scoped(&state, &user, &id).await?;

    pass.decide(req.status)?;
    state.store.save(&mut pass).await?;
    info!("Gate pass {} marked {}", pass.id, pass.status);

    if pass.status == VerificationStatus::Approved {
        let body = format!(
            "Hi {}, your gate pass is approved. Show PIN {} at the gate between {} and {}.",
            pass.visitor_name,
            pass.pin,
            pass.valid_from.format("%d %b %H:%M"),
            pass.valid_until.format("%d %b %H:%M"),
        );
        state.sms(&pass.visitor_phone, &body).await;
    }

    Ok(Json(pass))
}

#[derive(Debug, Deserialize)]
pub struct CreateServicePassRequest {
    pub provider_name: String,
    pub service_type: String,
    pub phone: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Handler: POST /api/service-passes
pub async fn create_service_pass(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateServicePassRequest>,
) -> Result<(StatusCode, Json<ServicePass>), ApiError> {
    user.require(&[Role::Resident, Role::Tenant])?;
    require_field(&req.provider_name, "provider_name")?;
    require_field(&req.service_type, "service_type")?;
    society_types::members::validate_phone(&req.phone)?;
    validate_window(req.valid_from, req.valid_until)?;

    let mut pass = ServicePass {
        id: new_id(),
        society_id: user.society_id().to_string(),
        resident_id: user.id().to_string(),
        pin: placeholder_pin(),
        provider_name: req.provider_name,
        service_type: req.service_type,
        phone: req.phone,
        status: VerificationStatus::Pending,
        valid_from: req.valid_from,
        valid_until: req.valid_until,
        created_at: Utc::now(),
    };
    insert_with_unique_pin(&state.store, &mut pass).await?;

    info!("Created service pass {} for {}", pass.id, pass.provider_name);
    Ok((StatusCode::CREATED, Json(pass)))
}

/// Handler: GET /api/service-passes
pub async fn list_service_passes(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<PassQuery>,
) -> Result<Json<ListResponse<ServicePass>>, ApiError> {
    let filter = scoped_filter(&user).eq_opt("status", query.status.map(|s| s.as_str()));
    let passes: Vec<ServicePass> = state.store.find(&filter).await?;
    Ok(Json(passes.into()))
}

/// Handler: PATCH /api/service-passes/:id/status
pub async fn decide_service_pass(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ServicePass>, ApiError> {
    user.require(&[Role::Society, Role::Security])?;
    let mut pass: ServicePass = load_scoped(&state, &user, &id).await?;

    pass.decide(req.status)?;
    state.store.save(&mut pass).await?;
    info!("Service pass {} marked {}", pass.id, pass.status);

    if pass.status == VerificationStatus::Approved {
        let body = format!(
            "Hi {}, your {} visit is approved. Show PIN {} at the gate.",
            pass.provider_name, pass.service_type, pass.pin
        );
        state.sms(&pass.phone, &body).await;
    }

    Ok(Json(pass))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct VerifyPinRequest {
    pub pin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    GatePass,
    ServicePass,
    AnimalTag,
}

impl PassKind {
    /// Whether a valid pass of this kind lets a person through the gate
    pub fn admits_entry(&self) -> bool {
        matches!(self, PassKind::GatePass | PassKind::ServicePass)
    }
}

#[derive(Debug, Serialize)]
pub struct PassMatch {
    pub kind: PassKind,
    pub id: String,
    pub resident_id: String,
    /// Visitor, provider, or pet name
    pub holder: String,
    pub check: GateCheck,
    pub valid: bool,
}

impl PassMatch {
    fn new<D: Document + PinDocument>(
        kind: PassKind,
        doc: &D,
        resident_id: &str,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let check = doc.gate_check(now);
        Self {
            kind,
            id: doc.id().to_string(),
            resident_id: resident_id.to_string(),
            holder: holder.to_string(),
            check,
            valid: check.is_valid(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyPinResponse {
    pub pin: String,
    /// A gate or service pass under this PIN admits entry right now.
    /// Animal tags never count here; see their own match.
    pub valid: bool,
    pub matches: Vec<PassMatch>,
}

/// Handler: POST /api/passes/verify
///
/// PINs are unique per collection, so one PIN can match at most one pass of
/// each kind.
pub async fn verify_pin(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<VerifyPinRequest>,
) -> Result<Json<VerifyPinResponse>, ApiError> {
    user.require(&[Role::Society, Role::Security])?;
    let pin = Pin::parse(req.pin.trim())?;
    let filter = Filter::new()
        .society(user.society_id())
        .eq("pin", pin.as_str());
    let now = Utc::now();

    let mut matches = Vec::new();
    if let Some(pass) = state.store.find_one::<GatePass>(&filter).await? {
        matches.push(PassMatch::new(
            PassKind::GatePass,
            &pass,
            &pass.resident_id,
            &pass.visitor_name,
            now,
        ));
    }
    if let Some(pass) = state.store.find_one::<ServicePass>(&filter).await? {
        matches.push(PassMatch::new(
            PassKind::ServicePass,
            &pass,
            &pass.resident_id,
            &pass.provider_name,
            now,
        ));
    }
    if let Some(mut tag) = state.store.find_one::<AnimalTag>(&filter).await? {
        if tag.refresh_expiry(now) {
            state.store.save(&mut tag).await?;
        }
        matches.push(PassMatch::new(
            PassKind::AnimalTag,
            &tag,
            &tag.resident_id,
            &tag.pet_name,
            now,
        ));
    }

    if matches.is_empty() {
        return Err(ApiError::NotFound(format!("pass with PIN {}", pin)));
    }

    let valid = matches.iter().any(|m| m.kind.admits_entry() && m.valid);
    info!(
        "Verified PIN at gate: {} match(es), valid={}",
        matches.len(),
        valid
    );

    Ok(Json(VerifyPinResponse {
        pin: pin.to_string(),
        valid,
        matches,
    }))
}
