//! Registration and login

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use society_auth::{
    hash_password, issue_token, validate_password_strength, verify_password, Role,
};
use society_types::{
    members::validate_phone, new_id, Location, Resident, SecurityGuard, Shift, Society, Tenant,
    VerificationStatus,
};
use tracing::info;

use crate::auth::{normalize_login, Account};
use crate::documents::MemberDocument;
use crate::error::{require_field, ApiError};
use crate::extract::Json;
use crate::state::AppState;
use crate::store::{Filter, StoreError};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// Absent until the account is approved
    pub token: Option<String>,
    pub role: Role,
    pub profile_id: String,
    pub society_id: String,
    pub verification: VerificationStatus,
}

async fn hash(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(ApiError::from)
}

fn duplicate_login(err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict(_) => {
            ApiError::Conflict("An account with this login already exists".to_string())
        }
        other => other.into(),
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidRequest(format!("invalid email: {}", email)))
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterSocietyRequest {
    pub name: String,
    pub address: String,
    pub city: String,
    pub admin_name: String,
    pub admin_email: String,
    pub password: String,
    #[serde(default)]
    pub blocks: Vec<String>,
}

/// Handler: POST /api/auth/society/register
pub async fn register_society(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterSocietyRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    require_field(&req.name, "name")?;
    require_field(&req.address, "address")?;
    require_field(&req.city, "city")?;
    require_field(&req.admin_name, "admin_name")?;
    validate_email(&req.admin_email)?;
    validate_password_strength(&req.password)?;

    let now = Utc::now();
    let mut society = Society {
        id: new_id(),
        name: req.name,
        address: req.address,
        city: req.city,
        admin_name: req.admin_name,
        admin_email: req.admin_email.trim().to_string(),
        blocks: req.blocks,
        created_at: now,
    };
    let mut account = Account {
        id: new_id(),
        society_id: society.id.clone(),
        login: normalize_login(&society.admin_email),
        password_hash: hash(req.password).await?,
        role: Role::Society,
        profile_id: society.id.clone(),
        created_at: now,
    };

    state
        .store
        .insert_pair(&mut society, &mut account)
        .await
        .map_err(duplicate_login)?;

    let token = issue_token(
        &society.id,
        Role::Society,
        &society.id,
        &state.config.jwt_secret,
        state.config.token_ttl_secs(),
    )?;

    info!("Registered society {} ({})", society.name, society.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: Some(token),
            role: Role::Society,
            profile_id: society.id.clone(),
            society_id: society.id,
            verification: VerificationStatus::Approved,
        }),
    ))
}

/// Create a pending profile plus its login account
async fn onboard<M: MemberDocument>(
    state: &AppState,
    profile: &mut M,
    society_id: &str,
    login: &str,
    password: String,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_password_strength(&password)?;
    state.store.require::<Society>(society_id).await?;

    let mut account = Account {
        id: new_id(),
        society_id: society_id.to_string(),
        login: normalize_login(login),
        password_hash: hash(password).await?,
        role: M::ROLE,
        profile_id: profile.id().to_string(),
        created_at: Utc::now(),
    };

    state
        .store
        .insert_pair(profile, &mut account)
        .await
        .map_err(duplicate_login)?;

    info!(
        "Onboarded {} {} in society {}, awaiting approval",
        M::LABEL,
        profile.id(),
        society_id
    );

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: None,
            role: M::ROLE,
            profile_id: profile.id().to_string(),
            society_id: society_id.to_string(),
            verification: profile.verification(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RegisterResidentRequest {
    pub society_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub location: Location,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub family_members: u32,
    #[serde(default)]
    pub vehicles: Vec<String>,
}

/// Handler: POST /api/auth/residents/register
pub async fn register_resident(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterResidentRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    require_field(&req.name, "name")?;
    validate_email(&req.email)?;
    validate_phone(&req.phone)?;
    req.location.validate()?;

    let now = Utc::now();
    let mut resident = Resident {
        id: new_id(),
        society_id: req.society_id.clone(),
        name: req.name,
        email: req.email.trim().to_string(),
        phone: req.phone,
        location: req.location,
        is_owner: req.is_owner,
        family_members: req.family_members,
        vehicles: req.vehicles,
        photo_url: None,
        photo_public_id: None,
        push_token: None,
        verification: VerificationStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    let login = resident.email.clone();

    onboard(&state, &mut resident, &req.society_id, &login, req.password).await
}

#[derive(Debug, Deserialize)]
pub struct RegisterTenantRequest {
    pub society_id: String,
    pub owner_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub location: Location,
    pub lease_start: NaiveDate,
    #[serde(default)]
    pub lease_end: Option<NaiveDate>,
}

/// Handler: POST /api/auth/tenants/register
pub async fn register_tenant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterTenantRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    require_field(&req.name, "name")?;
    validate_email(&req.email)?;
    validate_phone(&req.phone)?;
    req.location.validate()?;
    if req.lease_end.is_some_and(|end| end <= req.lease_start) {
        return Err(ApiError::InvalidRequest(
            "lease_end must be after lease_start".to_string(),
        ));
    }

    let owner = state
        .store
        .get::<Resident>(&req.owner_id)
        .await?
        .filter(|owner| owner.society_id == req.society_id)
        .ok_or_else(|| ApiError::NotFound(format!("owner {}", req.owner_id)))?;

    let now = Utc::now();
    let mut tenant = Tenant {
        id: new_id(),
        society_id: req.society_id.clone(),
        owner_id: owner.id,
        name: req.name,
        email: req.email.trim().to_string(),
        phone: req.phone,
        location: req.location,
        lease_start: req.lease_start,
        lease_end: req.lease_end,
        verification: VerificationStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    let login = tenant.email.clone();

    onboard(&state, &mut tenant, &req.society_id, &login, req.password).await
}

#[derive(Debug, Deserialize)]
pub struct RegisterSecurityRequest {
    pub society_id: String,
    pub name: String,
    pub phone: String,
    pub password: String,
    pub shift: Shift,
    #[serde(default)]
    pub gate: Option<String>,
}

/// Handler: POST /api/auth/security/register
///
/// Guards log in with their phone number.
pub async fn register_security(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterSecurityRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    require_field(&req.name, "name")?;
    validate_phone(&req.phone)?;

    let now = Utc::now();
    let mut guard = SecurityGuard {
        id: new_id(),
        society_id: req.society_id.clone(),
        name: req.name,
        phone: req.phone,
        shift: req.shift,
        gate: req.gate,
        verification: VerificationStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    let login = guard.phone.clone();

    onboard(&state, &mut guard, &req.society_id, &login, req.password).await
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

async fn member_status<M: MemberDocument>(
    state: &AppState,
    profile_id: &str,
) -> Result<VerificationStatus, ApiError> {
    let profile = state.store.require::<M>(profile_id).await?;
    Ok(profile.verification())
}

/// Handler: POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let account = state
        .store
        .find_one::<Account>(&Filter::new().eq("login", normalize_login(&req.login)))
        .await?
        .ok_or_else(invalid)?;

    let hash = account.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&req.password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    if !matches {
        return Err(invalid());
    }

    let verification = match account.role {
        Role::Society => VerificationStatus::Approved,
        Role::Resident => member_status::<Resident>(&state, &account.profile_id).await?,
        Role::Tenant => member_status::<Tenant>(&state, &account.profile_id).await?,
        Role::Security => member_status::<SecurityGuard>(&state, &account.profile_id).await?,
    };

    match verification {
        VerificationStatus::Approved => {}
        VerificationStatus::Pending => {
            return Err(ApiError::Forbidden(
                "Account is awaiting approval by the society".to_string(),
            ))
        }
        VerificationStatus::Rejected => {
            return Err(ApiError::Forbidden(
                "Account registration was rejected".to_string(),
            ))
        }
    }

    let token = issue_token(
        &account.profile_id,
        account.role,
        &account.society_id,
        &state.config.jwt_secret,
        state.config.token_ttl_secs(),
    )?;

    info!("{} {} logged in", account.role, account.profile_id);

    Ok(Json(AuthResponse {
        token: Some(token),
        role: account.role,
        profile_id: account.profile_id,
        society_id: account.society_id,
        verification,
    }))
}
