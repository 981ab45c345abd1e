//! Login accounts and the bearer-token extractor

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use society_auth::{extract_bearer_token, validate_token, Claims, Role};

use crate::error::ApiError;
use crate::state::AppState;

/// Credentials for one profile. Never returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub society_id: String,
    /// Lowercased email, or phone for security guards
    pub login: String,
    pub password_hash: String,
    pub role: Role,
    /// Resident/tenant/guard id, or the society id for admins
    pub profile_id: String,
    pub created_at: DateTime<Utc>,
}

pub fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

/// Decoded bearer token of the caller
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = extract_bearer_token(header)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let claims = validate_token(token, &state.config.jwt_secret)?;
        Ok(AuthUser(claims))
    }
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    pub fn society_id(&self) -> &str {
        &self.0.society_id
    }

    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Society
    }

    /// Residents and tenants both live in flats
    pub fn is_occupant(&self) -> bool {
        matches!(self.0.role, Role::Resident | Role::Tenant)
    }

    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.0.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "{} accounts cannot perform this action",
                self.0.role
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require(&[Role::Society])
    }

    /// Reject access to another society's documents
    pub fn same_society(&self, society_id: &str) -> Result<(), ApiError> {
        if self.0.society_id == society_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Document belongs to another society".to_string(),
            ))
        }
    }

    /// Admin of the society, or the owner of the record
    pub fn admin_or_self(&self, society_id: &str, owner_id: &str) -> Result<(), ApiError> {
        self.same_society(society_id)?;
        if self.is_admin() || self.0.sub == owner_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Not allowed".to_string()))
        }
    }
}
