//! Bearer token generation and validation
//!
//! Tokens are compact JWTs signed with HS256. The claims carry the account's
//! role and society so every request can be attributed without a lookup.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime in seconds (7 days)
pub const DEFAULT_TOKEN_TTL: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

impl Default for JwtHeader {
    fn default() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Who is calling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Society admin account
    Society,
    Resident,
    Tenant,
    Security,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Society => "society",
            Role::Resident => "resident",
            Role::Tenant => "tenant",
            Role::Security => "security",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Profile id (society id for admins)
    pub sub: String,
    pub role: Role,
    pub society_id: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration (Unix timestamp)
    pub exp: u64,
}

fn sign(input: &str, secret: &str) -> Result<HmacSha256, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| AuthError::Key(e.to_string()))?;
    mac.update(input.as_bytes());
    Ok(mac)
}

fn encode_jwt<T: Serialize>(claims: &T, secret: &str) -> Result<String, AuthError> {
    let header_json =
        serde_json::to_vec(&JwtHeader::default()).map_err(|e| AuthError::Key(e.to_string()))?;
    let payload_json = serde_json::to_vec(claims).map_err(|e| AuthError::Key(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload_json)
    );
    let signature = sign(&signing_input, secret)?.finalize().into_bytes();

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

fn decode_jwt<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedToken);
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::MalformedToken)?;
    sign(&format!("{}.{}", header_b64, payload_b64), secret)?
        .verify_slice(&signature)
        .map_err(|_| AuthError::BadSignature)?;

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| AuthError::MalformedToken)?;
    let header: JwtHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::MalformedToken)?;
    if header.alg != "HS256" {
        return Err(AuthError::UnsupportedAlgorithm(header.alg));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::MalformedToken)
}

/// Issue a token for `sub` valid for `ttl_secs`
pub fn issue_token(
    sub: &str,
    role: Role,
    society_id: &str,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, AuthError> {
    let now = chrono::Utc::now().timestamp() as u64;

    let claims = Claims {
        sub: sub.to_string(),
        role,
        society_id: society_id.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };

    encode_jwt(&claims, secret)
}

/// Check signature and expiry, returning the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let claims: Claims = decode_jwt(token, secret)?;

    let now = chrono::Utc::now().timestamp() as u64;
    if claims.exp < now {
        return Err(AuthError::Expired);
    }

    Ok(claims)
}

/// Extract the token from an `Authorization: Bearer xxx` header value
pub fn extract_bearer_token(auth_header: Option<&str>) -> Option<&str> {
    auth_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
