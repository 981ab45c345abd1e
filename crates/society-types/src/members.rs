//! Societies and the people onboarded into them

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{Location, VerificationStatus};
use crate::error::DomainError;

/// A registered housing society; its admin account manages everything below
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Society {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub admin_name: String,
    pub admin_email: String,
    #[serde(default)]
    pub blocks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resident {
    pub id: String,
    pub society_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: Location,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub family_members: u32,
    #[serde(default)]
    pub vehicles: Vec<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub photo_public_id: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default)]
    pub verification: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub society_id: String,
    /// Resident who owns the flat being rented
    pub owner_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: Location,
    pub lease_start: NaiveDate,
    #[serde(default)]
    pub lease_end: Option<NaiveDate>,
    #[serde(default)]
    pub verification: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shift {
    Day,
    Night,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGuard {
    pub id: String,
    pub society_id: String,
    pub name: String,
    pub phone: String,
    pub shift: Shift,
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub verification: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Anyone who self-onboards and waits for the society admin's decision
pub trait Member {
    fn name(&self) -> &str;
    fn phone(&self) -> &str;
    fn verification(&self) -> VerificationStatus;
    fn set_verification(&mut self, status: VerificationStatus, at: DateTime<Utc>);

    /// Apply an admin decision, enforcing the one-way gate
    fn verify(&mut self, to: VerificationStatus, at: DateTime<Utc>) -> Result<(), DomainError> {
        let next = self.verification().transition(to)?;
        self.set_verification(next, at);
        Ok(())
    }

    fn is_approved(&self) -> bool {
        self.verification() == VerificationStatus::Approved
    }
}

macro_rules! impl_member {
    ($ty:ty) => {
        impl Member for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn phone(&self) -> &str {
                &self.phone
            }

            fn verification(&self) -> VerificationStatus {
                self.verification
            }

            fn set_verification(&mut self, status: VerificationStatus, at: DateTime<Utc>) {
                self.verification = status;
                self.updated_at = at;
            }
        }
    };
}

impl_member!(Resident);
impl_member!(Tenant);
impl_member!(SecurityGuard);

/// Basic phone sanity: digits with an optional leading `+`, 10 to 15 digits
pub fn validate_phone(phone: &str) -> Result<(), DomainError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DomainError::Validation(format!("invalid phone number: {}", phone)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::new_id;

    fn resident() -> Resident {
        let now = Utc::now();
        Resident {
            id: new_id(),
            society_id: "soc-1".into(),
            name: "Asha Rao".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
            location: Location {
                block: "B".into(),
                floor: None,
                flat: "204".into(),
            },
            is_owner: true,
            family_members: 3,
            vehicles: vec![],
            photo_url: None,
            photo_public_id: None,
            push_token: None,
            verification: VerificationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_verify_updates_status_and_timestamp() {
        let mut r = resident();
        let at = r.updated_at + chrono::Duration::minutes(5);
        r.verify(VerificationStatus::Approved, at).unwrap();
        assert!(r.is_approved());
        assert_eq!(r.updated_at, at);
    }

    #[test]
    fn test_verify_twice_fails() {
        let mut r = resident();
        r.verify(VerificationStatus::Rejected, Utc::now()).unwrap();
        let err = r.verify(VerificationStatus::Approved, Utc::now());
        assert!(matches!(err, Err(DomainError::InvalidTransition { .. })));
        assert_eq!(r.verification, VerificationStatus::Rejected);
    }

    #[test]
    fn test_missing_verification_defaults_to_pending() {
        let json = serde_json::json!({
            "id": "g1",
            "society_id": "soc-1",
            "name": "Ravi",
            "phone": "9123456780",
            "shift": "Night",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        });
        let guard: SecurityGuard = serde_json::from_value(json).unwrap();
        assert_eq!(guard.verification, VerificationStatus::Pending);
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("+919876543210").is_ok());
        assert!(validate_phone("98765").is_err());
        assert!(validate_phone("98765abcde").is_err());
    }
}
