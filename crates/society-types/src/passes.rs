//! Short-lived authorizations verified at the gate by PIN

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{Pin, VerificationStatus};
use crate::error::DomainError;

/// Lifecycle of an animal tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassStatus {
    #[default]
    Active,
    Expired,
}

/// Outcome of presenting a PIN at the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCheck {
    Valid,
    NotApproved,
    NotYetValid,
    Expired,
}

impl GateCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, GateCheck::Valid)
    }
}

/// Documents that carry a gate PIN
pub trait PinDocument {
    fn pin(&self) -> &Pin;
    fn set_pin(&mut self, pin: Pin);
    fn gate_check(&self, now: DateTime<Utc>) -> GateCheck;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimalTag {
    pub id: String,
    pub society_id: String,
    pub resident_id: String,
    pub pin: Pin,
    pub pet_name: String,
    pub species: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub status: PassStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AnimalTag {
    /// Flip to `Expired` once the window has passed. Returns true if changed.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == PassStatus::Active && now >= self.expires_at {
            self.status = PassStatus::Expired;
            return true;
        }
        false
    }
}

impl PinDocument for AnimalTag {
    fn pin(&self) -> &Pin {
        &self.pin
    }

    fn set_pin(&mut self, pin: Pin) {
        self.pin = pin;
    }

    fn gate_check(&self, now: DateTime<Utc>) -> GateCheck {
        if self.status == PassStatus::Expired || now >= self.expires_at {
            GateCheck::Expired
        } else if now < self.issued_at {
            GateCheck::NotYetValid
        } else {
            GateCheck::Valid
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatePass {
    pub id: String,
    pub society_id: String,
    pub resident_id: String,
    pub pin: Pin,
    pub visitor_name: String,
    pub visitor_phone: String,
    pub purpose: String,
    #[serde(default = "default_guests")]
    pub guests: u32,
    #[serde(default)]
    pub status: VerificationStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn default_guests() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePass {
    pub id: String,
    pub society_id: String,
    pub resident_id: String,
    pub pin: Pin,
    pub provider_name: String,
    pub service_type: String,
    pub phone: String,
    #[serde(default)]
    pub status: VerificationStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn window_check(
    status: VerificationStatus,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> GateCheck {
    if status != VerificationStatus::Approved {
        GateCheck::NotApproved
    } else if now < from {
        GateCheck::NotYetValid
    } else if now >= until {
        GateCheck::Expired
    } else {
        GateCheck::Valid
    }
}

/// Reject windows that end before they start
pub fn validate_window(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<(), DomainError> {
    if until <= from {
        return Err(DomainError::Validation(
            "validity window must end after it starts".to_string(),
        ));
    }
    Ok(())
}

macro_rules! impl_approval_pass {
    ($ty:ty) => {
        impl PinDocument for $ty {
            fn pin(&self) -> &Pin {
                &self.pin
            }

            fn set_pin(&mut self, pin: Pin) {
                self.pin = pin;
            }

            fn gate_check(&self, now: DateTime<Utc>) -> GateCheck {
                window_check(self.status, self.valid_from, self.valid_until, now)
            }
        }

        impl $ty {
            pub fn decide(&mut self, to: VerificationStatus) -> Result<(), DomainError> {
                self.status = self.status.transition(to)?;
                Ok(())
            }
        }
    };
}

impl_approval_pass!(GatePass);
impl_approval_pass!(ServicePass);
