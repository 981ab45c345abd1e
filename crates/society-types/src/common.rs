//! Building blocks shared by several documents

use std::fmt;

use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Number of digits in a gate PIN
pub const PIN_LENGTH: usize = 6;

/// Generate a fresh document id
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Where a person or parcel lives inside the society
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub block: String,
    #[serde(default)]
    pub floor: Option<String>,
    pub flat: String,
}

impl Location {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.block.trim().is_empty() || self.flat.trim().is_empty() {
            return Err(DomainError::Validation(
                "block and flat are required".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.floor {
            Some(floor) => write!(f, "{}-{}/{}", self.block, floor, self.flat),
            None => write!(f, "{}-{}", self.block, self.flat),
        }
    }
}

/// Gate on a member's (or pass's) use of the system.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    /// Move to `to`, allowed only out of `Pending`
    pub fn transition(self, to: VerificationStatus) -> Result<VerificationStatus, DomainError> {
        match (self, to) {
            (VerificationStatus::Pending, VerificationStatus::Approved)
            | (VerificationStatus::Pending, VerificationStatus::Rejected) => Ok(to),
            (from, to) => Err(DomainError::transition(from, to)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "Pending",
            VerificationStatus::Approved => "Approved",
            VerificationStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Six-digit code shown at the gate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pin(String);

impl Pin {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.len() == PIN_LENGTH && value.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Pin(value.to_string()))
        } else {
            Err(DomainError::InvalidPin(value.to_string()))
        }
    }

    /// Draw a uniformly formatted PIN (leading zeros kept)
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        Pin(format!("{:06}", rng.next_u32() % 1_000_000))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Pin {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pin::parse(&value)
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> Self {
        pin.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
