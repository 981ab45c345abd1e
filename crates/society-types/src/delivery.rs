//! Parcels and food received at the gate on a resident's behalf

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::Location;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Package,
    Food,
    Document,
    Other,
}

/// `Delivered` means "at the gate"; every other state is terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[default]
    Delivered,
    Collected,
    Returned,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub society_id: String,
    pub recipient_id: String,
    pub location: Location,
    pub courier: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub status: DeliveryStatus,
    /// Security guard who accepted the item
    pub received_by: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn transition(&mut self, to: DeliveryStatus, at: DateTime<Utc>) -> Result<(), DomainError> {
        match (self.status, to) {
            (DeliveryStatus::Delivered, DeliveryStatus::Collected)
            | (DeliveryStatus::Delivered, DeliveryStatus::Returned)
            | (DeliveryStatus::Delivered, DeliveryStatus::Lost) => {
                self.status = to;
                self.closed_at = Some(at);
                Ok(())
            }
            (from, to) => Err(DomainError::transition(from, to)),
        }
    }
}
