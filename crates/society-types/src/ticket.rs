//! Maintenance complaints raised by residents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::Location;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceTicket {
    pub id: String,
    pub society_id: String,
    pub raised_by: String,
    #[serde(default)]
    pub location: Option<Location>,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl MaintenanceTicket {
    /// Tickets only move forward; `Open` may skip ahead
    pub fn transition(&mut self, to: TicketStatus, at: DateTime<Utc>) -> Result<(), DomainError> {
        if to <= self.status || self.status == TicketStatus::Closed {
            return Err(DomainError::transition(self.status, to));
        }
        self.status = to;
        self.updated_at = at;
        let first_resolution = to == TicketStatus::Closed && self.resolved_at.is_none();
        if to == TicketStatus::Resolved || first_resolution {
            self.resolved_at = Some(at);
        }
        Ok(())
    }
}
