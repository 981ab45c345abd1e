//! Daily visitor register kept by the gate
//!
//! Each society has one [`DailyAttendance`] document per calendar day. Guards
//! append [`VisitorEntry`] records as people arrive and mark them out as they
//! leave. The [`AttendanceSummary`] is a denormalized count by status and is
//! rebuilt from the entry list whenever the document is saved.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{new_id, Location};
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitorType {
    Guest,
    Delivery,
    Service,
    Cab,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitorStatus {
    #[default]
    Inside,
    Exited,
    Overstayed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorEntry {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub purpose: String,
    pub visitor_type: VisitorType,
    pub location: Location,
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub expected_exit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: VisitorStatus,
    /// Security guard who logged the entry
    pub recorded_by: String,
    #[serde(default)]
    pub gate_pass_id: Option<String>,
}

impl VisitorEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        phone: String,
        purpose: String,
        visitor_type: VisitorType,
        location: Location,
        entry_time: DateTime<Utc>,
        expected_exit: Option<DateTime<Utc>>,
        recorded_by: String,
    ) -> Self {
        Self {
            id: new_id(),
            name,
            phone,
            purpose,
            visitor_type,
            location,
            entry_time,
            expected_exit,
            exit_time: None,
            status: VisitorStatus::Inside,
            recorded_by,
            gate_pass_id: None,
        }
    }

    /// Still inside past the expected exit time
    pub fn is_overstaying(&self, now: DateTime<Utc>) -> bool {
        self.status == VisitorStatus::Inside
            && self.expected_exit.is_some_and(|expected| now > expected)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub total: u32,
    pub inside: u32,
    pub exited: u32,
    pub overstayed: u32,
}

impl AttendanceSummary {
    pub fn from_entries(entries: &[VisitorEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut acc, entry| {
            acc.total += 1;
            match entry.status {
                VisitorStatus::Inside => acc.inside += 1,
                VisitorStatus::Exited => acc.exited += 1,
                VisitorStatus::Overstayed => acc.overstayed += 1,
            }
            acc
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAttendance {
    pub id: String,
    pub society_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub visitors: Vec<VisitorEntry>,
    #[serde(default)]
    pub summary: AttendanceSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyAttendance {
    pub fn new(society_id: &str, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            society_id: society_id.to_string(),
            date,
            visitors: Vec::new(),
            summary: AttendanceSummary::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn recompute_summary(&mut self) {
        self.summary = AttendanceSummary::from_entries(&self.visitors);
    }

    pub fn check_in(&mut self, entry: VisitorEntry) -> &VisitorEntry {
        self.updated_at = entry.entry_time.max(self.updated_at);
        self.visitors.push(entry);
        self.recompute_summary();
        // just pushed
        &self.visitors[self.visitors.len() - 1]
    }

    pub fn entry(&self, entry_id: &str) -> Option<&VisitorEntry> {
        self.visitors.iter().find(|v| v.id == entry_id)
    }

    /// Record the visitor leaving at `at`.
    ///
    /// Leaving after `expected_exit` marks the entry `Overstayed`.
    pub fn mark_exit(
        &mut self,
        entry_id: &str,
        at: DateTime<Utc>,
    ) -> Result<&VisitorEntry, DomainError> {
        let idx = self
            .visitors
            .iter()
            .position(|v| v.id == entry_id)
            .ok_or_else(|| DomainError::VisitorNotFound(entry_id.to_string()))?;

        let entry = &mut self.visitors[idx];
        if entry.exit_time.is_some() {
            return Err(DomainError::AlreadyExited(entry_id.to_string()));
        }
        if at < entry.entry_time {
            return Err(DomainError::Validation(
                "exit time is before entry time".to_string(),
            ));
        }

        entry.exit_time = Some(at);
        entry.status = match entry.expected_exit {
            Some(expected) if at > expected => VisitorStatus::Overstayed,
            _ => VisitorStatus::Exited,
        };

        self.updated_at = at;
        self.recompute_summary();
        Ok(&self.visitors[idx])
    }

    pub fn overstaying(&self, now: DateTime<Utc>) -> Vec<&VisitorEntry> {
        self.visitors
            .iter()
            .filter(|v| v.is_overstaying(now))
            .collect()
    }
}
