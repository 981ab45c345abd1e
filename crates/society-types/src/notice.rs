//! Announcements and polls posted to a society

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: String,
    pub society_id: String,
    pub title: String,
    pub body: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub author_id: String,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_category() -> String {
    "General".to_string()
}

impl Notice {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |exp| now < exp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub label: String,
    #[serde(default)]
    pub votes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub society_id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    /// Account ids that have voted; ballots are not linked to options
    #[serde(default)]
    pub voters: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closes_at: Option<DateTime<Utc>>,
}

impl Poll {
    pub fn validate_options(labels: &[String]) -> Result<(), DomainError> {
        if labels.len() < 2 {
            return Err(DomainError::Validation(
                "a poll needs at least two options".to_string(),
            ));
        }
        if labels.iter().any(|l| l.trim().is_empty()) {
            return Err(DomainError::Validation(
                "poll options cannot be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.closes_at.map_or(true, |closes| now < closes)
    }

    pub fn vote(
        &mut self,
        voter: &str,
        option: usize,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_open(now) {
            return Err(DomainError::PollClosed);
        }
        if self.voters.iter().any(|v| v == voter) {
            return Err(DomainError::AlreadyVoted);
        }
        let choice = self
            .options
            .get_mut(option)
            .ok_or(DomainError::InvalidOption(option))?;
        choice.votes += 1;
        self.voters.push(voter.to_string());
        Ok(())
    }

    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|o| o.votes).sum()
    }
}
