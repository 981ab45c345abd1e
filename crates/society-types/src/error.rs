//! Errors raised by domain rules

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    #[error("Visitor entry not found: {0}")]
    VisitorNotFound(String),

    #[error("Visitor {0} has already exited")]
    AlreadyExited(String),

    #[error("Poll is closed")]
    PollClosed,

    #[error("Already voted in this poll")]
    AlreadyVoted,

    #[error("Poll option {0} does not exist")]
    InvalidOption(usize),

    #[error("Invalid value: {0}")]
    Validation(String),
}

impl DomainError {
    pub(crate) fn transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        DomainError::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}
