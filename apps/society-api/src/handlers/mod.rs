//! HTTP handlers, one module per feature

use serde::Serialize;

pub mod accounts;
pub mod attendance;
pub mod billing;
pub mod chat;
pub mod deliveries;
pub mod health;
pub mod members;
pub mod notices;
pub mod passes;
pub mod tickets;

/// Envelope for collection responses
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let count = items.len();
        Self { items, count }
    }
}
