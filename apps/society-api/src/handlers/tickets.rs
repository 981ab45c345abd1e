//! Maintenance tickets raised by residents and worked by the society office

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::Deserialize;
use society_auth::Role;
use society_types::{
    new_id, Location, MaintenanceTicket, Resident, TicketPriority, TicketStatus,
};
use tracing::info;

use super::ListResponse;
use crate::auth::AuthUser;
use crate::error::{require_field, ApiError};
use crate::extract::{Json, Path, Query};
use crate::state::AppState;
use crate::store::Filter;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
    /// Omit for common areas
    #[serde(default)]
    pub location: Option<Location>,
}

/// Handler: POST /api/tickets
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<MaintenanceTicket>), ApiError> {
    user.require(&[Role::Resident, Role::Tenant])?;
    require_field(&req.category, "category")?;
    require_field(&req.description, "description")?;
    if let Some(location) = &req.location {
        location.validate()?;
    }

    let now = Utc::now();
    let mut ticket = MaintenanceTicket {
        id: new_id(),
        society_id: user.society_id().to_string(),
        raised_by: user.id().to_string(),
        location: req.location,
        category: req.category,
        description: req.description,
        priority: req.priority,
        status: TicketStatus::Open,
        assigned_to: None,
        resolution_note: None,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    };
    state.store.insert(&mut ticket).await?;

    info!(
        "Ticket {} raised ({}, {:?})",
        ticket.id, ticket.category, ticket.priority
    );
    Ok((StatusCode::CREATED, Json(ticket)))
}

#[derive(Debug, Deserialize)]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
}

fn status_name(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "Open",
        TicketStatus::InProgress => "InProgress",
        TicketStatus::Resolved => "Resolved",
        TicketStatus::Closed => "Closed",
    }
}

/// Handler: GET /api/tickets
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<TicketQuery>,
) -> Result<Json<ListResponse<MaintenanceTicket>>, ApiError> {
    let mut filter = Filter::new()
        .society(user.society_id())
        .eq_opt("status", query.status.map(status_name));
    if user.is_occupant() {
        filter = filter.eq("raised_by", user.id());
    }

    let tickets: Vec<MaintenanceTicket> = state.store.find(&filter).await?;
    Ok(Json(tickets.into()))
}

#[derive(Debug, Deserialize)]
pub struct TicketUpdateRequest {
    pub status: TicketStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub resolution_note: Option<String>,
}

/// Handler: PATCH /api/tickets/:id/status
pub async fn update_ticket_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<TicketUpdateRequest>,
) -> Result<Json<MaintenanceTicket>, ApiError> {
    user.require_admin()?;
    let mut ticket: MaintenanceTicket = state.store.require(&id).await?;
    user.same_society(&ticket.society_id)?;

    ticket.transition(req.status, Utc::now())?;
    if let Some(assignee) = req.assigned_to.filter(|a| !a.trim().is_empty()) {
        ticket.assigned_to = Some(assignee);
    }
    if let Some(note) = req.resolution_note.filter(|n| !n.trim().is_empty()) {
        ticket.resolution_note = Some(note);
    }
    state.store.save(&mut ticket).await?;
    info!("Ticket {} moved to {:?}", ticket.id, ticket.status);

    if matches!(ticket.status, TicketStatus::Resolved | TicketStatus::Closed) {
        if let Some(token) = state
            .store
            .get::<Resident>(&ticket.raised_by)
            .await?
            .and_then(|r| r.push_token)
        {
            let body = format!("Your {} complaint has been resolved.", ticket.category);
            state.push(&token, "Ticket update", &body).await;
        }
    }

    Ok(Json(ticket))
}
