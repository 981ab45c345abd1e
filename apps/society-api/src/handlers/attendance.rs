//! Daily visitor register kept by the gate
//!
//! One `DailyAttendance` document per society per UTC day holds every entry
//! for that day. Writes go through `AppState::writes` so concurrent check-ins
//! never overwrite each other's entries.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use society_auth::Role;
use society_types::{
    DailyAttendance, GatePass, Location, Pin, PinDocument, VisitorEntry, VisitorType,
};
use tracing::{debug, info};

use super::ListResponse;
use crate::auth::AuthUser;
use crate::error::{require_field, ApiError};
use crate::extract::{Json, Path, Query};
use crate::state::AppState;
use crate::store::{DocumentStore, Filter, StoreError};

fn day_filter(society_id: &str, date: NaiveDate) -> Filter {
    Filter::new()
        .society(society_id)
        .eq("date", date.to_string())
}

async fn find_day(
    store: &DocumentStore,
    society_id: &str,
    date: NaiveDate,
) -> Result<Option<DailyAttendance>, ApiError> {
    Ok(store.find_one(&day_filter(society_id, date)).await?)
}

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub name: String,
    pub phone: String,
    pub purpose: String,
    pub visitor_type: VisitorType,
    pub location: Location,
    #[serde(default)]
    pub expected_exit: Option<DateTime<Utc>>,
    /// Link the entry to an approved gate pass
    #[serde(default)]
    pub gate_pass_pin: Option<String>,
}

async fn linked_gate_pass(
    state: &AppState,
    society_id: &str,
    pin: &str,
    now: DateTime<Utc>,
) -> Result<GatePass, ApiError> {
    let pin = Pin::parse(pin.trim())?;
    let pass: GatePass = state
        .store
        .find_one(&Filter::new().society(society_id).eq("pin", pin.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("gate pass with PIN {}", pin)))?;

    let check = pass.gate_check(now);
    if !check.is_valid() {
        return Err(ApiError::InvalidRequest(format!(
            "Gate pass {} is not valid for entry ({:?})",
            pass.id, check
        )));
    }
    Ok(pass)
}

/// Handler: POST /api/attendance/visitors
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<VisitorEntry>), ApiError> {
    user.require(&[Role::Security])?;
    require_field(&req.name, "name")?;
    require_field(&req.purpose, "purpose")?;
    req.location.validate()?;

    let now = Utc::now();
    if req.expected_exit.is_some_and(|exit| exit <= now) {
        return Err(ApiError::InvalidRequest(
            "expected_exit must be in the future".to_string(),
        ));
    }

    let gate_pass = match req.gate_pass_pin.as_deref() {
        Some(pin) => Some(linked_gate_pass(&state, user.society_id(), pin, now).await?),
        None => None,
    };

    let mut entry = VisitorEntry::new(
        req.name,
        req.phone,
        req.purpose,
        req.visitor_type,
        req.location,
        now,
        req.expected_exit,
        user.id().to_string(),
    );
    entry.gate_pass_id = gate_pass.map(|p| p.id);

    let society_id = user.society_id();
    let today = now.date_naive();
    let _guard = state.writes.lock().await;

    let entry = match find_day(&state.store, society_id, today).await? {
        Some(mut day) => {
            let entry = day.check_in(entry).clone();
            state.store.save(&mut day).await?;
            entry
        }
        None => {
            let mut day = DailyAttendance::new(society_id, today, now);
            let checked_in = day.check_in(entry.clone()).clone();
            match state.store.insert(&mut day).await {
                Ok(()) => {
                    debug!("Opened attendance day {} for {}", today, society_id);
                    checked_in
                }
                // another process opened the day first
                Err(StoreError::Conflict(_)) => {
                    let mut day = find_day(&state.store, society_id, today)
                        .await?
                        .ok_or_else(|| ApiError::Conflict("attendance day".to_string()))?;
                    let entry = day.check_in(entry).clone();
                    state.store.save(&mut day).await?;
                    entry
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    info!(
        "Checked in {} ({:?}) to {} at society {}",
        entry.name, entry.visitor_type, entry.location, society_id
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Handler: PATCH /api/attendance/visitors/:entry_id/exit
pub async fn mark_exit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(entry_id): Path<String>,
) -> Result<Json<VisitorEntry>, ApiError> {
    user.require(&[Role::Security])?;

    let _guard = state.writes.lock().await;
    let mut day: DailyAttendance = state
        .store
        .find_one(
            &Filter::new()
                .society(user.society_id())
                .array_contains("visitors", "id", &entry_id),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("visitor entry {}", entry_id)))?;

    let entry = day.mark_exit(&entry_id, Utc::now())?.clone();
    state.store.save(&mut day).await?;

    info!("{} exited with status {:?}", entry.name, entry.status);
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
}

/// Handler: GET /api/attendance
///
/// A day with no visitors yet comes back empty rather than 404.
pub async fn get_day(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<DayQuery>,
) -> Result<Json<DailyAttendance>, ApiError> {
    user.require(&[Role::Society, Role::Security])?;

    let now = Utc::now();
    let date = query.date.unwrap_or_else(|| now.date_naive());
    let day = find_day(&state.store, user.society_id(), date)
        .await?
        .unwrap_or_else(|| DailyAttendance::new(user.society_id(), date, now));

    Ok(Json(day))
}

/// Handler: GET /api/attendance/overstays
///
/// Looks at yesterday too so visitors who stayed past midnight still show.
pub async fn overstays(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ListResponse<VisitorEntry>>, ApiError> {
    user.require(&[Role::Society, Role::Security])?;

    let now = Utc::now();
    let today = now.date_naive();
    let mut entries = Vec::new();
    for date in [today - Duration::days(1), today] {
        if let Some(day) = find_day(&state.store, user.society_id(), date).await? {
            entries.extend(day.overstaying(now).into_iter().cloned());
        }
    }

    Ok(Json(entries.into()))
}
