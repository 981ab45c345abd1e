//! Society ledger and billing report

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use society_types::{new_id, BillingReport, EntryKind, LedgerEntry, Resident, Tenant};
use tracing::info;

use super::ListResponse;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::state::AppState;
use crate::store::Filter;

#[derive(Debug, Deserialize)]
pub struct CreateLedgerEntryRequest {
    pub kind: EntryKind,
    pub category: String,
    /// Minor units
    pub amount: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resident_id: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub paid: bool,
}

async fn require_occupant(state: &AppState, society_id: &str, id: &str) -> Result<(), ApiError> {
    let resident = state.store.get::<Resident>(id).await?;
    if resident.is_some_and(|r| r.society_id == society_id) {
        return Ok(());
    }
    let tenant = state.store.get::<Tenant>(id).await?;
    if tenant.is_some_and(|t| t.society_id == society_id) {
        return Ok(());
    }
    Err(ApiError::NotFound(format!("resident {}", id)))
}

/// Handler: POST /api/ledger
pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateLedgerEntryRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    user.require_admin()?;
    if let Some(resident_id) = req.resident_id.as_deref() {
        if req.kind == EntryKind::Expense {
            return Err(ApiError::InvalidRequest(
                "expenses cannot be billed to a resident".to_string(),
            ));
        }
        require_occupant(&state, user.society_id(), resident_id).await?;
    }

    let now = Utc::now();
    let date = req.date.unwrap_or_else(|| now.date_naive());
    if req.due_date.is_some_and(|due| due < date) {
        return Err(ApiError::InvalidRequest(
            "due_date cannot be before the entry date".to_string(),
        ));
    }

    let mut entry = LedgerEntry {
        id: new_id(),
        society_id: user.society_id().to_string(),
        resident_id: req.resident_id,
        kind: req.kind,
        category: req.category.trim().to_string(),
        amount: req.amount,
        description: req.description,
        date,
        due_date: req.due_date,
        paid: req.paid,
        paid_at: req.paid.then_some(now),
        created_at: now,
    };
    entry.validate()?;
    state.store.insert(&mut entry).await?;

    info!(
        "Ledger {:?} {} of {} recorded",
        entry.kind, entry.category, entry.amount
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub resident_id: Option<String>,
    pub paid: Option<bool>,
}

/// Handler: GET /api/ledger
///
/// Residents and tenants only ever see their own dues.
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<ListResponse<LedgerEntry>>, ApiError> {
    let resident_id = if user.is_occupant() {
        Some(user.id().to_string())
    } else {
        user.require_admin()?;
        query.resident_id
    };

    let filter = Filter::new()
        .society(user.society_id())
        .eq_opt("resident_id", resident_id)
        .eq_opt("paid", query.paid);
    let entries: Vec<LedgerEntry> = state.store.find(&filter).await?;

    Ok(Json(entries.into()))
}

/// Handler: PATCH /api/ledger/:id/paid
pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<LedgerEntry>, ApiError> {
    user.require_admin()?;
    let mut entry: LedgerEntry = state.store.require(&id).await?;
    user.same_society(&entry.society_id)?;

    entry.mark_paid(Utc::now())?;
    state.store.save(&mut entry).await?;

    info!("Ledger entry {} marked paid", entry.id);
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// First and last day of the month containing `day`
fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = day.with_day(1).unwrap_or(day);
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next.and_then(|n| n.pred_opt()).unwrap_or(day);
    (first, last)
}

/// Handler: GET /api/billing/report
///
/// Defaults to the current calendar month.
pub async fn report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ReportQuery>,
) -> Result<Json<BillingReport>, ApiError> {
    user.require_admin()?;

    let (month_start, month_end) = month_bounds(Utc::now().date_naive());
    let from = query.from.unwrap_or(month_start);
    let to = query.to.unwrap_or(month_end);

    let entries: Vec<LedgerEntry> = state
        .store
        .find(&Filter::new().society(user.society_id()))
        .await?;
    let report = BillingReport::build(&entries, from, to)?;

    Ok(Json(report))
}
