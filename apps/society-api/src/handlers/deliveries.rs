//! Parcels received at the gate and their hand-over to residents

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::Deserialize;
use society_auth::Role;
use society_types::{new_id, Delivery, DeliveryStatus, ItemType, Location, Resident, Tenant};
use tracing::info;

use super::ListResponse;
use crate::auth::AuthUser;
use crate::error::{require_field, ApiError};
use crate::extract::{Json, Path, Query};
use crate::state::AppState;
use crate::store::Filter;

#[derive(Debug, Deserialize)]
pub struct CreateDeliveryRequest {
    pub recipient_id: String,
    pub courier: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

/// Where to reach the recipient of a parcel
struct Recipient {
    location: Location,
    phone: String,
    push_token: Option<String>,
}

async fn find_recipient(
    state: &AppState,
    society_id: &str,
    id: &str,
) -> Result<Recipient, ApiError> {
    if let Some(resident) = state.store.get::<Resident>(id).await? {
        if resident.society_id == society_id {
            return Ok(Recipient {
                location: resident.location,
                phone: resident.phone,
                push_token: resident.push_token,
            });
        }
    }
    if let Some(tenant) = state.store.get::<Tenant>(id).await? {
        if tenant.society_id == society_id {
            return Ok(Recipient {
                location: tenant.location,
                phone: tenant.phone,
                push_token: None,
            });
        }
    }
    Err(ApiError::NotFound(format!("recipient {}", id)))
}

/// Handler: POST /api/deliveries
pub async fn create_delivery(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<(StatusCode, Json<Delivery>), ApiError> {
    user.require(&[Role::Security])?;
    require_field(&req.courier, "courier")?;

    let recipient = find_recipient(&state, user.society_id(), &req.recipient_id).await?;

    let mut delivery = Delivery {
        id: new_id(),
        society_id: user.society_id().to_string(),
        recipient_id: req.recipient_id,
        location: recipient.location,
        courier: req.courier,
        item_type: req.item_type,
        description: req.description,
        tracking_number: req.tracking_number,
        status: DeliveryStatus::Delivered,
        received_by: user.id().to_string(),
        received_at: Utc::now(),
        closed_at: None,
    };
    state.store.insert(&mut delivery).await?;
    info!(
        "Received {:?} from {} for {}",
        delivery.item_type, delivery.courier, delivery.location
    );

    let body = format!(
        "A {:?} from {} is waiting for you at the gate.",
        delivery.item_type, delivery.courier
    );
    match recipient.push_token {
        Some(token) => state.push(&token, "Delivery arrived", &body).await,
        None => state.sms(&recipient.phone, &body).await,
    }

    Ok((StatusCode::CREATED, Json(delivery)))
}

#[derive(Debug, Deserialize)]
pub struct DeliveryQuery {
    pub status: Option<DeliveryStatus>,
}

fn status_name(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Delivered => "Delivered",
        DeliveryStatus::Collected => "Collected",
        DeliveryStatus::Returned => "Returned",
        DeliveryStatus::Lost => "Lost",
    }
}

/// Handler: GET /api/deliveries
pub async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<DeliveryQuery>,
) -> Result<Json<ListResponse<Delivery>>, ApiError> {
    let mut filter = Filter::new()
        .society(user.society_id())
        .eq_opt("status", query.status.map(status_name));
    if user.is_occupant() {
        filter = filter.eq("recipient_id", user.id());
    }

    let deliveries: Vec<Delivery> = state.store.find(&filter).await?;
    Ok(Json(deliveries.into()))
}

#[derive(Debug, Deserialize)]
pub struct DeliveryStatusRequest {
    pub status: DeliveryStatus,
}

/// Handler: PATCH /api/deliveries/:id/status
///
/// Recipients may only mark their own parcel collected; guards and admins
/// can also record returns and losses.
pub async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<DeliveryStatusRequest>,
) -> Result<Json<Delivery>, ApiError> {
    let mut delivery: Delivery = state.store.require(&id).await?;
    user.same_society(&delivery.society_id)?;

    if user.is_occupant()
        && (delivery.recipient_id != user.id() || req.status != DeliveryStatus::Collected)
    {
        return Err(ApiError::Forbidden(
            "Recipients can only mark their own deliveries collected".to_string(),
        ));
    }

    delivery.transition(req.status, Utc::now())?;
    state.store.save(&mut delivery).await?;

    info!("Delivery {} marked {:?}", delivery.id, delivery.status);
    Ok(Json(delivery))
}
