//! Route table

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Router,
};
use society_types::{Resident, SecurityGuard, Tenant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::documents::MemberDocument;
use crate::handlers::{
    accounts, attendance, billing, chat, deliveries, health, members, notices, passes, tickets,
};
use crate::state::AppState;

/// List/get/verify/delete for one member kind under `base`
fn member_routes<M: MemberDocument>(base: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(base, get(members::list_members::<M>))
        .route(
            &format!("{}/:id", base),
            get(members::get_member::<M>).delete(members::delete_member::<M>),
        )
        .route(
            &format!("{}/:id/verify", base),
            patch(members::verify_member::<M>),
        )
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        // Health check
        .route("/health", get(health::health))
        // Registration and login
        .route("/api/auth/society/register", post(accounts::register_society))
        .route("/api/auth/residents/register", post(accounts::register_resident))
        .route("/api/auth/tenants/register", post(accounts::register_tenant))
        .route("/api/auth/security/register", post(accounts::register_security))
        .route("/api/auth/login", post(accounts::login))
        // Members
        .merge(member_routes::<Resident>("/api/residents"))
        .merge(member_routes::<Tenant>("/api/tenants"))
        .merge(member_routes::<SecurityGuard>("/api/security"))
        .route(
            "/api/residents/:id/photo",
            put(members::upload_photo)
                .layer(DefaultBodyLimit::max(members::MAX_PHOTO_BODY_BYTES)),
        )
        .route("/api/residents/:id/push-token", put(members::set_push_token))
        // Passes
        .route(
            "/api/animal-tags",
            post(passes::create_animal_tag).get(passes::list_animal_tags),
        )
        .route("/api/animal-tags/:id", delete(passes::delete_animal_tag))
        .route(
            "/api/gate-passes",
            post(passes::create_gate_pass).get(passes::list_gate_passes),
        )
        .route("/api/gate-passes/:id/status", patch(passes::decide_gate_pass))
        .route(
            "/api/service-passes",
            post(passes::create_service_pass).get(passes::list_service_passes),
        )
        .route(
            "/api/service-passes/:id/status",
            patch(passes::decide_service_pass),
        )
        .route("/api/passes/verify", post(passes::verify_pin))
        // Attendance
        .route("/api/attendance", get(attendance::get_day))
        .route("/api/attendance/overstays", get(attendance::overstays))
        .route("/api/attendance/visitors", post(attendance::check_in))
        .route(
            "/api/attendance/visitors/:entry_id/exit",
            patch(attendance::mark_exit),
        )
        // Deliveries
        .route(
            "/api/deliveries",
            post(deliveries::create_delivery).get(deliveries::list_deliveries),
        )
        .route(
            "/api/deliveries/:id/status",
            patch(deliveries::update_delivery_status),
        )
        // Chat
        .route(
            "/api/chat/messages",
            post(chat::send_message).get(chat::list_messages),
        )
        .route("/api/chat/messages/:id", delete(chat::delete_message))
        .route("/api/chat/messages/:id/read", patch(chat::mark_read))
        .route("/api/chat/stream", get(chat::stream_events))
        .route("/api/chat/presence", get(chat::presence))
        // Notices and polls
        .route(
            "/api/notices",
            post(notices::create_notice).get(notices::list_notices),
        )
        .route("/api/notices/:id", delete(notices::delete_notice))
        .route("/api/polls", post(notices::create_poll).get(notices::list_polls))
        .route("/api/polls/:id/vote", post(notices::vote))
        // Maintenance tickets
        .route(
            "/api/tickets",
            post(tickets::create_ticket).get(tickets::list_tickets),
        )
        .route("/api/tickets/:id/status", patch(tickets::update_ticket_status))
        // Billing
        .route(
            "/api/ledger",
            post(billing::create_entry).get(billing::list_entries),
        )
        .route("/api/ledger/:id/paid", patch(billing::mark_paid))
        .route("/api/billing/report", get(billing::report));

    // uploaded photos, when served from this process
    let media_base = state.config.media_base_url.trim_end_matches('/');
    if media_base.starts_with('/') && media_base.len() > 1 {
        app = app.nest_service(media_base, ServeDir::new(&state.config.media_dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
