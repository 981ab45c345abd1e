//! HTTP tests for the Society Hub API
//!
//! Each test runs the full router against an in-memory SQLite store, a
//! notifier that records instead of sending, and an in-memory media store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum_test::{TestRequest, TestServer};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use clap::Parser;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use society_types::{
    new_id, AnimalTag, DailyAttendance, GatePass, Location, PassStatus, Pin, VerificationStatus,
    VisitorEntry, VisitorType,
};

use crate::config::Config;
use crate::extract::Query;
use crate::handlers::chat::{stream_events, StreamQuery};
use crate::integrations::{IntegrationError, MediaStore, Notifier, StoredMedia};
use crate::routes::router;
use crate::state::AppState;
use crate::store::DocumentStore;

const PASSWORD: &str = "Gatekeep3r";

#[derive(Default)]
struct RecordingNotifier {
    sms: Mutex<Vec<(String, String)>>,
    pushes: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn sms(&self) -> Vec<(String, String)> {
        self.sms.lock().unwrap().clone()
    }

    fn pushes(&self) -> Vec<(String, String)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError> {
        self.sms.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }

    async fn send_push(
        &self,
        device_token: &str,
        title: &str,
        _body: &str,
    ) -> Result<(), IntegrationError> {
        self.pushes
            .lock()
            .unwrap()
            .push((device_token.to_string(), title.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryMedia {
    files: Mutex<HashMap<String, usize>>,
    counter: Mutex<u32>,
}

#[async_trait]
impl MediaStore for MemoryMedia {
    async fn upload(
        &self,
        folder: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<StoredMedia, IntegrationError> {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        let public_id = format!("{}/{}.{}", folder, counter, extension);
        self.files
            .lock()
            .unwrap()
            .insert(public_id.clone(), bytes.len());
        Ok(StoredMedia {
            url: format!("https://media.test/{}", public_id),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), IntegrationError> {
        self.files.lock().unwrap().remove(public_id);
        Ok(())
    }
}

struct Harness {
    server: TestServer,
    state: Arc<AppState>,
    notifier: Arc<RecordingNotifier>,
    media: Arc<MemoryMedia>,
}

async fn harness() -> Harness {
    let store = DocumentStore::in_memory().await.unwrap();
    let config = Config::parse_from(["society-api", "--jwt-secret", "test-secret"]);
    let notifier = Arc::new(RecordingNotifier::default());
    let media = Arc::new(MemoryMedia::default());

    let state = Arc::new(AppState::with_parts(
        store,
        config,
        notifier.clone(),
        media.clone(),
    ));
    let server = TestServer::new(router(state.clone())).unwrap();

    Harness {
        server,
        state,
        notifier,
        media,
    }
}

fn bearer(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

struct Session {
    token: String,
    id: String,
    society_id: String,
}

impl Harness {
    async fn register_society(&self, email: &str) -> Session {
        let res = self
            .server
            .post("/api/auth/society/register")
            .json(&json!({
                "name": "Green Meadows",
                "address": "12 Lake Road",
                "city": "Pune",
                "admin_name": "Meera Rao",
                "admin_email": email,
                "password": PASSWORD,
                "blocks": ["A", "B"],
            }))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        let body: Value = res.json();
        Session {
            token: body["token"].as_str().unwrap().to_string(),
            id: body["profile_id"].as_str().unwrap().to_string(),
            society_id: body["society_id"].as_str().unwrap().to_string(),
        }
    }

    async fn register_resident(&self, society_id: &str, email: &str, flat: &str) -> String {
        let res = self
            .server
            .post("/api/auth/residents/register")
            .json(&json!({
                "society_id": society_id,
                "name": format!("Resident {}", flat),
                "email": email,
                "phone": "+919800000001",
                "password": PASSWORD,
                "location": {"block": "A", "floor": "3", "flat": flat},
                "is_owner": true,
            }))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        let body: Value = res.json();
        assert_eq!(body["verification"], "Pending");
        assert!(body["token"].is_null());
        body["profile_id"].as_str().unwrap().to_string()
    }

    async fn register_guard(&self, society_id: &str, phone: &str) -> String {
        let res = self
            .server
            .post("/api/auth/security/register")
            .json(&json!({
                "society_id": society_id,
                "name": "Ravi",
                "phone": phone,
                "password": PASSWORD,
                "shift": "Night",
                "gate": "Main",
            }))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        let body: Value = res.json();
        body["profile_id"].as_str().unwrap().to_string()
    }

    async fn approve(&self, admin: &Session, kind: &str, id: &str) {
        let res = bearer(
            self.server.patch(&format!("/api/{}/{}/verify", kind, id)),
            &admin.token,
        )
        .json(&json!({"status": "Approved"}))
        .await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    async fn login(&self, login: &str) -> Session {
        let res = self
            .server
            .post("/api/auth/login")
            .json(&json!({"login": login, "password": PASSWORD}))
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let body: Value = res.json();
        Session {
            token: body["token"].as_str().unwrap().to_string(),
            id: body["profile_id"].as_str().unwrap().to_string(),
            society_id: body["society_id"].as_str().unwrap().to_string(),
        }
    }

    /// Admin, an approved resident and an approved guard in one society
    async fn society(&self) -> (Session, Session, Session) {
        let admin = self.register_society("office@meadows.test").await;
        let resident_id = self
            .register_resident(&admin.society_id, "asha@meadows.test", "302")
            .await;
        let guard_id = self.register_guard(&admin.society_id, "9811122233").await;
        self.approve(&admin, "residents", &resident_id).await;
        self.approve(&admin, "security", &guard_id).await;

        let resident = self.login("Asha@Meadows.test").await;
        let guard = self.login("9811122233").await;
        (admin, resident, guard)
    }
}

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let res = h.server.get("/health").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body: Value = res.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "society-api");
}

#[tokio::test]
async fn test_protected_routes_need_a_valid_token() {
    let h = harness().await;

    let res = h.server.get("/api/residents").await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let res = bearer(h.server.get("/api/residents"), "not.a.token").await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_guards_return_forbidden() {
    let h = harness().await;
    let (_admin, resident, _guard) = h.society().await;

    let res = bearer(
        h.server.patch(&format!("/api/residents/{}/verify", resident.id)),
        &resident.token,
    )
    .json(&json!({"status": "Approved"}))
    .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let res = bearer(h.server.get("/api/billing/report"), &resident.token).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_pending_resident_cannot_log_in_until_approved() {
    let h = harness().await;
    let admin = h.register_society("office@meadows.test").await;
    let resident_id = h
        .register_resident(&admin.society_id, "dev@meadows.test", "101")
        .await;

    let res = h
        .server
        .post("/api/auth/login")
        .json(&json!({"login": "dev@meadows.test", "password": PASSWORD}))
        .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let pending: Value = bearer(h.server.get("/api/residents?status=Pending"), &admin.token)
        .await
        .json();
    assert_eq!(pending["count"], 1);

    h.approve(&admin, "residents", &resident_id).await;

    let approved: Value = bearer(h.server.get("/api/residents?status=Approved"), &admin.token)
        .await
        .json();
    assert_eq!(approved["count"], 1);
    assert_eq!(approved["items"][0]["id"], resident_id.as_str());
    let pending: Value = bearer(h.server.get("/api/residents?status=Pending"), &admin.token)
        .await
        .json();
    assert_eq!(pending["count"], 0);

    // approval is texted to the resident
    let sms = h.notifier.sms();
    assert_eq!(sms.len(), 1);
    assert!(sms[0].1.contains("approved"));

    let session = h.login("dev@meadows.test").await;
    assert_eq!(session.id, resident_id);

    // a decision is final
    let res = bearer(
        h.server.patch(&format!("/api/residents/{}/verify", resident_id)),
        &admin.token,
    )
    .json(&json!({"status": "Rejected"}))
    .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_login_is_conflict() {
    let h = harness().await;
    h.register_society("office@meadows.test").await;
    let res = h
        .server
        .post("/api/auth/society/register")
        .json(&json!({
            "name": "Other",
            "address": "1 Road",
            "city": "Pune",
            "admin_name": "X",
            "admin_email": "OFFICE@meadows.test",
            "password": PASSWORD,
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_weak_password_is_bad_request() {
    let h = harness().await;
    let res = h
        .server
        .post("/api/auth/society/register")
        .json(&json!({
            "name": "Green Meadows",
            "address": "12 Lake Road",
            "city": "Pune",
            "admin_name": "Meera",
            "admin_email": "office@meadows.test",
            "password": "short",
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gate_pass_gets_unique_six_digit_pin() {
    let h = harness().await;
    let (_admin, resident, guard) = h.society().await;
    let now = Utc::now();

    let mut pins = Vec::new();
    for visitor in ["Kiran", "Sam", "Lee"] {
        let res = bearer(h.server.post("/api/gate-passes"), &resident.token)
            .json(&json!({
                "visitor_name": visitor,
                "visitor_phone": "9822200011",
                "purpose": "Dinner",
                "valid_from": now - Duration::minutes(5),
                "valid_until": now + Duration::hours(4),
            }))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        let body: Value = res.json();
        assert_eq!(body["status"], "Pending");
        pins.push(body["pin"].as_str().unwrap().to_string());
    }

    for pin in &pins {
        assert_eq!(pin.len(), 6);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));
    }
    let mut unique = pins.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), pins.len());

    // pending passes do not open the gate
    let res = bearer(h.server.post("/api/passes/verify"), &guard.token)
        .json(&json!({"pin": pins[0]}))
        .await;
    let body: Value = res.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["matches"][0]["check"], "not_approved");

    let passes: Value = bearer(h.server.get("/api/gate-passes"), &guard.token)
        .await
        .json();
    let first_id = passes["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["pin"] == pins[0].as_str())
        .map(|p| p["id"].as_str().unwrap().to_string())
        .unwrap();

    let res = bearer(
        h.server.patch(&format!("/api/gate-passes/{}/status", first_id)),
        &guard.token,
    )
    .json(&json!({"status": "Approved"}))
    .await;
    assert_eq!(res.status_code(), StatusCode::OK);

    // visitor receives the PIN
    let sms = h.notifier.sms();
    let last = sms.last().unwrap();
    assert_eq!(last.0, "9822200011");
    assert!(last.1.contains(&pins[0]));

    let body: Value = bearer(h.server.post("/api/passes/verify"), &guard.token)
        .json(&json!({"pin": pins[0]}))
        .await
        .json();
    assert_eq!(body["valid"], true);
    assert_eq!(body["matches"][0]["kind"], "gate_pass");
    assert_eq!(body["matches"][0]["holder"], "Kiran");
}

#[tokio::test]
async fn test_gate_pass_rejects_inverted_window() {
    let h = harness().await;
    let (_admin, resident, _guard) = h.society().await;
    let now = Utc::now();

    let res = bearer(h.server.post("/api/gate-passes"), &resident.token)
        .json(&json!({
            "visitor_name": "Kiran",
            "visitor_phone": "9822200011",
            "purpose": "Dinner",
            "valid_from": now + Duration::hours(2),
            "valid_until": now,
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_visitor_check_in_and_exit_updates_summary() {
    let h = harness().await;
    let (admin, _resident, guard) = h.society().await;

    let res = bearer(h.server.post("/api/attendance/visitors"), &guard.token)
        .json(&json!({
            "name": "Plumber",
            "phone": "9833300022",
            "purpose": "Leak repair",
            "visitor_type": "Service",
            "location": {"block": "A", "flat": "302"},
            "expected_exit": Utc::now() + Duration::hours(2),
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    let entry: Value = res.json();
    assert_eq!(entry["status"], "Inside");

    let day: Value = bearer(h.server.get("/api/attendance"), &admin.token)
        .await
        .json();
    assert_eq!(day["summary"], json!({"total": 1, "inside": 1, "exited": 0, "overstayed": 0}));

    let res = bearer(
        h.server.patch(&format!(
            "/api/attendance/visitors/{}/exit",
            entry["id"].as_str().unwrap()
        )),
        &guard.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let exited: Value = res.json();
    assert_eq!(exited["status"], "Exited");

    let day: Value = bearer(h.server.get("/api/attendance"), &admin.token)
        .await
        .json();
    assert_eq!(day["summary"], json!({"total": 1, "inside": 0, "exited": 1, "overstayed": 0}));

    // exiting twice is rejected
    let res = bearer(
        h.server.patch(&format!(
            "/api/attendance/visitors/{}/exit",
            entry["id"].as_str().unwrap()
        )),
        &guard.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_exit_after_expected_time_is_overstayed() {
    let h = harness().await;
    let (_admin, _resident, guard) = h.society().await;

    // seed a visitor whose expected exit has already passed
    let now = Utc::now();
    let mut day = DailyAttendance::new(&guard.society_id, now.date_naive(), now);
    let entry = VisitorEntry::new(
        "Cousin".into(),
        "9844400033".into(),
        "Family visit".into(),
        VisitorType::Guest,
        Location {
            block: "A".into(),
            floor: None,
            flat: "302".into(),
        },
        now - Duration::hours(3),
        Some(now - Duration::hours(1)),
        guard.id.clone(),
    );
    let entry_id = day.check_in(entry).id.clone();
    h.state.store.insert(&mut day).await.unwrap();

    let overstays: Value = bearer(h.server.get("/api/attendance/overstays"), &guard.token)
        .await
        .json();
    assert_eq!(overstays["count"], 1);

    let res = bearer(
        h.server
            .patch(&format!("/api/attendance/visitors/{}/exit", entry_id)),
        &guard.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let exited: Value = res.json();
    assert_eq!(exited["status"], "Overstayed");

    let stored: DailyAttendance = h.state.store.require(&day.id).await.unwrap();
    assert_eq!(stored.summary.overstayed, 1);
    assert_eq!(stored.summary.inside, 0);
}

#[tokio::test]
async fn test_unknown_visitor_exit_is_not_found() {
    let h = harness().await;
    let (_admin, _resident, guard) = h.society().await;
    let res = bearer(
        h.server.patch("/api/attendance/visitors/nope/exit"),
        &guard.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_delete_is_soft() {
    let h = harness().await;
    let (admin, resident, _guard) = h.society().await;

    let res = bearer(h.server.post("/api/chat/messages"), &resident.token)
        .json(&json!({"content": "Water supply off tomorrow?"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    let message: Value = res.json();
    let id = message["id"].as_str().unwrap().to_string();
    assert_eq!(message["sender_name"], "Resident 302");

    // only the sender may delete
    let res = bearer(
        h.server.delete(&format!("/api/chat/messages/{}", id)),
        &admin.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let res = bearer(
        h.server.delete(&format!("/api/chat/messages/{}", id)),
        &resident.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::OK);

    let feed: Value = bearer(h.server.get("/api/chat/messages"), &admin.token)
        .await
        .json();
    assert_eq!(feed["count"], 1);
    assert_eq!(feed["items"][0]["deleted"], true);
    assert_eq!(feed["items"][0]["content"], "This message was deleted");
}

#[tokio::test]
async fn test_direct_message_read_receipt() {
    let h = harness().await;
    let (admin, resident, _guard) = h.society().await;

    let message: Value = bearer(h.server.post("/api/chat/messages"), &resident.token)
        .json(&json!({"recipient_id": admin.id, "content": "Lift is stuck"}))
        .await
        .json();
    assert_eq!(message["status"], "Sent");
    let id = message["id"].as_str().unwrap();

    // the sender cannot mark their own message read
    let res = bearer(
        h.server.patch(&format!("/api/chat/messages/{}/read", id)),
        &resident.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let read: Value = bearer(
        h.server.patch(&format!("/api/chat/messages/{}/read", id)),
        &admin.token,
    )
    .await
    .json();
    assert_eq!(read["status"], "Read");

    let thread: Value = bearer(
        h.server
            .get(&format!("/api/chat/messages?with={}", resident.id)),
        &admin.token,
    )
    .await
    .json();
    assert_eq!(thread["count"], 1);

    let res = bearer(h.server.post("/api/chat/messages"), &resident.token)
        .json(&json!({"recipient_id": "stranger", "content": "hi"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delivery_collected_by_recipient() {
    let h = harness().await;
    let (admin, resident, guard) = h.society().await;

    // register the resident's device so the arrival is pushed
    let res = bearer(
        h.server
            .put(&format!("/api/residents/{}/push-token", resident.id)),
        &resident.token,
    )
    .json(&json!({"push_token": "device-1"}))
    .await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);

    let delivery: Value = bearer(h.server.post("/api/deliveries"), &guard.token)
        .json(&json!({
            "recipient_id": resident.id,
            "courier": "BlueDart",
            "item_type": "Package",
        }))
        .await
        .json();
    assert_eq!(delivery["status"], "Delivered");
    assert_eq!(delivery["location"]["flat"], "302");
    assert_eq!(h.notifier.pushes(), vec![("device-1".to_string(), "Delivery arrived".to_string())]);

    let id = delivery["id"].as_str().unwrap();
    let res = bearer(
        h.server.patch(&format!("/api/deliveries/{}/status", id)),
        &resident.token,
    )
    .json(&json!({"status": "Lost"}))
    .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let collected: Value = bearer(
        h.server.patch(&format!("/api/deliveries/{}/status", id)),
        &resident.token,
    )
    .json(&json!({"status": "Collected"}))
    .await
    .json();
    assert_eq!(collected["status"], "Collected");

    let waiting: Value = bearer(h.server.get("/api/deliveries?status=Delivered"), &admin.token)
        .await
        .json();
    assert_eq!(waiting["count"], 0);
}

#[tokio::test]
async fn test_poll_allows_one_vote_per_resident() {
    let h = harness().await;
    let (admin, resident, _guard) = h.society().await;

    let poll: Value = bearer(h.server.post("/api/polls"), &admin.token)
        .json(&json!({"question": "Repaint block A?", "options": ["Yes", "No"]}))
        .await
        .json();
    let id = poll["id"].as_str().unwrap();

    let voted: Value = bearer(h.server.post(&format!("/api/polls/{}/vote", id)), &resident.token)
        .json(&json!({"option": 0}))
        .await
        .json();
    assert_eq!(voted["options"][0]["votes"], 1);

    let res = bearer(h.server.post(&format!("/api/polls/{}/vote", id)), &resident.token)
        .json(&json!({"option": 1}))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = bearer(h.server.post("/api/polls"), &admin.token)
        .json(&json!({"question": "Only one?", "options": ["Yes"]}))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ticket_lifecycle() {
    let h = harness().await;
    let (admin, resident, _guard) = h.society().await;

    let ticket: Value = bearer(h.server.post("/api/tickets"), &resident.token)
        .json(&json!({"category": "Plumbing", "description": "Kitchen tap leaking", "priority": "High"}))
        .await
        .json();
    assert_eq!(ticket["status"], "Open");
    let id = ticket["id"].as_str().unwrap();

    let resolved: Value = bearer(h.server.patch(&format!("/api/tickets/{}/status", id)), &admin.token)
        .json(&json!({"status": "Resolved", "resolution_note": "Washer replaced"}))
        .await
        .json();
    assert_eq!(resolved["status"], "Resolved");
    assert!(!resolved["resolved_at"].is_null());

    let res = bearer(h.server.patch(&format!("/api/tickets/{}/status", id)), &admin.token)
        .json(&json!({"status": "InProgress"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_billing_report() {
    let h = harness().await;
    let (admin, resident, _guard) = h.society().await;

    for body in [
        json!({"kind": "Income", "category": "Maintenance", "amount": 250000, "resident_id": resident.id, "date": "2024-03-01", "paid": true}),
        json!({"kind": "Income", "category": "Maintenance", "amount": 250000, "resident_id": resident.id, "date": "2024-03-02"}),
        json!({"kind": "Expense", "category": "Security", "amount": 120000, "date": "2024-03-05", "paid": true}),
    ] {
        let res = bearer(h.server.post("/api/ledger"), &admin.token).json(&body).await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
    }

    let report: Value = bearer(
        h.server.get("/api/billing/report?from=2024-03-01&to=2024-03-31"),
        &admin.token,
    )
    .await
    .json();
    assert_eq!(report["total_income"], 250000);
    assert_eq!(report["total_expense"], 120000);
    assert_eq!(report["balance"], 130000);
    assert_eq!(report["outstanding"], 250000);
    assert_eq!(report["pending_dues"][0]["resident_id"], resident.id.as_str());

    // residents see only their own dues
    let mine: Value = bearer(h.server.get("/api/ledger"), &resident.token)
        .await
        .json();
    assert_eq!(mine["count"], 2);
}

#[tokio::test]
async fn test_photo_upload_replaces_previous() {
    let h = harness().await;
    let (_admin, resident, _guard) = h.society().await;
    let png = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    let first: Value = bearer(
        h.server.put(&format!("/api/residents/{}/photo", resident.id)),
        &resident.token,
    )
    .json(&json!({"image": format!("data:image/png;base64,{}", png)}))
    .await
    .json();
    let first_id = first["photo_public_id"].as_str().unwrap().to_string();

    let second: Value = bearer(
        h.server.put(&format!("/api/residents/{}/photo", resident.id)),
        &resident.token,
    )
    .json(&json!({"image": png}))
    .await
    .json();
    let second_id = second["photo_public_id"].as_str().unwrap().to_string();
    assert_ne!(first_id, second_id);

    let files = h.media.files.lock().unwrap();
    assert!(!files.contains_key(&first_id));
    assert!(files.contains_key(&second_id));
}

#[tokio::test]
async fn test_other_society_is_isolated() {
    let h = harness().await;
    let (_admin, resident, _guard) = h.society().await;
    let other = h.register_society("office@hills.test").await;

    let res = bearer(
        h.server.get(&format!("/api/residents/{}", resident.id)),
        &other.token,
    )
    .await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

    let list: Value = bearer(h.server.get("/api/residents"), &other.token)
        .await
        .json();
    assert_eq!(list["count"], 0);
}

#[tokio::test]
async fn test_malformed_input_is_bad_request() {
    let h = harness().await;
    let (admin, resident, _guard) = h.society().await;

    let res = bearer(h.server.patch("/api/residents/x/verify"), &admin.token)
        .json(&json!({"status": "Maybe"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert_eq!(body["status"], 400);

    let res = bearer(h.server.post("/api/gate-passes"), &resident.token)
        .json(&json!({"visitor_name": "Kiran"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert!(body["error"].as_str().unwrap().contains("visitor_phone"));

    let res = bearer(h.server.get("/api/residents?status=Maybe"), &admin.token).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["code"], "INVALID_REQUEST");
}

fn png_of_size(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    bytes[..8].copy_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    STANDARD.encode(bytes)
}

#[tokio::test]
async fn test_photo_size_limits() {
    let h = harness().await;
    let (_admin, resident, _guard) = h.society().await;
    let url = format!("/api/residents/{}/photo", resident.id);

    // larger than the framework's default body limit, under the photo cap
    let size = 3 * 1024 * 1024;
    let res = bearer(h.server.put(&url), &resident.token)
        .json(&json!({"image": png_of_size(size)}))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body: Value = res.json();
    let public_id = body["photo_public_id"].as_str().unwrap().to_string();
    assert_eq!(h.media.files.lock().unwrap().get(&public_id), Some(&size));

    let res = bearer(h.server.put(&url), &resident.token)
        .json(&json!({"image": png_of_size(6 * 1024 * 1024)}))
        .await;
    assert_eq!(res.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = res.json();
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_animal_tag_lifecycle() {
    let h = harness().await;
    let (admin, resident, guard) = h.society().await;

    let res = bearer(h.server.post("/api/animal-tags"), &resident.token)
        .json(&json!({"pet_name": "Bruno", "species": "Dog", "breed": "Beagle"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    let tag: Value = res.json();
    assert_eq!(tag["status"], "Active");
    assert_eq!(tag["pin"].as_str().unwrap().len(), 6);
    let tag_id = tag["id"].as_str().unwrap().to_string();

    // a tag whose validity has lapsed
    let now = Utc::now();
    let mut lapsed = AnimalTag {
        id: new_id(),
        society_id: admin.society_id.clone(),
        resident_id: resident.id.clone(),
        pin: Pin::parse("135790").unwrap(),
        pet_name: "Misty".into(),
        species: "Cat".into(),
        breed: None,
        status: PassStatus::Active,
        issued_at: now - Duration::days(400),
        expires_at: now - Duration::days(35),
    };
    h.state.store.insert(&mut lapsed).await.unwrap();

    let list: Value = bearer(h.server.get("/api/animal-tags"), &resident.token)
        .await
        .json();
    assert_eq!(list["count"], 2);
    let misty = list["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["pet_name"] == "Misty")
        .unwrap();
    assert_eq!(misty["status"], "Expired");
    let stored: AnimalTag = h.state.store.require(&lapsed.id).await.unwrap();
    assert_eq!(stored.status, PassStatus::Expired);

    let path = format!("/api/animal-tags/{}", tag_id);
    let res = bearer(h.server.delete(&path), &guard.token).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    let res = bearer(h.server.delete(&path), &resident.token).await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);

    let list: Value = bearer(h.server.get("/api/animal-tags"), &resident.token)
        .await
        .json();
    assert_eq!(list["count"], 1);
}

#[tokio::test]
async fn test_animal_tag_does_not_admit_visitor() {
    let h = harness().await;
    let (admin, resident, guard) = h.society().await;

    let tag: Value = bearer(h.server.post("/api/animal-tags"), &resident.token)
        .json(&json!({"pet_name": "Bruno", "species": "Dog"}))
        .await
        .json();
    let pin = tag["pin"].as_str().unwrap();

    // pending gate pass sharing the tag's PIN
    let now = Utc::now();
    let mut pass = GatePass {
        id: new_id(),
        society_id: admin.society_id.clone(),
        resident_id: resident.id.clone(),
        pin: Pin::parse(pin).unwrap(),
        visitor_name: "Kiran".into(),
        visitor_phone: "9822200011".into(),
        purpose: "Dinner".into(),
        guests: 1,
        status: VerificationStatus::Pending,
        valid_from: now - Duration::minutes(5),
        valid_until: now + Duration::hours(2),
        created_at: now,
    };
    h.state.store.insert(&mut pass).await.unwrap();

    let body: Value = bearer(h.server.post("/api/passes/verify"), &guard.token)
        .json(&json!({"pin": pin}))
        .await
        .json();
    assert_eq!(body["valid"], false);
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    let tag_match = matches.iter().find(|m| m["kind"] == "animal_tag").unwrap();
    assert_eq!(tag_match["valid"], true);
}

#[tokio::test]
async fn test_service_pass_approval() {
    let h = harness().await;
    let (_admin, resident, guard) = h.society().await;
    let now = Utc::now();

    let res = bearer(h.server.post("/api/service-passes"), &resident.token)
        .json(&json!({
            "provider_name": "Sunita",
            "service_type": "Housekeeping",
            "phone": "9855500044",
            "valid_from": now - Duration::minutes(1),
            "valid_until": now + Duration::hours(3),
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    let pass: Value = res.json();
    assert_eq!(pass["status"], "Pending");
    let id = pass["id"].as_str().unwrap();
    let pin = pass["pin"].as_str().unwrap();

    // only the gate or the office decides
    let path = format!("/api/service-passes/{}/status", id);
    let res = bearer(h.server.patch(&path), &resident.token)
        .json(&json!({"status": "Approved"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let res = bearer(h.server.patch(&path), &guard.token)
        .json(&json!({"status": "Approved"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let sms = h.notifier.sms();
    let last = sms.last().unwrap();
    assert_eq!(last.0, "9855500044");
    assert!(last.1.contains(pin));

    // decisions are final
    let res = bearer(h.server.patch(&path), &guard.token)
        .json(&json!({"status": "Rejected"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let approved: Value = bearer(
        h.server.get("/api/service-passes?status=Approved"),
        &resident.token,
    )
    .await
    .json();
    assert_eq!(approved["count"], 1);

    let body: Value = bearer(h.server.post("/api/passes/verify"), &guard.token)
        .json(&json!({"pin": pin}))
        .await
        .json();
    assert_eq!(body["valid"], true);
    assert_eq!(body["matches"][0]["kind"], "service_pass");
    assert_eq!(body["matches"][0]["holder"], "Sunita");
}

#[tokio::test]
async fn test_check_in_through_gate_pass() {
    let h = harness().await;
    let (_admin, resident, guard) = h.society().await;
    let now = Utc::now();

    let pass: Value = bearer(h.server.post("/api/gate-passes"), &resident.token)
        .json(&json!({
            "visitor_name": "Kiran",
            "visitor_phone": "9822200011",
            "purpose": "Dinner",
            "valid_from": now - Duration::minutes(5),
            "valid_until": now + Duration::hours(4),
        }))
        .await
        .json();
    let pass_id = pass["id"].as_str().unwrap();
    let check_in = json!({
        "name": "Kiran",
        "phone": "9822200011",
        "purpose": "Dinner",
        "visitor_type": "Guest",
        "location": {"block": "A", "flat": "302"},
        "gate_pass_pin": pass["pin"],
    });

    let res = bearer(h.server.post("/api/attendance/visitors"), &guard.token)
        .json(&check_in)
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = bearer(
        h.server.patch(&format!("/api/gate-passes/{}/status", pass_id)),
        &guard.token,
    )
    .json(&json!({"status": "Approved"}))
    .await;
    assert_eq!(res.status_code(), StatusCode::OK);

    let res = bearer(h.server.post("/api/attendance/visitors"), &guard.token)
        .json(&check_in)
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    let entry: Value = res.json();
    assert_eq!(entry["gate_pass_id"], pass_id);
}

#[tokio::test]
async fn test_chat_stream_and_presence() {
    let h = harness().await;
    let (admin, resident, _guard) = h.society().await;

    let res = h.server.get("/api/chat/stream").await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    let res = h.server.get("/api/chat/stream?token=not.a.token").await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

    // EventSource clients pass the token in the query string
    let sse = stream_events(
        State(h.state.clone()),
        None,
        Query(StreamQuery {
            token: Some(resident.token.clone()),
        }),
    )
    .await
    .unwrap();
    let mut events = sse.into_response().into_body().into_data_stream();

    let online: Value = bearer(h.server.get("/api/chat/presence"), &admin.token)
        .await
        .json();
    assert_eq!(online["online"], json!([resident.id]));

    let res = bearer(h.server.post("/api/chat/messages"), &admin.token)
        .json(&json!({"content": "Water supply off at noon"}))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);

    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), events.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("event: message"));
    assert!(text.contains("Water supply off at noon"));

    drop(events);
    let online: Value = bearer(h.server.get("/api/chat/presence"), &admin.token)
        .await
        .json();
    assert_eq!(online["online"], json!([]));
}
