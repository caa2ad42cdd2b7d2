use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Value};
use tower::ServiceExt;

use courtbook::config::AppConfig;
use courtbook::db::{self, queries};
use courtbook::handlers;
use courtbook::models::{Booking, BookingStatus, Court, PaymentStatus, SlotConfig};
use courtbook::services::payments::sandbox::SandboxGateway;
use courtbook::services::payments::{OrderRequest, PaymentGateway};
use courtbook::state::AppState;

const SLOT: &str = "court1-2099-08-12-08:00";

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        payment_provider: "sandbox".to_string(),
        razorpay_key_id: "".to_string(),
        razorpay_key_secret: "".to_string(),
        razorpay_webhook_secret: "".to_string(),
        currency: "INR".to_string(),
        cancellation_window_minutes: 120,
        default_slot_minutes: 60,
        venue_utc_offset_minutes: 0,
    }
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    gateway: Arc<SandboxGateway>,
}

fn harness() -> Harness {
    let conn = db::init_db(":memory:").unwrap();
    queries::insert_venue(&conn, "v1", "Riverside").unwrap();
    queries::insert_court(
        &conn,
        &Court {
            id: "court1".to_string(),
            venue_id: "v1".to_string(),
            venue_name: String::new(),
            name: "Centre Court".to_string(),
            price_per_hour: 50_000,
            capacity: 10,
            is_active: true,
            operating_hours: None,
            slot_config: Some(
                SlotConfig::from_json(r#"{"start_time":"06:00","end_time":"10:00","excluded_ranges":[{"name":"coaching","start":"07:00","end":"08:00"}]}"#)
                    .unwrap(),
            ),
        },
    )
    .unwrap();

    let expires = NaiveDateTime::parse_from_str("2100-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    for user in ["alice", "bob", "carol"] {
        queries::insert_session(&conn, &format!("tok-{user}"), user, &expires).unwrap();
    }

    let gateway = Arc::new(SandboxGateway::new("sandbox_secret"));
    let state = Arc::new(AppState::new(conn, test_config(), gateway.clone()));
    Harness {
        app: handlers::router(state.clone()),
        state,
        gateway,
    }
}

impl Harness {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get(&self, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().uri(uri);
        if let Some(user) = user {
            req = req.header("Authorization", format!("Bearer tok-{user}"));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, user: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(user) = user {
            req = req.header("Authorization", format!("Bearer tok-{user}"));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn intent(&self, user: &str, slot_ref: &str, players: i64) -> (StatusCode, Value) {
        self.post(
            "/api/bookings/intent",
            Some(user),
            json!({"slot_ref": slot_ref, "court_id": "court1", "player_count": players}),
        )
        .await
    }

    async fn check(&self, user: &str, players: i64) -> Value {
        let (status, body) = self
            .post(
                "/api/bookings/check",
                Some(user),
                json!({"slot_ref": SLOT, "court_id": "court1", "player_count": players}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    /// Pays an opened order through the sandbox and submits the proof.
    async fn pay_and_verify(&self, user: &str, order_id: &str) -> (StatusCode, Value) {
        let proof = self.gateway.pay(order_id, "upi").unwrap();
        self.post(
            "/api/payments/verify",
            Some(user),
            serde_json::to_value(&proof).unwrap(),
        )
        .await
    }

    async fn book(&self, user: &str, players: i64) -> Value {
        let (status, intent) = self.intent(user, SLOT, players).await;
        assert_eq!(status, StatusCode::OK, "intent failed: {intent}");
        let (status, body) = self
            .pay_and_verify(user, intent["order_id"].as_str().unwrap())
            .await;
        assert_eq!(status, StatusCode::OK, "verify failed: {body}");
        body["booking"].clone()
    }

    fn seed_booking(&self, id: &str, user: &str, start: NaiveDateTime) {
        let db = self.state.db.lock().unwrap();
        queries::insert_booking(
            &db,
            &Booking {
                id: id.to_string(),
                reference: format!("BK-{id}"),
                user_id: user.to_string(),
                court_id: "court1".to_string(),
                slot_id: None,
                slot_ref: format!("court1-{}", start.format("%Y-%m-%d-%H:%M")),
                booking_date: start.date(),
                start_at: start,
                end_at: start + Duration::hours(1),
                duration_minutes: 60,
                player_count: 2,
                total_price: 100_000,
                currency: "INR".to_string(),
                notes: None,
                status: BookingStatus::Confirmed,
                payment_status: PaymentStatus::Paid,
                payment: None,
                cancellation_reason: None,
                cancelled_at: None,
                created_at: start - Duration::days(1),
                updated_at: start - Duration::days(1),
            },
        )
        .unwrap();
    }
}

// ── Health & Auth ──

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = h.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_booking_routes_require_session() {
    let h = harness();

    let (status, body) = h.get("/api/bookings", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");

    let (status, _) = h.get("/api/bookings", Some("mallory")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .post("/api/bookings/intent", None, json!({"slot_ref": SLOT, "player_count": 1}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ── Admission & Commit ──

#[tokio::test]
async fn test_capacity_fills_up_and_reports_headroom() {
    let h = harness();

    let booking = h.book("alice", 6).await;
    assert_eq!(booking["status"], "CONFIRMED");
    assert_eq!(booking["payment_status"], "PAID");
    assert_eq!(booking["total_price"], 300_000);

    let check = h.check("bob", 5).await;
    assert_eq!(check["admitted"], false);
    assert_eq!(check["headroom"], 4);
    assert_eq!(check["rejection"]["code"], "capacity_exceeded");

    let (status, body) = h.intent("bob", SLOT, 5).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "capacity_exceeded");
    assert_eq!(body["headroom"], 4);

    h.book("bob", 4).await;

    let check = h.check("carol", 1).await;
    assert_eq!(check["admitted"], false);
    assert_eq!(check["headroom"], 0);
}

#[tokio::test]
async fn test_same_user_cannot_book_slot_twice() {
    let h = harness();
    h.book("alice", 2).await;

    let (status, body) = h.intent("alice", SLOT, 1).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "duplicate_booking");
    assert!(body["booking_id"].is_string());
}

#[tokio::test]
async fn test_intent_opens_order_without_holding_capacity() {
    let h = harness();

    let (status, intent) = h.intent("alice", SLOT, 6).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intent["amount"], 300_000);
    assert_eq!(intent["currency"], "INR");
    assert_eq!(intent["key_id"], "sandbox_key");
    assert!(intent["receipt"].as_str().unwrap().len() <= 40);

    // An abandoned checkout leaves the slot untouched.
    let check = h.check("bob", 10).await;
    assert_eq!(check["admitted"], true);
}

#[tokio::test]
async fn test_intent_rejects_started_slot_and_long_notes() {
    let h = harness();

    let (status, body) = h.intent("alice", "court1-2001-01-01-08:00", 2).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = h
        .post(
            "/api/bookings/intent",
            Some("alice"),
            json!({"slot_ref": SLOT, "court_id": "court1", "player_count": 2, "notes": "x".repeat(257)}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _) = h
        .post(
            "/api/bookings/intent",
            Some("alice"),
            json!({"slot_ref": SLOT, "court_id": "court1", "player_count": 2, "notes": "x".repeat(256)}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_lost_race_after_payment_is_refund_pending() {
    let h = harness();

    let (_, first) = h.intent("alice", SLOT, 6).await;
    let (_, second) = h.intent("bob", SLOT, 5).await;

    let (status, _) = h.pay_and_verify("alice", first["order_id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.pay_and_verify("bob", second["order_id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "refund_pending");
    assert_eq!(body["reason_code"], "capacity_exceeded");
    assert_eq!(body["refund"], "pending");

    let req = Request::builder()
        .uri("/api/admin/events")
        .header("Authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap();
    let (status, events) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["booking_confirmed", "refund_required"]);
}

#[tokio::test]
async fn test_verify_rejects_bad_signature_and_foreign_user() {
    let h = harness();
    let (_, intent) = h.intent("alice", SLOT, 2).await;
    let order_id = intent["order_id"].as_str().unwrap();
    let proof = h.gateway.pay(order_id, "card").unwrap();

    let (status, body) = h
        .post(
            "/api/payments/verify",
            Some("alice"),
            json!({"order_id": order_id, "payment_id": proof.payment_id, "signature": "deadbeef"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_signature");

    let (status, body) = h
        .post("/api/payments/verify", Some("bob"), serde_json::to_value(&proof).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "access_denied");

    let (status, _) = h.get("/api/bookings", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, list) = h.get("/api/bookings", Some("alice")).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_verify_twice_returns_same_booking() {
    let h = harness();
    let (_, intent) = h.intent("alice", SLOT, 3).await;
    let proof = h.gateway.pay(intent["order_id"].as_str().unwrap(), "upi").unwrap();
    let body = serde_json::to_value(&proof).unwrap();

    let (_, first) = h.post("/api/payments/verify", Some("alice"), body.clone()).await;
    let (status, second) = h.post("/api/payments/verify", Some("alice"), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["replayed"], false);
    assert_eq!(second["replayed"], true);
    assert_eq!(first["booking"]["id"], second["booking"]["id"]);

    let check = h.check("bob", 7).await;
    assert_eq!(check["admitted"], true);
    assert_eq!(check["headroom"], 7);
}

// ── Webhook ──

async fn deliver_webhook(h: &Harness, payload: &Value) -> (StatusCode, Value) {
    let body = payload.to_string();
    let signature = h.gateway.sign_webhook(body.as_bytes());
    let req = Request::builder()
        .method("POST")
        .uri("/webhook/payments")
        .header("Content-Type", "application/json")
        .header("X-Razorpay-Signature", signature)
        .body(Body::from(body))
        .unwrap();
    h.send(req).await
}

#[tokio::test]
async fn test_webhook_redelivery_is_idempotent() {
    let h = harness();
    let (_, intent) = h.intent("alice", SLOT, 4).await;
    let order_id = intent["order_id"].as_str().unwrap();
    let proof = h.gateway.pay(order_id, "upi").unwrap();

    let payload = json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {"id": proof.payment_id, "order_id": order_id, "status": "captured"}}}
    });

    let (status, first) = deliver_webhook(&h, &payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "committed");

    let (status, second) = deliver_webhook(&h, &payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "duplicate");
    assert_eq!(first["booking_id"], second["booking_id"]);

    let check = h.check("bob", 6).await;
    assert_eq!(check["headroom"], 6);

    // The client's own verify after the webhook sees the same booking.
    let (status, verified) = h
        .post("/api/payments/verify", Some("alice"), serde_json::to_value(&proof).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["booking"]["id"], first["booking_id"]);
}

#[tokio::test]
async fn test_webhook_signature_and_ignored_events() {
    let h = harness();

    let req = Request::builder()
        .method("POST")
        .uri("/webhook/payments")
        .header("X-Razorpay-Signature", "00")
        .body(Body::from(r#"{"event":"payment.captured"}"#))
        .unwrap();
    let (status, _) = h.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = deliver_webhook(&h, &json!({"event": "order.created"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");

    // A capture for something else sold on the same account.
    let mut notes = std::collections::BTreeMap::new();
    notes.insert("product".to_string(), "gift card".to_string());
    let order = h
        .gateway
        .create_order(&OrderRequest {
            amount: 10_000,
            currency: "INR".to_string(),
            receipt: "rcpt_gift_1".to_string(),
            notes,
        })
        .await
        .unwrap();
    let proof = h.gateway.pay(&order.id, "card").unwrap();
    let payload = json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {"id": proof.payment_id, "order_id": order.id, "status": "captured"}}}
    });
    let (status, body) = deliver_webhook(&h, &payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

// ── Cancellation ──

#[tokio::test]
async fn test_cancellation_window() {
    let h = harness();
    let now = h.state.config.local_now();
    h.seed_booking("soon", "alice", now + Duration::minutes(119));
    h.seed_booking("later", "alice", now + Duration::minutes(121));

    let (status, body) = h.post("/api/bookings/soon/cancel", Some("alice"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "cancellation_window_closed");
    assert!(body["closed_at"].is_string());

    let (status, body) = h
        .post("/api/bookings/later/cancel", Some("alice"), json!({"reason": "injury"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "CANCELLED");
    assert_eq!(body["booking"]["payment_status"], "REFUNDED");
    assert_eq!(body["booking"]["cancellation_reason"], "injury");

    let (status, body) = h.post("/api/bookings/later/cancel", Some("alice"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_cancelled");
}

#[tokio::test]
async fn test_cancel_restores_capacity_and_guards_ownership() {
    let h = harness();
    let booking = h.book("alice", 6).await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = h.post(&format!("/api/bookings/{id}/cancel"), Some("bob"), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.post("/api/bookings/nope/cancel", Some("alice"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/bookings/{id}/cancel"))
        .header("Authorization", "Bearer tok-alice")
        .body(Body::empty())
        .unwrap();
    let (status, _) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);

    let check = h.check("bob", 10).await;
    assert_eq!(check["admitted"], true);
}

// ── Lookup ──

#[tokio::test]
async fn test_list_completes_elapsed_bookings() {
    let h = harness();
    let now = h.state.config.local_now();
    h.seed_booking("past", "alice", now - Duration::hours(3));
    h.seed_booking("future", "alice", now + Duration::days(2));
    h.seed_booking("other", "bob", now - Duration::hours(3));

    let (status, list) = h.get("/api/bookings", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    let status_of = |id: &str| {
        list.iter()
            .find(|b| b["id"] == id)
            .map(|b| b["status"].as_str().unwrap().to_string())
    };
    assert_eq!(status_of("past").as_deref(), Some("COMPLETED"));
    assert_eq!(status_of("future").as_deref(), Some("CONFIRMED"));

    let (status, body) = h.post("/api/bookings/past/cancel", Some("alice"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "immutable");
}

#[tokio::test]
async fn test_get_booking_is_owner_only() {
    let h = harness();
    let booking = h.book("alice", 2).await;
    let id = booking["id"].as_str().unwrap();

    let (status, body) = h.get(&format!("/api/bookings/{id}"), Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reference"], booking["reference"]);

    let (status, _) = h.get(&format!("/api/bookings/{id}"), Some("bob")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.get("/api/bookings/missing", Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_calendar_export() {
    let h = harness();
    let booking = h.book("alice", 2).await;
    let id = booking["id"].as_str().unwrap();

    let res = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/bookings/{id}/calendar.ics"))
                .header("Authorization", "Bearer tok-alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "text/calendar; charset=utf-8"
    );
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let ics = String::from_utf8(body.to_vec()).unwrap();
    assert!(ics.contains("DTSTART:20990812T080000"));
    assert!(ics.contains("SUMMARY:Centre Court at Riverside"));
}

#[tokio::test]
async fn test_slot_listing_shows_headroom() {
    let h = harness();
    h.book("alice", 6).await;

    let (status, body) = h.get("/api/courts/court1/slots?date=2099-08-12", None).await;
    assert_eq!(status, StatusCode::OK);
    let slots = body["slots"].as_array().unwrap();
    let refs: Vec<&str> = slots.iter().map(|s| s["slot_ref"].as_str().unwrap()).collect();
    assert_eq!(
        refs,
        vec![
            "court1-2099-08-12-06:00",
            "court1-2099-08-12-08:00",
            "court1-2099-08-12-09:00",
        ]
    );
    assert_eq!(slots[1]["headroom"], 4);
    assert_eq!(slots[0]["headroom"], 10);

    let (status, _) = h.get("/api/courts/court1/slots?date=12-08-2099", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = h.get("/api/courts/ghost/slots?date=2099-08-12", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_slot_listing_clamps_over_capacity_interval() {
    let h = harness();
    let start = NaiveDateTime::parse_from_str("2099-08-12 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    // six bookings of two players on a court of ten
    for i in 0..6 {
        h.seed_booking(&format!("over{i}"), &format!("user{i}"), start);
    }

    let (status, body) = h.get("/api/courts/court1/slots?date=2099-08-12", None).await;
    assert_eq!(status, StatusCode::OK);
    let slot = &body["slots"][1];
    assert_eq!(slot["slot_ref"], SLOT);
    assert_eq!(slot["booked_players"], 12);
    assert_eq!(slot["headroom"], 0);
}

#[tokio::test]
async fn test_admin_events_require_token() {
    let h = harness();
    let (status, body) = h.get("/api/admin/events", Some("alice")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}
