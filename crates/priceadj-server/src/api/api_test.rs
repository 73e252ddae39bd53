use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use tower::ServiceExt;

use priceadj_core::{
    date_as_instant, parse_directory, AdjustmentSession, FranchiseeAdjustmentRecord,
    FranchiseeRecord, ServiceAdjustmentRow, SessionStatus,
};
use priceadj_pipeline::{
    Fault, FixedClock, MemoryStore, PipelineContext, PipelineSettings, RecordingNotifier,
};

use super::*;

struct Harness {
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
    app: Router,
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let directory = parse_directory(
        r"
sender: accounts@example.com.au
report_recipients: [ops@example.com.au]
maintainers: [dev@example.com.au]
opt_out_recipients: [franchise@example.com.au]
opt_out_bcc: [audit@example.com.au]
notice_template:
  subject: Upcoming price adjustment
  body: 'Effective &{dateEffective}: &{serviceTable}'
",
    )
    .unwrap();

    let pipeline = PipelineContext {
        store: store.clone(),
        notifier: notifier.clone(),
        clock: Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 7, 2, 1, 0, 0).unwrap(),
        )),
        directory: Arc::new(directory),
        settings: PipelineSettings::default(),
    };
    let state = AppState {
        pipeline,
        ledger: store.clone(),
    };
    let auth = AuthState::from_keys("", true).expect("auth");
    let app = build_app(state, auth, default_rate_limit_state());

    Harness {
        store,
        notifier,
        app,
    }
}

fn session(id: i64, status: SessionStatus) -> AdjustmentSession {
    AdjustmentSession {
        id,
        effective_at: date_as_instant(d(2024, 9, 1)),
        opening_date: d(2024, 6, 1),
        deadline: d(2024, 8, 1),
        status,
        notified_at: None,
        completed_at: None,
        pricing_rules: vec![],
        created_at: Utc::now(),
    }
}

fn adjustment_row(confirmed: bool) -> ServiceAdjustmentRow {
    ServiceAdjustmentRow {
        service_id: 30,
        service_type_id: 1,
        service_name: "Office clean".to_string(),
        current_price: Decimal::new(10_000, 2),
        adjustment: Decimal::new(500, 2),
        confirmed,
        customer_id: 20,
        customer_entity_id: "C-20".to_string(),
        customer_name: "Acme Pty Ltd".to_string(),
        franchisee_id: 10,
        franchisee_name: "Northside Cleaning".to_string(),
        national_account: false,
    }
}

fn seed_franchisee_record(store: &MemoryStore, confirmed: bool) {
    store.insert_session(session(1, SessionStatus::Open));
    store.insert_franchisee(FranchiseeRecord {
        id: 10,
        company_name: "Northside Cleaning".to_string(),
        state: Some("NSW".to_string()),
        active: true,
    });
    store.insert_franchisee_record(FranchiseeAdjustmentRecord {
        id: 100,
        session_id: 1,
        franchisee_id: 10,
        rows: vec![adjustment_row(confirmed), adjustment_row(confirmed)],
        opt_out_reason: None,
        pricing_rules: vec![],
        updated_at: Utc::now(),
    });
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json parse")
    };
    (status, json)
}

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 50);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 200);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn api_error_validation_error_maps_to_bad_request() {
    let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn internal_errors_carry_their_detail_as_an_extension() {
    let response =
        ApiError::internal("req-1", "store operation failed", "pool timed out".to_string())
            .into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let failure = response
        .extensions()
        .get::<InternalFailure>()
        .expect("failure extension");
    assert_eq!(failure.0, "pool timed out");
}

#[test]
fn store_errors_map_to_envelope_codes() {
    let not_found = map_store_error(
        "r".to_string(),
        &StoreError::NotFound {
            entity: "session",
            id: 9,
        },
    );
    assert_eq!(not_found.error.code, "not_found");

    let conflict = map_store_error("r".to_string(), &StoreError::Conflict("open".to_string()));
    assert_eq!(conflict.error.code, "conflict");

    let backend = map_store_error("r".to_string(), &StoreError::Backend("down".to_string()));
    assert_eq!(backend.error.code, "internal_error");
    assert_eq!(backend.detail.as_deref(), Some("storage backend error: down"));
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, json) = send(&h.app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "ok");
    assert!(json["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn created_session_becomes_current() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/sessions",
        Some(serde_json::json!({
            "effective_date": "2024-09-01",
            "opening_date": "2024-06-01",
            "deadline": "2024-08-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json["data"]["id"].as_i64().expect("session id");
    assert_eq!(json["data"]["status"], "open");

    let (status, json) = send(&h.app, "GET", "/api/v1/sessions/current", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"].as_i64(), Some(id));

    let (status, json) = send(
        &h.app,
        "GET",
        "/api/v1/sessions?effective_date=2024-09-01",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn session_dates_out_of_order_are_rejected() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/sessions",
        Some(serde_json::json!({
            "effective_date": "2024-09-01",
            "opening_date": "2024-08-15",
            "deadline": "2024-08-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
    assert!(h.notifier.alerts().is_empty());
}

#[tokio::test]
async fn second_open_session_conflicts() {
    let h = harness();
    h.store.insert_session(session(1, SessionStatus::Notified));

    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/sessions",
        Some(serde_json::json!({
            "effective_date": "2025-09-01",
            "opening_date": "2025-06-01",
            "deadline": "2025-08-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "conflict");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let h = harness();
    let (status, json) = send(&h.app, "GET", "/api/v1/sessions/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn completed_session_rules_cannot_change() {
    let h = harness();
    h.store.insert_session(session(1, SessionStatus::Completed));

    let (status, _) = send(
        &h.app,
        "PUT",
        "/api/v1/sessions/1/rules",
        Some(serde_json::json!({ "pricing_rules": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn franchisee_statuses_list_every_reportable_franchisee() {
    let h = harness();
    seed_franchisee_record(&h.store, true);
    h.store.insert_franchisee(FranchiseeRecord {
        id: 11,
        company_name: "Old Southside".to_string(),
        state: None,
        active: true,
    });

    let (status, json) = send(&h.app, "GET", "/api/v1/sessions/1/franchisees", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = json["data"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["franchisee_id"], 10);
}

#[tokio::test]
async fn confirm_all_confirms_every_row() {
    let h = harness();
    seed_franchisee_record(&h.store, false);

    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/sessions/1/franchisees/10/confirm-all",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = json["data"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["confirmed"] == true));
}

#[tokio::test]
async fn opt_out_unconfirms_rows_and_mails_administrators() {
    let h = harness();
    seed_franchisee_record(&h.store, true);

    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/sessions/1/franchisees/10/opt-out",
        Some(serde_json::json!({ "reason": "Customers already increased in May" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["data"]["opt_out_reason"],
        "Customers already increased in May"
    );
    let rows = json["data"]["rows"].as_array().expect("rows");
    assert!(rows.iter().all(|r| r["confirmed"] == false));

    let mails = h.notifier.mails();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].recipients, vec!["franchise@example.com.au"]);
    assert_eq!(mails[0].bcc, vec!["audit@example.com.au"]);
    assert_eq!(
        mails[0].subject,
        "Northside Cleaning opted out of Price Increase"
    );
    assert!(mails[0].body.contains("effective date on 1/9/2024"));
    assert!(mails[0].body.ends_with("Customers already increased in May"));

    let (status, _) = send(
        &h.app,
        "PUT",
        "/api/v1/sessions/1/franchisees/10",
        Some(serde_json::json!({ "rows": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = send(
        &h.app,
        "POST",
        "/api/v1/sessions/1/franchisees/10/reinstate",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["opt_out_reason"].is_null());
}

#[tokio::test]
async fn blank_opt_out_reason_is_rejected() {
    let h = harness();
    seed_franchisee_record(&h.store, true);

    let (status, _) = send(
        &h.app,
        "POST",
        "/api/v1/sessions/1/franchisees/10/opt-out",
        Some(serde_json::json!({ "reason": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.notifier.mails().is_empty());
}

#[tokio::test]
async fn triggered_run_is_recorded() {
    let h = harness();

    let (status, json) = send(&h.app, "POST", "/api/v1/runs?date=2024-07-02", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = json["data"]["run_id"].as_i64().expect("run id");

    let (status, json) = send(&h.app, "GET", "/api/v1/runs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));

    let (status, json) = send(&h.app, "GET", &format!("/api/v1/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "succeeded");
    assert_eq!(json["data"]["trigger_source"], "api");
    assert!(json["data"]["items"].is_array());
}

#[tokio::test]
async fn internal_errors_alert_maintainers() {
    let h = harness();
    seed_franchisee_record(&h.store, true);
    h.store
        .inject_fault(Fault::ListFranchiseeRecords { session_id: 1 });

    let (status, json) = send(&h.app, "GET", "/api/v1/sessions/1/franchisees", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "internal_error");
    assert!(json["error"]["message"]
        .as_str()
        .is_some_and(|m| !m.contains("injected fault")));

    let alerts = h.notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].recipients, vec!["dev@example.com.au"]);
    assert!(alerts[0].body.contains("route: GET /api/v1/sessions/1/franchisees"));
    assert!(alerts[0].body.contains("injected fault"));
}
