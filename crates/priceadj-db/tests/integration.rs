//! Offline unit tests for priceadj-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use priceadj_core::{
    AdjustmentSession, AppConfig, Environment, FranchiseeAdjustmentRecord, SessionStatus,
};
use priceadj_db::{FranchiseeAdjustmentRow, PoolConfig, SessionRow};
use sqlx::types::Json;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        directory_path: PathBuf::from("./config/directory.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        run_cron: "0 0 20 * * *".to_string(),
        max_concurrent_items: 4,
        notify_lead_days: 14,
        financial_cutoff_day: 15,
        mail_relay_url: None,
        mail_relay_token: None,
        mail_timeout_secs: 30,
        mail_max_retries: 3,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn session_row_converts_to_domain_session() {
    let row = SessionRow {
        id: 1,
        effective_at: Utc.with_ymd_and_hms(2024, 7, 14, 14, 0, 0).unwrap(),
        opening_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        deadline: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        status: "notified".to_string(),
        notified_at: None,
        completed_at: None,
        pricing_rules: Json(vec![]),
        created_at: Utc::now(),
    };

    let session = AdjustmentSession::try_from(row).unwrap();
    assert_eq!(session.status, SessionStatus::Notified);
    // 14:00 UTC shifted by twelve hours lands on the next calendar day.
    assert_eq!(
        session.effective_date(),
        NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
    );
}

#[test]
fn session_row_with_unknown_status_is_rejected() {
    let row = SessionRow {
        id: 1,
        effective_at: Utc::now(),
        opening_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        deadline: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        status: "archived".to_string(),
        notified_at: None,
        completed_at: None,
        pricing_rules: Json(vec![]),
        created_at: Utc::now(),
    };

    assert!(AdjustmentSession::try_from(row).is_err());
}

#[test]
fn adjustment_row_decodes_empty_and_rejects_malformed_payloads() {
    let row = |payload: &str| FranchiseeAdjustmentRow {
        id: 1,
        session_id: 1,
        franchisee_id: 3,
        adjustment_data: payload.to_string(),
        opt_out_reason: None,
        pricing_rules: Json(vec![]),
        updated_at: Utc::now(),
    };

    let empty = FranchiseeAdjustmentRecord::try_from(row("[]")).unwrap();
    assert!(empty.rows.is_empty());

    assert!(FranchiseeAdjustmentRecord::try_from(row("[{\"service_id\": 1}]")).is_err());
}
