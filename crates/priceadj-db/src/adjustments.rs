//! Database operations for `franchisee_adjustments`.
//!
//! The service rows are stored as JSONB but cross this boundary as text so
//! that [`AdjustmentData`] owns the payload format.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use priceadj_core::{
    AdjustmentData, FranchiseeAdjustmentRecord, PricingRule, ServiceAdjustmentRow,
};

use crate::DbError;

/// A row from the `franchisee_adjustments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FranchiseeAdjustmentRow {
    pub id: i64,
    pub session_id: i64,
    pub franchisee_id: i64,
    pub adjustment_data: String,
    pub opt_out_reason: Option<String>,
    pub pricing_rules: Json<Vec<PricingRule>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FranchiseeAdjustmentRow> for FranchiseeAdjustmentRecord {
    type Error = DbError;

    fn try_from(row: FranchiseeAdjustmentRow) -> Result<Self, Self::Error> {
        Ok(FranchiseeAdjustmentRecord {
            id: row.id,
            session_id: row.session_id,
            franchisee_id: row.franchisee_id,
            rows: AdjustmentData::decode(&row.adjustment_data)?.0,
            opt_out_reason: row.opt_out_reason,
            pricing_rules: row.pricing_rules.0,
            updated_at: row.updated_at,
        })
    }
}

const ADJUSTMENT_COLUMNS: &str = "id, session_id, franchisee_id, \
                                  adjustment_data::text AS adjustment_data, \
                                  opt_out_reason, pricing_rules, updated_at";

fn foreign_key_to_not_found(err: sqlx::Error, session_id: i64) -> DbError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_foreign_key_violation() {
            return DbError::NotFound {
                entity: "session or franchisee",
                id: session_id,
            };
        }
    }
    DbError::Sqlx(err)
}

/// Records of a session ordered by franchisee. Opted-out records are left out
/// unless `include_opted_out` is set.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_franchisee_adjustments(
    pool: &PgPool,
    session_id: i64,
    include_opted_out: bool,
) -> Result<Vec<FranchiseeAdjustmentRow>, DbError> {
    let rows = sqlx::query_as::<_, FranchiseeAdjustmentRow>(&format!(
        "SELECT {ADJUSTMENT_COLUMNS} \
         FROM franchisee_adjustments \
         WHERE session_id = $1 \
           AND ($2 OR opt_out_reason IS NULL OR BTRIM(opt_out_reason) = '') \
         ORDER BY franchisee_id"
    ))
    .bind(session_id)
    .bind(include_opted_out)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_franchisee_adjustment(
    pool: &PgPool,
    session_id: i64,
    franchisee_id: i64,
) -> Result<Option<FranchiseeAdjustmentRow>, DbError> {
    let row = sqlx::query_as::<_, FranchiseeAdjustmentRow>(&format!(
        "SELECT {ADJUSTMENT_COLUMNS} \
         FROM franchisee_adjustments \
         WHERE session_id = $1 AND franchisee_id = $2"
    ))
    .bind(session_id)
    .bind(franchisee_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Upsert the sheet and rules of a (session, franchisee) record, leaving any
/// opt-out reason untouched.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the session or franchisee does not exist
/// and [`DbError::Core`] if the rows cannot be encoded.
pub async fn save_franchisee_adjustment(
    pool: &PgPool,
    session_id: i64,
    franchisee_id: i64,
    rows: &[ServiceAdjustmentRow],
    pricing_rules: &[PricingRule],
) -> Result<FranchiseeAdjustmentRow, DbError> {
    let payload = AdjustmentData(rows.to_vec()).encode()?;

    sqlx::query_as::<_, FranchiseeAdjustmentRow>(&format!(
        "INSERT INTO franchisee_adjustments \
             (session_id, franchisee_id, adjustment_data, pricing_rules) \
         VALUES ($1, $2, $3::jsonb, $4) \
         ON CONFLICT (session_id, franchisee_id) DO UPDATE \
         SET adjustment_data = EXCLUDED.adjustment_data, \
             pricing_rules = EXCLUDED.pricing_rules, \
             updated_at = NOW() \
         RETURNING {ADJUSTMENT_COLUMNS}"
    ))
    .bind(session_id)
    .bind(franchisee_id)
    .bind(payload)
    .bind(Json(pricing_rules))
    .fetch_one(pool)
    .await
    .map_err(|e| foreign_key_to_not_found(e, session_id))
}

/// Set or clear the opt-out reason, creating an empty record when the
/// franchisee has none yet.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the session or franchisee does not exist.
pub async fn set_opt_out_reason(
    pool: &PgPool,
    session_id: i64,
    franchisee_id: i64,
    reason: Option<&str>,
) -> Result<FranchiseeAdjustmentRow, DbError> {
    sqlx::query_as::<_, FranchiseeAdjustmentRow>(&format!(
        "INSERT INTO franchisee_adjustments \
             (session_id, franchisee_id, adjustment_data, pricing_rules, opt_out_reason) \
         VALUES ($1, $2, '[]'::jsonb, '[]'::jsonb, $3) \
         ON CONFLICT (session_id, franchisee_id) DO UPDATE \
         SET opt_out_reason = EXCLUDED.opt_out_reason, \
             updated_at = NOW() \
         RETURNING {ADJUSTMENT_COLUMNS}"
    ))
    .bind(session_id)
    .bind(franchisee_id)
    .bind(reason)
    .fetch_one(pool)
    .await
    .map_err(|e| foreign_key_to_not_found(e, session_id))
}
