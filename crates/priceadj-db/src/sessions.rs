//! Database operations for `adjustment_sessions`.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use priceadj_core::{AdjustmentSession, NewSession, PricingRule, SessionStatus};
use priceadj_pipeline::SessionFilter;

use crate::{conflict_on_unique, DbError};

/// A row from the `adjustment_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub effective_at: DateTime<Utc>,
    pub opening_date: NaiveDate,
    pub deadline: NaiveDate,
    pub status: String,
    pub notified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pricing_rules: Json<Vec<PricingRule>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for AdjustmentSession {
    type Error = DbError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(AdjustmentSession {
            id: row.id,
            effective_at: row.effective_at,
            opening_date: row.opening_date,
            deadline: row.deadline,
            status: row.status.parse()?,
            notified_at: row.notified_at,
            completed_at: row.completed_at,
            pricing_rules: row.pricing_rules.0,
            created_at: row.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, effective_at, opening_date, deadline, status, \
                               notified_at, completed_at, pricing_rules, created_at";

/// Sessions matching `filter`, oldest effective date first.
///
/// The effective date is compared after the same +12h shift the domain
/// applies when reading it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sessions(
    pool: &PgPool,
    filter: &SessionFilter,
) -> Result<Vec<SessionRow>, DbError> {
    let rows = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} \
         FROM adjustment_sessions \
         WHERE ($1::date IS NULL \
                OR ((effective_at AT TIME ZONE 'UTC') + INTERVAL '12 hours')::date = $1) \
           AND ($2::text IS NULL OR status = $2) \
           AND ($3::date IS NULL OR (opening_date <= $3 AND $3 <= deadline)) \
           AND (NOT $4 OR status <> 'completed') \
         ORDER BY effective_at, id"
    ))
    .bind(filter.effective_date)
    .bind(filter.status.map(SessionStatus::as_str))
    .bind(filter.accepting_input_on)
    .bind(filter.exclude_completed)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no session has the given `id`.
pub async fn get_session(pool: &PgPool, id: i64) -> Result<SessionRow, DbError> {
    sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM adjustment_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound {
        entity: "session",
        id,
    })
}

/// The session that is not completed yet, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_current_session(pool: &PgPool) -> Result<Option<SessionRow>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} \
         FROM adjustment_sessions \
         WHERE status <> 'completed' \
         ORDER BY id DESC \
         LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert a new `open` session.
///
/// # Errors
///
/// Returns [`DbError::Core`] if the dates are out of order and
/// [`DbError::Conflict`] while another session is not completed.
pub async fn create_session(pool: &PgPool, input: &NewSession) -> Result<SessionRow, DbError> {
    input.validate()?;

    sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO adjustment_sessions (effective_at, opening_date, deadline, status, pricing_rules) \
         VALUES ($1, $2, $3, 'open', $4) \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(input.effective_at())
    .bind(input.opening_date)
    .bind(input.deadline)
    .bind(Json(&input.pricing_rules))
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, || "another session is not completed yet".to_string()))
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no session has the given `id`.
pub async fn update_session_rules(
    pool: &PgPool,
    id: i64,
    rules: &[PricingRule],
) -> Result<SessionRow, DbError> {
    sqlx::query_as::<_, SessionRow>(&format!(
        "UPDATE adjustment_sessions \
         SET pricing_rules = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(id)
    .bind(Json(rules))
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound {
        entity: "session",
        id,
    })
}

async fn transition_session(
    pool: &PgPool,
    id: i64,
    from: SessionStatus,
    to: SessionStatus,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    from.transition(to)?;

    let stamp_column = match to {
        SessionStatus::Notified => "notified_at",
        SessionStatus::Completed => "completed_at",
        SessionStatus::Open => "updated_at",
    };

    let result = sqlx::query(&format!(
        "UPDATE adjustment_sessions \
         SET status = $2, {stamp_column} = $3, updated_at = NOW() \
         WHERE id = $1 AND status = $4"
    ))
    .bind(id)
    .bind(to.as_str())
    .bind(at)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish a missing session from one in the wrong state.
        get_session(pool, id).await?;
        return Err(DbError::InvalidTransition {
            entity: "session",
            id,
            expected_status: from.as_str().to_string(),
        });
    }

    Ok(())
}

/// `open -> notified`, stamping `notified_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] unless the session is `open`.
pub async fn mark_session_notified(
    pool: &PgPool,
    id: i64,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    transition_session(pool, id, SessionStatus::Open, SessionStatus::Notified, at).await
}

/// `notified -> completed`, stamping `completed_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] unless the session is `notified`.
pub async fn mark_session_completed(
    pool: &PgPool,
    id: i64,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    transition_session(pool, id, SessionStatus::Notified, SessionStatus::Completed, at).await
}
