//! Database operations for `adjustment_runs` and `adjustment_run_items`.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use priceadj_pipeline::{RunItem, RunRecord};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `adjustment_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    pub status: String,
    pub business_date: NaiveDate,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_processed: i32,
    pub items_failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = priceadj_pipeline::StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(RunRecord {
            id: row.id,
            public_id: row.public_id,
            trigger_source: row.trigger_source,
            status: row.status.parse()?,
            business_date: row.business_date,
            started_at: row.started_at,
            completed_at: row.completed_at,
            items_processed: row.items_processed,
            items_failed: row.items_failed,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

/// A row from the `adjustment_run_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunItemRow {
    pub id: i64,
    pub run_id: i64,
    pub item_key: String,
    pub stage: String,
    pub outcome: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RunItemRow> for RunItem {
    type Error = priceadj_pipeline::StoreError;

    fn try_from(row: RunItemRow) -> Result<Self, Self::Error> {
        Ok(RunItem {
            key: row.item_key,
            stage: row.stage,
            outcome: row.outcome.parse()?,
            message: row.message,
        })
    }
}

const RUN_COLUMNS: &str = "id, public_id, trigger_source, status, business_date, started_at, \
                           completed_at, items_processed, items_failed, error_message, created_at";

// ---------------------------------------------------------------------------
// adjustment_runs operations
// ---------------------------------------------------------------------------

/// Creates a new run in `queued` status with a freshly generated public id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_run(
    pool: &PgPool,
    trigger_source: &str,
    business_date: NaiveDate,
) -> Result<RunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, RunRow>(&format!(
        "INSERT INTO adjustment_runs (public_id, trigger_source, status, business_date) \
         VALUES ($1, $2, 'queued', $3) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(trigger_source)
    .bind(business_date)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the run is not `queued`.
pub async fn start_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE adjustment_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            entity: "run",
            id,
            expected_status: "queued".to_string(),
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` with its item counts.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the run is not `running`.
pub async fn complete_run(
    pool: &PgPool,
    id: i64,
    items_processed: i32,
    items_failed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE adjustment_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             items_processed = $2, items_failed = $3 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(items_processed)
    .bind(items_failed)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            entity: "run",
            id,
            expected_status: "running".to_string(),
        });
    }

    Ok(())
}

/// Marks a `queued` or `running` run as `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the run already finished.
pub async fn fail_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE adjustment_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $2 \
         WHERE id = $1 AND status IN ('queued', 'running')",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            entity: "run",
            id,
            expected_status: "queued or running".to_string(),
        });
    }

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has the given `id`.
pub async fn get_run(pool: &PgPool, id: i64) -> Result<RunRow, DbError> {
    sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM adjustment_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound { entity: "run", id })
}

/// Most recent runs first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM adjustment_runs ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// adjustment_run_items operations
// ---------------------------------------------------------------------------

/// Append keyed outcomes to a run in one transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the run does not exist.
pub async fn record_run_items(pool: &PgPool, run_id: i64, items: &[RunItem]) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for item in items {
        sqlx::query(
            "INSERT INTO adjustment_run_items (run_id, item_key, stage, outcome, message) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run_id)
        .bind(&item.key)
        .bind(&item.stage)
        .bind(item.outcome.as_str())
        .bind(item.message.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => DbError::NotFound {
                entity: "run",
                id: run_id,
            },
            other => DbError::Sqlx(other),
        })?;
    }

    tx.commit().await?;
    Ok(())
}

/// Items of a run in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_run_items(pool: &PgPool, run_id: i64) -> Result<Vec<RunItemRow>, DbError> {
    let rows = sqlx::query_as::<_, RunItemRow>(
        "SELECT id, run_id, item_key, stage, outcome, message, created_at \
         FROM adjustment_run_items \
         WHERE run_id = $1 \
         ORDER BY id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use priceadj_pipeline::{ItemOutcome, RunStatus};

    use super::*;

    #[test]
    fn run_row_converts_status() {
        let row = RunRow {
            id: 1,
            public_id: Uuid::new_v4(),
            trigger_source: "scheduler".to_string(),
            status: "running".to_string(),
            business_date: NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
            started_at: Some(Utc::now()),
            completed_at: None,
            items_processed: 0,
            items_failed: 0,
            error_message: None,
            created_at: Utc::now(),
        };

        let record = RunRecord::try_from(row).unwrap();
        assert_eq!(record.status, RunStatus::Running);
    }

    #[test]
    fn run_item_row_rejects_unknown_outcome() {
        let row = RunItemRow {
            id: 1,
            run_id: 1,
            item_key: "1:3:7".to_string(),
            stage: "dispatch".to_string(),
            outcome: "skipped".to_string(),
            message: None,
            created_at: Utc::now(),
        };
        assert!(RunItem::try_from(row).is_err());

        let ok = RunItemRow {
            id: 2,
            run_id: 1,
            item_key: "1:3:8".to_string(),
            stage: "revalidate".to_string(),
            outcome: "dropped".to_string(),
            message: Some("no live services".to_string()),
            created_at: Utc::now(),
        };
        assert_eq!(RunItem::try_from(ok).unwrap().outcome, ItemOutcome::Dropped);
    }
}
