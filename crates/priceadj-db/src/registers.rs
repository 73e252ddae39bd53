//! Database operations for `commencement_register` and `service_changes`,
//! the two audit ledgers written when a customer's prices are committed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use priceadj_core::{
    CommencementRegisterEntry, CommencementStatus, Frequency, NewCommencementEntry,
    NewServiceChange, SaleType, ServiceChangeEntry, ServiceChangeStatus,
};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `commencement_register` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommencementRow {
    pub id: i64,
    pub customer_id: i64,
    pub franchisee_id: i64,
    pub sale_type: String,
    pub inbound: bool,
    pub status: String,
    pub entry_date: NaiveDate,
    pub commencement_date: NaiveDate,
    pub signup_date: NaiveDate,
    pub weekly_services: i16,
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CommencementRow> for CommencementRegisterEntry {
    fn from(row: CommencementRow) -> Self {
        CommencementRegisterEntry {
            id: row.id,
            customer_id: row.customer_id,
            franchisee_id: row.franchisee_id,
            sale_type: SaleType::from(row.sale_type),
            inbound: row.inbound,
            status: CommencementStatus::from(row.status),
            entry_date: row.entry_date,
            commencement_date: row.commencement_date,
            signup_date: row.signup_date,
            weekly_services: row.weekly_services,
            state: row.state,
            created_at: row.created_at,
        }
    }
}

/// A row from the `service_changes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceChangeRow {
    pub id: i64,
    pub service_id: i64,
    pub commencement_entry_id: Option<i64>,
    pub status: String,
    pub change_type: String,
    pub effective_date: NaiveDate,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub old_frequency: Json<Frequency>,
    pub new_frequency: Json<Frequency>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ServiceChangeRow> for ServiceChangeEntry {
    type Error = DbError;

    fn try_from(row: ServiceChangeRow) -> Result<Self, Self::Error> {
        Ok(ServiceChangeEntry {
            id: row.id,
            service_id: row.service_id,
            commencement_entry_id: row.commencement_entry_id,
            status: row.status.parse()?,
            change_type: row.change_type,
            effective_date: row.effective_date,
            old_price: row.old_price,
            new_price: row.new_price,
            old_frequency: row.old_frequency.0,
            new_frequency: row.new_frequency.0,
            created_at: row.created_at,
        })
    }
}

const COMMENCEMENT_COLUMNS: &str = "id, customer_id, franchisee_id, sale_type, inbound, status, \
                                    entry_date, commencement_date, signup_date, weekly_services, \
                                    state, created_at";

const SERVICE_CHANGE_COLUMNS: &str = "id, service_id, commencement_entry_id, status, change_type, \
                                      effective_date, old_price, new_price, old_frequency, \
                                      new_frequency, created_at";

// ---------------------------------------------------------------------------
// Commencement register
// ---------------------------------------------------------------------------

/// Entries of a customer, newest first, optionally narrowed to one status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_commencement_entries(
    pool: &PgPool,
    customer_id: i64,
    status: Option<&CommencementStatus>,
) -> Result<Vec<CommencementRow>, DbError> {
    let rows = sqlx::query_as::<_, CommencementRow>(&format!(
        "SELECT {COMMENCEMENT_COLUMNS} \
         FROM commencement_register \
         WHERE customer_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY entry_date DESC, id DESC"
    ))
    .bind(customer_id)
    .bind(status.map(CommencementStatus::as_str))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the customer or franchisee does not exist.
pub async fn create_commencement_entry(
    pool: &PgPool,
    entry: &NewCommencementEntry,
) -> Result<CommencementRow, DbError> {
    sqlx::query_as::<_, CommencementRow>(&format!(
        "INSERT INTO commencement_register \
             (customer_id, franchisee_id, sale_type, inbound, status, entry_date, \
              commencement_date, signup_date, weekly_services, state) \
         VALUES ($1, $2, $3, $4, $5, $6, $6, $6, $7, $8) \
         RETURNING {COMMENCEMENT_COLUMNS}"
    ))
    .bind(entry.customer_id)
    .bind(entry.franchisee_id)
    .bind(entry.sale_type.as_str())
    .bind(entry.inbound)
    .bind(entry.status.as_str())
    .bind(entry.date)
    .bind(entry.weekly_services)
    .bind(entry.state.as_deref())
    .fetch_one(pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => DbError::NotFound {
            entity: "customer",
            id: entry.customer_id,
        },
        other => DbError::Sqlx(other),
    })
}

/// Move an entry to `status` when the register allows that transition.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown entry, [`DbError::Core`] for a
/// disallowed transition and [`DbError::InvalidTransition`] if the entry
/// changed status concurrently.
pub async fn set_commencement_status(
    pool: &PgPool,
    id: i64,
    status: &CommencementStatus,
) -> Result<(), DbError> {
    let current: String =
        sqlx::query_scalar("SELECT status FROM commencement_register WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(DbError::NotFound {
                entity: "commencement entry",
                id,
            })?;

    let current = CommencementStatus::from(current);
    current.transition(status)?;

    let result = sqlx::query("UPDATE commencement_register SET status = $2 WHERE id = $1 AND status = $3")
        .bind(id)
        .bind(status.as_str())
        .bind(current.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            entity: "commencement entry",
            id,
            expected_status: current.as_str().to_string(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Service changes
// ---------------------------------------------------------------------------

/// Changes of a service, newest first, optionally narrowed to one status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_service_changes(
    pool: &PgPool,
    service_id: i64,
    status: Option<ServiceChangeStatus>,
) -> Result<Vec<ServiceChangeRow>, DbError> {
    let rows = sqlx::query_as::<_, ServiceChangeRow>(&format!(
        "SELECT {SERVICE_CHANGE_COLUMNS} \
         FROM service_changes \
         WHERE service_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY effective_date DESC, id DESC"
    ))
    .bind(service_id)
    .bind(status.map(ServiceChangeStatus::as_str))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the service or commencement entry does
/// not exist.
pub async fn create_service_change(
    pool: &PgPool,
    change: &NewServiceChange,
) -> Result<ServiceChangeRow, DbError> {
    sqlx::query_as::<_, ServiceChangeRow>(&format!(
        "INSERT INTO service_changes \
             (service_id, commencement_entry_id, status, change_type, effective_date, \
              old_price, new_price, old_frequency, new_frequency) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {SERVICE_CHANGE_COLUMNS}"
    ))
    .bind(change.service_id)
    .bind(change.commencement_entry_id)
    .bind(change.status.as_str())
    .bind(&change.change_type)
    .bind(change.effective_date)
    .bind(change.old_price)
    .bind(change.new_price)
    .bind(Json(&change.old_frequency))
    .bind(Json(&change.new_frequency))
    .fetch_one(pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => DbError::NotFound {
            entity: "service",
            id: change.service_id,
        },
        other => DbError::Sqlx(other),
    })
}

/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown change, [`DbError::Core`] for
/// a disallowed transition and [`DbError::InvalidTransition`] if the change
/// moved concurrently.
pub async fn set_service_change_status(
    pool: &PgPool,
    id: i64,
    status: ServiceChangeStatus,
) -> Result<(), DbError> {
    let current: String = sqlx::query_scalar("SELECT status FROM service_changes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound {
            entity: "service change",
            id,
        })?;

    let current: ServiceChangeStatus = current.parse()?;
    current.transition(status)?;

    let result = sqlx::query("UPDATE service_changes SET status = $2 WHERE id = $1 AND status = $3")
        .bind(id)
        .bind(status.as_str())
        .bind(current.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            entity: "service change",
            id,
            expected_status: current.as_str().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn commencement_row_parses_known_and_unknown_values() {
        let row = CommencementRow {
            id: 1,
            customer_id: 7,
            franchisee_id: 3,
            sale_type: "price_increase".to_string(),
            inbound: true,
            status: "lost".to_string(),
            entry_date: date(2024, 7, 1),
            commencement_date: date(2024, 7, 1),
            signup_date: date(2024, 7, 1),
            weekly_services: 5,
            state: Some("NSW".to_string()),
            created_at: Utc::now(),
        };

        let entry = CommencementRegisterEntry::from(row);
        assert_eq!(entry.sale_type, SaleType::PriceIncrease);
        assert_eq!(entry.status, CommencementStatus::Other("lost".to_string()));
    }

    #[test]
    fn service_change_row_rejects_unknown_status() {
        let row = ServiceChangeRow {
            id: 1,
            service_id: 11,
            commencement_entry_id: Some(1),
            status: "paused".to_string(),
            change_type: "Price Increase".to_string(),
            effective_date: date(2024, 7, 1),
            old_price: Decimal::new(4500, 2),
            new_price: Decimal::new(5000, 2),
            old_frequency: Json(Frequency(vec![1, 3, 5])),
            new_frequency: Json(Frequency(vec![1, 3, 5])),
            created_at: Utc::now(),
        };

        assert!(matches!(
            ServiceChangeEntry::try_from(row),
            Err(DbError::Core(_))
        ));
    }
}
