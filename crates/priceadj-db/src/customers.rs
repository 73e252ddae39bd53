//! Reference data the processor reads and the few live fields it writes:
//! franchisees, customers, services, invoices and pricing lines.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use priceadj_core::{
    Address, CustomerRecord, FranchiseeRecord, InvoiceSummary, PricingLine, ServiceDays,
    ServiceRecord, SERVICES_CATEGORY,
};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `franchisees` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FranchiseeRow {
    pub id: i64,
    pub company_name: String,
    pub state: Option<String>,
    pub active: bool,
}

impl From<FranchiseeRow> for FranchiseeRecord {
    fn from(row: FranchiseeRow) -> Self {
        FranchiseeRecord {
            id: row.id,
            company_name: row.company_name,
            state: row.state,
            active: row.active,
        }
    }
}

/// A row from the `customers` table. Addresses are loaded separately.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRow {
    pub id: i64,
    pub entity_id: String,
    pub company_name: String,
    pub franchisee_id: Option<i64>,
    pub email: Option<String>,
    pub service_email: Option<String>,
    pub accounts_cc_email: Option<String>,
    pub last_price_increase: Option<NaiveDate>,
    pub national_account: bool,
    pub signed: bool,
}

impl CustomerRow {
    #[must_use]
    pub fn into_record(self, addresses: Vec<AddressRow>) -> CustomerRecord {
        CustomerRecord {
            id: self.id,
            entity_id: self.entity_id,
            company_name: self.company_name,
            franchisee_id: self.franchisee_id,
            email: self.email,
            service_email: self.service_email,
            accounts_cc_email: self.accounts_cc_email,
            addresses: addresses.into_iter().map(Address::from).collect(),
            last_price_increase: self.last_price_increase,
            national_account: self.national_account,
            signed: self.signed,
        }
    }
}

/// A row from the `customer_addresses` table.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AddressRow {
    pub addr1: Option<String>,
    pub addr2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub default_billing: bool,
    pub default_shipping: bool,
    pub residential: bool,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Address {
            addr1: row.addr1,
            addr2: row.addr2,
            city: row.city,
            state: row.state,
            zip: row.zip,
            default_billing: row.default_billing,
            default_shipping: row.default_shipping,
            residential: row.residential,
        }
    }
}

/// A row from the `services` table.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: i64,
    pub customer_id: i64,
    pub franchisee_id: i64,
    pub service_type_id: i64,
    pub name: String,
    pub price: Decimal,
    pub category: i32,
    pub inactive: bool,
    pub day_mon: bool,
    pub day_tue: bool,
    pub day_wed: bool,
    pub day_thu: bool,
    pub day_fri: bool,
    pub day_adhoc: bool,
    pub item_id: Option<i64>,
}

impl From<ServiceRow> for ServiceRecord {
    fn from(row: ServiceRow) -> Self {
        ServiceRecord {
            id: row.id,
            customer_id: row.customer_id,
            franchisee_id: row.franchisee_id,
            service_type_id: row.service_type_id,
            name: row.name,
            price: row.price,
            category: row.category,
            inactive: row.inactive,
            days: ServiceDays {
                mon: row.day_mon,
                tue: row.day_tue,
                wed: row.day_wed,
                thu: row.day_thu,
                fri: row.day_fri,
                adhoc: row.day_adhoc,
            },
            item_id: row.item_id,
        }
    }
}

/// An invoice joined with its customer's name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    pub customer_id: i64,
    pub customer_name: String,
    pub tran_date: NaiveDate,
}

impl From<InvoiceRow> for InvoiceSummary {
    fn from(row: InvoiceRow) -> Self {
        InvoiceSummary {
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            tran_date: row.tran_date,
        }
    }
}

/// A row from the `pricing_lines` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PricingLineRow {
    pub position: i32,
    pub item_id: Option<i64>,
    pub service_name: String,
    pub price: Decimal,
    pub frequency_label: String,
}

impl From<PricingLineRow> for PricingLine {
    fn from(row: PricingLineRow) -> Self {
        PricingLine {
            item_id: row.item_id,
            service_name: row.service_name,
            price: row.price,
            frequency_label: row.frequency_label,
        }
    }
}

const SERVICE_COLUMNS: &str = "id, customer_id, franchisee_id, service_type_id, name, price, \
                               category, inactive, day_mon, day_tue, day_wed, day_thu, day_fri, \
                               day_adhoc, item_id";

const CUSTOMER_COLUMNS: &str = "id, entity_id, company_name, franchisee_id, email, service_email, \
                                accounts_cc_email, last_price_increase, national_account, signed";

// ---------------------------------------------------------------------------
// Franchisees
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_franchisees(pool: &PgPool) -> Result<Vec<FranchiseeRow>, DbError> {
    let rows = sqlx::query_as::<_, FranchiseeRow>(
        "SELECT id, company_name, state, active FROM franchisees ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no franchisee has the given `id`.
pub async fn get_franchisee(pool: &PgPool, id: i64) -> Result<FranchiseeRow, DbError> {
    sqlx::query_as::<_, FranchiseeRow>(
        "SELECT id, company_name, state, active FROM franchisees WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound {
        entity: "franchisee",
        id,
    })
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

/// Load a customer together with its addresses in stored order.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no customer has the given `id`.
pub async fn get_customer(pool: &PgPool, id: i64) -> Result<CustomerRecord, DbError> {
    let customer = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound {
        entity: "customer",
        id,
    })?;

    let addresses = sqlx::query_as::<_, AddressRow>(
        "SELECT addr1, addr2, city, state, zip, default_billing, default_shipping, residential \
         FROM customer_addresses \
         WHERE customer_id = $1 \
         ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(customer.into_record(addresses))
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no customer has the given `id`.
pub async fn set_customer_last_price_increase(
    pool: &PgPool,
    id: i64,
    date: NaiveDate,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE customers SET last_price_increase = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(date)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound {
            entity: "customer",
            id,
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Active services in the services category for one customer.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_services(
    pool: &PgPool,
    customer_id: i64,
) -> Result<Vec<ServiceRow>, DbError> {
    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        "SELECT {SERVICE_COLUMNS} \
         FROM services \
         WHERE customer_id = $1 AND NOT inactive AND category = $2 \
         ORDER BY id"
    ))
    .bind(customer_id)
    .bind(SERVICES_CATEGORY)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active services in the services category across a franchisee's customers.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_franchisee_services(
    pool: &PgPool,
    franchisee_id: i64,
) -> Result<Vec<ServiceRow>, DbError> {
    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        "SELECT {SERVICE_COLUMNS} \
         FROM services \
         WHERE franchisee_id = $1 AND NOT inactive AND category = $2 \
         ORDER BY customer_id, id"
    ))
    .bind(franchisee_id)
    .bind(SERVICES_CATEGORY)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no service has the given `id`.
pub async fn update_service_price(pool: &PgPool, id: i64, price: Decimal) -> Result<(), DbError> {
    let result =
        sqlx::query("UPDATE services SET price = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(price)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound {
            entity: "service",
            id,
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

/// Invoices of a franchisee's customers dated on or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_invoices(
    pool: &PgPool,
    franchisee_id: i64,
    since: NaiveDate,
) -> Result<Vec<InvoiceRow>, DbError> {
    let rows = sqlx::query_as::<_, InvoiceRow>(
        "SELECT i.customer_id, c.company_name AS customer_name, i.tran_date \
         FROM invoices i \
         JOIN customers c ON c.id = i.customer_id \
         WHERE c.franchisee_id = $1 AND i.tran_date >= $2 \
         ORDER BY i.customer_id, i.tran_date",
    )
    .bind(franchisee_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Pricing lines
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pricing_lines(
    pool: &PgPool,
    customer_id: i64,
) -> Result<Vec<PricingLineRow>, DbError> {
    let rows = sqlx::query_as::<_, PricingLineRow>(
        "SELECT position, item_id, service_name, price, frequency_label \
         FROM pricing_lines \
         WHERE customer_id = $1 \
         ORDER BY position",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Replace every pricing line of a customer in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is changed then.
pub async fn replace_pricing_lines(
    pool: &PgPool,
    customer_id: i64,
    lines: &[PricingLine],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM pricing_lines WHERE customer_id = $1")
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;

    for (position, line) in (0i32..).zip(lines) {
        sqlx::query(
            "INSERT INTO pricing_lines \
                 (customer_id, position, item_id, service_name, price, frequency_label) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(customer_id)
        .bind(position)
        .bind(line.item_id)
        .bind(&line.service_name)
        .bind(line.price)
        .bind(&line.frequency_label)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
