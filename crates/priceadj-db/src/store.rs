//! [`RecordStore`] and [`RunLedger`] over a Postgres pool.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use priceadj_core::{
    AdjustmentSession, CommencementRegisterEntry, CommencementStatus, CustomerRecord,
    FranchiseeAdjustmentRecord, FranchiseeRecord, InvoiceSummary, NewCommencementEntry,
    NewServiceChange, NewSession, PricingLine, PricingRule, ServiceAdjustmentRow,
    ServiceChangeEntry, ServiceChangeStatus, ServiceRecord,
};
use priceadj_pipeline::{RecordStore, RunItem, RunLedger, RunRecord, SessionFilter, StoreError};

use crate::{adjustments, customers, registers, runs, sessions, DbError};

/// Postgres-backed store shared by the server, the CLI and the scheduler.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R>,
    StoreError: From<T::Error>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        crate::ping(&self.pool)
            .await
            .map_err(|e| StoreError::from(DbError::from(e)))
    }

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<AdjustmentSession>, StoreError> {
        convert_all(sessions::list_sessions(&self.pool, filter).await?)
    }

    async fn load_session(&self, session_id: i64) -> Result<AdjustmentSession, StoreError> {
        Ok(sessions::get_session(&self.pool, session_id).await?.try_into()?)
    }

    async fn current_session(&self) -> Result<Option<AdjustmentSession>, StoreError> {
        match sessions::get_current_session(&self.pool).await? {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn create_session(&self, input: &NewSession) -> Result<AdjustmentSession, StoreError> {
        Ok(sessions::create_session(&self.pool, input).await?.try_into()?)
    }

    async fn update_session_rules(
        &self,
        session_id: i64,
        rules: &[PricingRule],
    ) -> Result<AdjustmentSession, StoreError> {
        Ok(sessions::update_session_rules(&self.pool, session_id, rules)
            .await?
            .try_into()?)
    }

    async fn mark_session_notified(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(sessions::mark_session_notified(&self.pool, session_id, at).await?)
    }

    async fn mark_session_completed(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(sessions::mark_session_completed(&self.pool, session_id, at).await?)
    }

    async fn list_franchisee_records(
        &self,
        session_id: i64,
        include_opted_out: bool,
    ) -> Result<Vec<FranchiseeAdjustmentRecord>, StoreError> {
        convert_all(
            adjustments::list_franchisee_adjustments(&self.pool, session_id, include_opted_out)
                .await?,
        )
    }

    async fn find_franchisee_record(
        &self,
        session_id: i64,
        franchisee_id: i64,
    ) -> Result<Option<FranchiseeAdjustmentRecord>, StoreError> {
        match adjustments::find_franchisee_adjustment(&self.pool, session_id, franchisee_id).await? {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn save_franchisee_record(
        &self,
        session_id: i64,
        franchisee_id: i64,
        rows: &[ServiceAdjustmentRow],
        pricing_rules: &[PricingRule],
    ) -> Result<FranchiseeAdjustmentRecord, StoreError> {
        Ok(adjustments::save_franchisee_adjustment(
            &self.pool,
            session_id,
            franchisee_id,
            rows,
            pricing_rules,
        )
        .await?
        .try_into()?)
    }

    async fn set_opt_out_reason(
        &self,
        session_id: i64,
        franchisee_id: i64,
        reason: Option<&str>,
    ) -> Result<FranchiseeAdjustmentRecord, StoreError> {
        Ok(
            adjustments::set_opt_out_reason(&self.pool, session_id, franchisee_id, reason)
                .await?
                .try_into()?,
        )
    }

    async fn list_franchisees(&self) -> Result<Vec<FranchiseeRecord>, StoreError> {
        Ok(customers::list_franchisees(&self.pool)
            .await?
            .into_iter()
            .map(FranchiseeRecord::from)
            .collect())
    }

    async fn load_franchisee(&self, franchisee_id: i64) -> Result<FranchiseeRecord, StoreError> {
        Ok(customers::get_franchisee(&self.pool, franchisee_id)
            .await?
            .into())
    }

    async fn load_customer(&self, customer_id: i64) -> Result<CustomerRecord, StoreError> {
        Ok(customers::get_customer(&self.pool, customer_id).await?)
    }

    async fn list_active_services(
        &self,
        customer_id: i64,
    ) -> Result<Vec<ServiceRecord>, StoreError> {
        Ok(customers::list_active_services(&self.pool, customer_id)
            .await?
            .into_iter()
            .map(ServiceRecord::from)
            .collect())
    }

    async fn list_franchisee_services(
        &self,
        franchisee_id: i64,
    ) -> Result<Vec<ServiceRecord>, StoreError> {
        Ok(customers::list_franchisee_services(&self.pool, franchisee_id)
            .await?
            .into_iter()
            .map(ServiceRecord::from)
            .collect())
    }

    async fn list_invoices(
        &self,
        franchisee_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<InvoiceSummary>, StoreError> {
        Ok(customers::list_invoices(&self.pool, franchisee_id, since)
            .await?
            .into_iter()
            .map(InvoiceSummary::from)
            .collect())
    }

    async fn update_service_price(
        &self,
        service_id: i64,
        price: Decimal,
    ) -> Result<(), StoreError> {
        Ok(customers::update_service_price(&self.pool, service_id, price).await?)
    }

    async fn set_customer_last_price_increase(
        &self,
        customer_id: i64,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        Ok(customers::set_customer_last_price_increase(&self.pool, customer_id, date).await?)
    }

    async fn list_pricing_lines(&self, customer_id: i64) -> Result<Vec<PricingLine>, StoreError> {
        Ok(customers::list_pricing_lines(&self.pool, customer_id)
            .await?
            .into_iter()
            .map(PricingLine::from)
            .collect())
    }

    async fn replace_pricing_lines(
        &self,
        customer_id: i64,
        lines: &[PricingLine],
    ) -> Result<(), StoreError> {
        Ok(customers::replace_pricing_lines(&self.pool, customer_id, lines).await?)
    }

    async fn list_commencement_entries(
        &self,
        customer_id: i64,
        status: Option<&CommencementStatus>,
    ) -> Result<Vec<CommencementRegisterEntry>, StoreError> {
        Ok(
            registers::list_commencement_entries(&self.pool, customer_id, status)
                .await?
                .into_iter()
                .map(CommencementRegisterEntry::from)
                .collect(),
        )
    }

    async fn set_commencement_status(
        &self,
        entry_id: i64,
        status: &CommencementStatus,
    ) -> Result<(), StoreError> {
        Ok(registers::set_commencement_status(&self.pool, entry_id, status).await?)
    }

    async fn create_commencement_entry(
        &self,
        entry: &NewCommencementEntry,
    ) -> Result<CommencementRegisterEntry, StoreError> {
        Ok(registers::create_commencement_entry(&self.pool, entry)
            .await?
            .into())
    }

    async fn list_service_changes(
        &self,
        service_id: i64,
        status: Option<ServiceChangeStatus>,
    ) -> Result<Vec<ServiceChangeEntry>, StoreError> {
        convert_all(registers::list_service_changes(&self.pool, service_id, status).await?)
    }

    async fn set_service_change_status(
        &self,
        change_id: i64,
        status: ServiceChangeStatus,
    ) -> Result<(), StoreError> {
        Ok(registers::set_service_change_status(&self.pool, change_id, status).await?)
    }

    async fn create_service_change(
        &self,
        change: &NewServiceChange,
    ) -> Result<ServiceChangeEntry, StoreError> {
        Ok(registers::create_service_change(&self.pool, change)
            .await?
            .try_into()?)
    }
}

#[async_trait]
impl RunLedger for PgStore {
    async fn create_run(
        &self,
        trigger_source: &str,
        business_date: NaiveDate,
    ) -> Result<RunRecord, StoreError> {
        runs::create_run(&self.pool, trigger_source, business_date)
            .await?
            .try_into()
    }

    async fn start_run(&self, run_id: i64) -> Result<(), StoreError> {
        Ok(runs::start_run(&self.pool, run_id).await?)
    }

    async fn record_items(&self, run_id: i64, items: &[RunItem]) -> Result<(), StoreError> {
        Ok(runs::record_run_items(&self.pool, run_id, items).await?)
    }

    async fn complete_run(
        &self,
        run_id: i64,
        items_processed: i32,
        items_failed: i32,
    ) -> Result<(), StoreError> {
        Ok(runs::complete_run(&self.pool, run_id, items_processed, items_failed).await?)
    }

    async fn fail_run(&self, run_id: i64, error_message: &str) -> Result<(), StoreError> {
        Ok(runs::fail_run(&self.pool, run_id, error_message).await?)
    }

    async fn get_run(&self, run_id: i64) -> Result<RunRecord, StoreError> {
        runs::get_run(&self.pool, run_id).await?.try_into()
    }

    async fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>, StoreError> {
        convert_all(runs::list_runs(&self.pool, limit).await?)
    }

    async fn list_run_items(&self, run_id: i64) -> Result<Vec<RunItem>, StoreError> {
        convert_all(runs::list_run_items(&self.pool, run_id).await?)
    }
}
