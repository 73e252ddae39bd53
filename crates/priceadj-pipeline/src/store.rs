use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use priceadj_core::{
    AdjustmentSession, CommencementRegisterEntry, CommencementStatus, CustomerRecord,
    FranchiseeAdjustmentRecord, FranchiseeRecord, InvoiceSummary, NewCommencementEntry,
    NewServiceChange, NewSession, PricingLine, PricingRule, ServiceAdjustmentRow,
    ServiceChangeEntry, ServiceChangeStatus, ServiceRecord, SessionStatus,
};

use crate::error::StoreError;

/// Criteria for [`RecordStore::list_sessions`]. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    /// Normalized calendar date of the effective instant.
    pub effective_date: Option<NaiveDate>,
    pub status: Option<SessionStatus>,
    /// Sessions whose opening date <= date <= deadline.
    pub accepting_input_on: Option<NaiveDate>,
    /// Exclude completed sessions.
    pub exclude_completed: bool,
}

impl SessionFilter {
    #[must_use]
    pub fn matches(&self, session: &AdjustmentSession) -> bool {
        self.effective_date
            .is_none_or(|date| session.effective_date() == date)
            && self.status.is_none_or(|status| session.status == status)
            && self.accepting_input_on.is_none_or(|date| {
                session.opening_date <= date && date <= session.deadline
            })
            && (!self.exclude_completed || session.status != SessionStatus::Completed)
    }
}

/// Typed access to every record the processor reads or writes.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// between concurrently running work items and axum handlers.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), StoreError>;

    // ── Sessions ────────────────────────────────────────────────────────────

    /// Sessions matching `filter`, oldest effective date first.
    async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<AdjustmentSession>, StoreError>;

    async fn load_session(&self, session_id: i64) -> Result<AdjustmentSession, StoreError>;

    /// The session that is not yet completed, if any.
    async fn current_session(&self) -> Result<Option<AdjustmentSession>, StoreError>;

    /// Returns [`StoreError::Conflict`] while another session is not completed.
    async fn create_session(&self, input: &NewSession) -> Result<AdjustmentSession, StoreError>;

    async fn update_session_rules(
        &self,
        session_id: i64,
        rules: &[PricingRule],
    ) -> Result<AdjustmentSession, StoreError>;

    /// Move `open -> notified` and stamp the notification time.
    async fn mark_session_notified(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Move `notified -> completed` and stamp the completion time.
    async fn mark_session_completed(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ── Franchisee adjustment records ───────────────────────────────────────

    async fn list_franchisee_records(
        &self,
        session_id: i64,
        include_opted_out: bool,
    ) -> Result<Vec<FranchiseeAdjustmentRecord>, StoreError>;

    async fn find_franchisee_record(
        &self,
        session_id: i64,
        franchisee_id: i64,
    ) -> Result<Option<FranchiseeAdjustmentRecord>, StoreError>;

    /// Insert or replace the rows and rules of the (session, franchisee) record.
    /// The opt-out reason is left as stored.
    async fn save_franchisee_record(
        &self,
        session_id: i64,
        franchisee_id: i64,
        rows: &[ServiceAdjustmentRow],
        pricing_rules: &[PricingRule],
    ) -> Result<FranchiseeAdjustmentRecord, StoreError>;

    /// Set or clear the opt-out reason, creating an empty record if needed.
    async fn set_opt_out_reason(
        &self,
        session_id: i64,
        franchisee_id: i64,
        reason: Option<&str>,
    ) -> Result<FranchiseeAdjustmentRecord, StoreError>;

    // ── Reference data ──────────────────────────────────────────────────────

    async fn list_franchisees(&self) -> Result<Vec<FranchiseeRecord>, StoreError>;

    async fn load_franchisee(&self, franchisee_id: i64) -> Result<FranchiseeRecord, StoreError>;

    async fn load_customer(&self, customer_id: i64) -> Result<CustomerRecord, StoreError>;

    /// Active services in the services category for one customer.
    async fn list_active_services(
        &self,
        customer_id: i64,
    ) -> Result<Vec<ServiceRecord>, StoreError>;

    /// Active services in the services category across a franchisee's customers.
    async fn list_franchisee_services(
        &self,
        franchisee_id: i64,
    ) -> Result<Vec<ServiceRecord>, StoreError>;

    /// Invoices of the franchisee's customers dated on or after `since`.
    async fn list_invoices(
        &self,
        franchisee_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<InvoiceSummary>, StoreError>;

    // ── Live mutations ──────────────────────────────────────────────────────

    async fn update_service_price(&self, service_id: i64, price: Decimal)
        -> Result<(), StoreError>;

    async fn set_customer_last_price_increase(
        &self,
        customer_id: i64,
        date: NaiveDate,
    ) -> Result<(), StoreError>;

    async fn list_pricing_lines(&self, customer_id: i64) -> Result<Vec<PricingLine>, StoreError>;

    /// Replace every pricing line of the customer.
    async fn replace_pricing_lines(
        &self,
        customer_id: i64,
        lines: &[PricingLine],
    ) -> Result<(), StoreError>;

    // ── Commencement register ───────────────────────────────────────────────

    async fn list_commencement_entries(
        &self,
        customer_id: i64,
        status: Option<&CommencementStatus>,
    ) -> Result<Vec<CommencementRegisterEntry>, StoreError>;

    async fn set_commencement_status(
        &self,
        entry_id: i64,
        status: &CommencementStatus,
    ) -> Result<(), StoreError>;

    async fn create_commencement_entry(
        &self,
        entry: &NewCommencementEntry,
    ) -> Result<CommencementRegisterEntry, StoreError>;

    // ── Service changes ─────────────────────────────────────────────────────

    async fn list_service_changes(
        &self,
        service_id: i64,
        status: Option<ServiceChangeStatus>,
    ) -> Result<Vec<ServiceChangeEntry>, StoreError>;

    async fn set_service_change_status(
        &self,
        change_id: i64,
        status: ServiceChangeStatus,
    ) -> Result<(), StoreError>;

    async fn create_service_change(
        &self,
        change: &NewServiceChange,
    ) -> Result<ServiceChangeEntry, StoreError>;
}
