//! In-memory [`RecordStore`] and [`RunLedger`] for tests and dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use priceadj_core::{
    AdjustmentSession, CommencementRegisterEntry, CommencementStatus, CustomerRecord,
    FranchiseeAdjustmentRecord, FranchiseeRecord, InvoiceSummary, NewCommencementEntry,
    NewServiceChange, NewSession, PricingLine, PricingRule, ServiceAdjustmentRow,
    ServiceChangeEntry, ServiceChangeStatus, ServiceRecord, SessionStatus,
};

use crate::error::StoreError;
use crate::ledger::{RunItem, RunLedger, RunRecord, RunStatus};
use crate::store::{RecordStore, SessionFilter};

/// Operations that can be made to fail for a given id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    ListFranchiseeRecords { session_id: i64 },
    LoadCustomer { customer_id: i64 },
    ListActiveServices { customer_id: i64 },
    UpdateServicePrice { service_id: i64 },
    StampSession { session_id: i64 },
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    sessions: BTreeMap<i64, AdjustmentSession>,
    records: BTreeMap<i64, FranchiseeAdjustmentRecord>,
    franchisees: BTreeMap<i64, FranchiseeRecord>,
    customers: BTreeMap<i64, CustomerRecord>,
    services: BTreeMap<i64, ServiceRecord>,
    invoices: Vec<InvoiceSummary>,
    pricing_lines: HashMap<i64, Vec<PricingLine>>,
    commencement: BTreeMap<i64, CommencementRegisterEntry>,
    service_changes: BTreeMap<i64, ServiceChangeEntry>,
    runs: BTreeMap<i64, RunRecord>,
    run_items: BTreeMap<i64, Vec<RunItem>>,
    faults: HashSet<Fault>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, fault: Fault) -> Result<(), StoreError> {
        if self.faults.contains(&fault) {
            Err(StoreError::Backend(format!("injected fault: {fault:?}")))
        } else {
            Ok(())
        }
    }

    fn session_mut(&mut self, id: i64) -> Result<&mut AdjustmentSession, StoreError> {
        self.sessions.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "session",
            id,
        })
    }

    fn record_for(&self, session_id: i64, franchisee_id: i64) -> Option<i64> {
        self.records
            .values()
            .find(|r| r.session_id == session_id && r.franchisee_id == franchisee_id)
            .map(|r| r.id)
    }

    fn upsert_record(
        &mut self,
        session_id: i64,
        franchisee_id: i64,
    ) -> Result<&mut FranchiseeAdjustmentRecord, StoreError> {
        if !self.sessions.contains_key(&session_id) {
            return Err(StoreError::NotFound {
                entity: "session",
                id: session_id,
            });
        }
        let id = match self.record_for(session_id, franchisee_id) {
            Some(id) => id,
            None => {
                let id = self.next_id();
                self.records.insert(
                    id,
                    FranchiseeAdjustmentRecord {
                        id,
                        session_id,
                        franchisee_id,
                        rows: Vec::new(),
                        opt_out_reason: None,
                        pricing_rules: Vec::new(),
                        updated_at: Utc::now(),
                    },
                );
                id
            }
        };
        self.records.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "franchisee adjustment record",
            id,
        })
    }
}

/// Thread-safe store holding every record in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    // ── Seeding ─────────────────────────────────────────────────────────────

    pub fn inject_fault(&self, fault: Fault) {
        self.with(|inner| inner.faults.insert(fault));
    }

    pub fn clear_faults(&self) {
        self.with(|inner| inner.faults.clear());
    }

    /// Insert a session as-is. Ids must be unique across seeded entities.
    pub fn insert_session(&self, session: AdjustmentSession) {
        self.with(|inner| {
            inner.next_id = inner.next_id.max(session.id);
            inner.sessions.insert(session.id, session);
        });
    }

    pub fn insert_franchisee(&self, franchisee: FranchiseeRecord) {
        self.with(|inner| {
            inner.franchisees.insert(franchisee.id, franchisee);
        });
    }

    pub fn insert_customer(&self, customer: CustomerRecord) {
        self.with(|inner| {
            inner.customers.insert(customer.id, customer);
        });
    }

    pub fn insert_service(&self, service: ServiceRecord) {
        self.with(|inner| {
            inner.services.insert(service.id, service);
        });
    }

    pub fn insert_invoice(&self, invoice: InvoiceSummary) {
        self.with(|inner| inner.invoices.push(invoice));
    }

    pub fn insert_franchisee_record(&self, record: FranchiseeAdjustmentRecord) {
        self.with(|inner| {
            inner.next_id = inner.next_id.max(record.id);
            inner.records.insert(record.id, record);
        });
    }

    pub fn insert_commencement_entry(&self, entry: CommencementRegisterEntry) {
        self.with(|inner| {
            inner.next_id = inner.next_id.max(entry.id);
            inner.commencement.insert(entry.id, entry);
        });
    }

    pub fn insert_service_change(&self, change: ServiceChangeEntry) {
        self.with(|inner| {
            inner.next_id = inner.next_id.max(change.id);
            inner.service_changes.insert(change.id, change);
        });
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn session(&self, id: i64) -> Option<AdjustmentSession> {
        self.with(|inner| inner.sessions.get(&id).cloned())
    }

    #[must_use]
    pub fn customer(&self, id: i64) -> Option<CustomerRecord> {
        self.with(|inner| inner.customers.get(&id).cloned())
    }

    #[must_use]
    pub fn service(&self, id: i64) -> Option<ServiceRecord> {
        self.with(|inner| inner.services.get(&id).cloned())
    }

    #[must_use]
    pub fn all_commencement_entries(&self) -> Vec<CommencementRegisterEntry> {
        self.with(|inner| inner.commencement.values().cloned().collect())
    }

    #[must_use]
    pub fn all_service_changes(&self) -> Vec<ServiceChangeEntry> {
        self.with(|inner| inner.service_changes.values().cloned().collect())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<AdjustmentSession>, StoreError> {
        let inner = self.lock()?;
        let mut sessions: Vec<AdjustmentSession> = inner
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.effective_at, s.id));
        Ok(sessions)
    }

    async fn load_session(&self, session_id: i64) -> Result<AdjustmentSession, StoreError> {
        self.lock()?
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "session",
                id: session_id,
            })
    }

    async fn current_session(&self) -> Result<Option<AdjustmentSession>, StoreError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.status != SessionStatus::Completed)
            .max_by_key(|s| s.id)
            .cloned())
    }

    async fn create_session(&self, input: &NewSession) -> Result<AdjustmentSession, StoreError> {
        input.validate()?;
        let mut inner = self.lock()?;
        if let Some(open) = inner
            .sessions
            .values()
            .find(|s| s.status != SessionStatus::Completed)
        {
            return Err(StoreError::Conflict(format!(
                "session {} is not completed yet",
                open.id
            )));
        }
        let id = inner.next_id();
        let session = AdjustmentSession {
            id,
            effective_at: input.effective_at(),
            opening_date: input.opening_date,
            deadline: input.deadline,
            status: SessionStatus::Open,
            notified_at: None,
            completed_at: None,
            pricing_rules: input.pricing_rules.clone(),
            created_at: Utc::now(),
        };
        inner.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn update_session_rules(
        &self,
        session_id: i64,
        rules: &[PricingRule],
    ) -> Result<AdjustmentSession, StoreError> {
        let mut inner = self.lock()?;
        let session = inner.session_mut(session_id)?;
        session.pricing_rules = rules.to_vec();
        Ok(session.clone())
    }

    async fn mark_session_notified(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check(Fault::StampSession { session_id })?;
        let session = inner.session_mut(session_id)?;
        session.status = session.status.transition(SessionStatus::Notified)?;
        session.notified_at = Some(at);
        Ok(())
    }

    async fn mark_session_completed(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check(Fault::StampSession { session_id })?;
        let session = inner.session_mut(session_id)?;
        session.status = session.status.transition(SessionStatus::Completed)?;
        session.completed_at = Some(at);
        Ok(())
    }

    async fn list_franchisee_records(
        &self,
        session_id: i64,
        include_opted_out: bool,
    ) -> Result<Vec<FranchiseeAdjustmentRecord>, StoreError> {
        let inner = self.lock()?;
        inner.check(Fault::ListFranchiseeRecords { session_id })?;
        Ok(inner
            .records
            .values()
            .filter(|r| r.session_id == session_id && (include_opted_out || !r.is_opted_out()))
            .cloned()
            .collect())
    }

    async fn find_franchisee_record(
        &self,
        session_id: i64,
        franchisee_id: i64,
    ) -> Result<Option<FranchiseeAdjustmentRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .record_for(session_id, franchisee_id)
            .and_then(|id| inner.records.get(&id).cloned()))
    }

    async fn save_franchisee_record(
        &self,
        session_id: i64,
        franchisee_id: i64,
        rows: &[ServiceAdjustmentRow],
        pricing_rules: &[PricingRule],
    ) -> Result<FranchiseeAdjustmentRecord, StoreError> {
        let mut inner = self.lock()?;
        let record = inner.upsert_record(session_id, franchisee_id)?;
        record.rows = rows.to_vec();
        record.pricing_rules = pricing_rules.to_vec();
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_opt_out_reason(
        &self,
        session_id: i64,
        franchisee_id: i64,
        reason: Option<&str>,
    ) -> Result<FranchiseeAdjustmentRecord, StoreError> {
        let mut inner = self.lock()?;
        let record = inner.upsert_record(session_id, franchisee_id)?;
        record.opt_out_reason = reason.map(str::to_string);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_franchisees(&self) -> Result<Vec<FranchiseeRecord>, StoreError> {
        Ok(self.lock()?.franchisees.values().cloned().collect())
    }

    async fn load_franchisee(&self, franchisee_id: i64) -> Result<FranchiseeRecord, StoreError> {
        self.lock()?
            .franchisees
            .get(&franchisee_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "franchisee",
                id: franchisee_id,
            })
    }

    async fn load_customer(&self, customer_id: i64) -> Result<CustomerRecord, StoreError> {
        let inner = self.lock()?;
        inner.check(Fault::LoadCustomer { customer_id })?;
        inner
            .customers
            .get(&customer_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "customer",
                id: customer_id,
            })
    }

    async fn list_active_services(
        &self,
        customer_id: i64,
    ) -> Result<Vec<ServiceRecord>, StoreError> {
        let inner = self.lock()?;
        inner.check(Fault::ListActiveServices { customer_id })?;
        Ok(inner
            .services
            .values()
            .filter(|s| s.customer_id == customer_id && s.is_active_service())
            .cloned()
            .collect())
    }

    async fn list_franchisee_services(
        &self,
        franchisee_id: i64,
    ) -> Result<Vec<ServiceRecord>, StoreError> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|s| s.franchisee_id == franchisee_id && s.is_active_service())
            .cloned()
            .collect())
    }

    async fn list_invoices(
        &self,
        franchisee_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<InvoiceSummary>, StoreError> {
        let inner = self.lock()?;
        let customers_of_franchisee: HashSet<i64> = inner
            .customers
            .values()
            .filter(|c| c.franchisee_id == Some(franchisee_id))
            .map(|c| c.id)
            .collect();
        Ok(inner
            .invoices
            .iter()
            .filter(|i| customers_of_franchisee.contains(&i.customer_id) && i.tran_date >= since)
            .cloned()
            .collect())
    }

    async fn update_service_price(
        &self,
        service_id: i64,
        price: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check(Fault::UpdateServicePrice { service_id })?;
        let service = inner
            .services
            .get_mut(&service_id)
            .ok_or(StoreError::NotFound {
                entity: "service",
                id: service_id,
            })?;
        service.price = price;
        Ok(())
    }

    async fn set_customer_last_price_increase(
        &self,
        customer_id: i64,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let customer = inner
            .customers
            .get_mut(&customer_id)
            .ok_or(StoreError::NotFound {
                entity: "customer",
                id: customer_id,
            })?;
        customer.last_price_increase = Some(date);
        Ok(())
    }

    async fn list_pricing_lines(&self, customer_id: i64) -> Result<Vec<PricingLine>, StoreError> {
        Ok(self
            .lock()?
            .pricing_lines
            .get(&customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_pricing_lines(
        &self,
        customer_id: i64,
        lines: &[PricingLine],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.customers.contains_key(&customer_id) {
            return Err(StoreError::NotFound {
                entity: "customer",
                id: customer_id,
            });
        }
        inner.pricing_lines.insert(customer_id, lines.to_vec());
        Ok(())
    }

    async fn list_commencement_entries(
        &self,
        customer_id: i64,
        status: Option<&CommencementStatus>,
    ) -> Result<Vec<CommencementRegisterEntry>, StoreError> {
        Ok(self
            .lock()?
            .commencement
            .values()
            .filter(|e| e.customer_id == customer_id && status.is_none_or(|s| &e.status == s))
            .cloned()
            .collect())
    }

    async fn set_commencement_status(
        &self,
        entry_id: i64,
        status: &CommencementStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let entry = inner
            .commencement
            .get_mut(&entry_id)
            .ok_or(StoreError::NotFound {
                entity: "commencement entry",
                id: entry_id,
            })?;
        entry.status = entry.status.transition(status)?;
        Ok(())
    }

    async fn create_commencement_entry(
        &self,
        entry: &NewCommencementEntry,
    ) -> Result<CommencementRegisterEntry, StoreError> {
        let mut inner = self.lock()?;
        let id = inner.next_id();
        let created = CommencementRegisterEntry {
            id,
            customer_id: entry.customer_id,
            franchisee_id: entry.franchisee_id,
            sale_type: entry.sale_type.clone(),
            inbound: entry.inbound,
            status: entry.status.clone(),
            entry_date: entry.date,
            commencement_date: entry.date,
            signup_date: entry.date,
            weekly_services: entry.weekly_services,
            state: entry.state.clone(),
            created_at: Utc::now(),
        };
        inner.commencement.insert(id, created.clone());
        Ok(created)
    }

    async fn list_service_changes(
        &self,
        service_id: i64,
        status: Option<ServiceChangeStatus>,
    ) -> Result<Vec<ServiceChangeEntry>, StoreError> {
        Ok(self
            .lock()?
            .service_changes
            .values()
            .filter(|c| c.service_id == service_id && status.is_none_or(|s| c.status == s))
            .cloned()
            .collect())
    }

    async fn set_service_change_status(
        &self,
        change_id: i64,
        status: ServiceChangeStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let change = inner
            .service_changes
            .get_mut(&change_id)
            .ok_or(StoreError::NotFound {
                entity: "service change",
                id: change_id,
            })?;
        change.status = change.status.transition(status)?;
        Ok(())
    }

    async fn create_service_change(
        &self,
        change: &NewServiceChange,
    ) -> Result<ServiceChangeEntry, StoreError> {
        let mut inner = self.lock()?;
        let id = inner.next_id();
        let created = ServiceChangeEntry {
            id,
            service_id: change.service_id,
            commencement_entry_id: Some(change.commencement_entry_id),
            status: change.status,
            change_type: change.change_type.clone(),
            effective_date: change.effective_date,
            old_price: change.old_price,
            new_price: change.new_price,
            old_frequency: change.old_frequency.clone(),
            new_frequency: change.new_frequency.clone(),
            created_at: Utc::now(),
        };
        inner.service_changes.insert(id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl RunLedger for MemoryStore {
    async fn create_run(
        &self,
        trigger_source: &str,
        business_date: NaiveDate,
    ) -> Result<RunRecord, StoreError> {
        let mut inner = self.lock()?;
        let id = inner.next_id();
        let run = RunRecord {
            id,
            public_id: Uuid::new_v4(),
            trigger_source: trigger_source.to_string(),
            status: RunStatus::Queued,
            business_date,
            started_at: None,
            completed_at: None,
            items_processed: 0,
            items_failed: 0,
            error_message: None,
            created_at: Utc::now(),
        };
        inner.runs.insert(id, run.clone());
        Ok(run)
    }

    async fn start_run(&self, run_id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let run = running_transition(&mut inner, run_id, RunStatus::Queued)?;
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        Ok(())
    }

    async fn record_items(&self, run_id: i64, items: &[RunItem]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.runs.contains_key(&run_id) {
            return Err(StoreError::NotFound {
                entity: "run",
                id: run_id,
            });
        }
        inner
            .run_items
            .entry(run_id)
            .or_default()
            .extend_from_slice(items);
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: i64,
        items_processed: i32,
        items_failed: i32,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let run = running_transition(&mut inner, run_id, RunStatus::Running)?;
        run.status = RunStatus::Succeeded;
        run.completed_at = Some(Utc::now());
        run.items_processed = items_processed;
        run.items_failed = items_failed;
        Ok(())
    }

    async fn fail_run(&self, run_id: i64, error_message: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let queued = inner
            .runs
            .get(&run_id)
            .is_some_and(|run| run.status == RunStatus::Queued);
        let expected = if queued {
            RunStatus::Queued
        } else {
            RunStatus::Running
        };
        let run = running_transition(&mut inner, run_id, expected)?;
        run.status = RunStatus::Failed;
        run.completed_at = Some(Utc::now());
        run.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn get_run(&self, run_id: i64) -> Result<RunRecord, StoreError> {
        self.lock()?
            .runs
            .get(&run_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "run",
                id: run_id,
            })
    }

    async fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>, StoreError> {
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .lock()?
            .runs
            .values()
            .rev()
            .take(take)
            .cloned()
            .collect())
    }

    async fn list_run_items(&self, run_id: i64) -> Result<Vec<RunItem>, StoreError> {
        Ok(self
            .lock()?
            .run_items
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }
}

fn running_transition(
    inner: &mut Inner,
    run_id: i64,
    expected: RunStatus,
) -> Result<&mut RunRecord, StoreError> {
    let run = inner.runs.get_mut(&run_id).ok_or(StoreError::NotFound {
        entity: "run",
        id: run_id,
    })?;
    if run.status != expected {
        return Err(StoreError::InvalidTransition(format!(
            "run {run_id} is {} (expected {})",
            run.status.as_str(),
            expected.as_str()
        )));
    }
    Ok(run)
}
