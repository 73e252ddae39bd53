//! Build a franchisee's adjustment sheet for a session from live records.

use std::collections::{BTreeMap, HashMap};

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;

use priceadj_core::{
    apply_rules, AdjustmentSession, CustomerRecord, Directory, FranchiseeAdjustmentRecord,
    InvoiceSummary, PricingRule, ServiceAdjustmentRow,
};

use crate::error::PipelineError;
use crate::store::RecordStore;

/// How far back invoices are read when judging eligibility.
const INVOICE_LOOKBACK_MONTHS: u32 = 36;

#[derive(Debug, Default, Clone, Copy)]
struct InvoiceHistory {
    has_year_old_invoice: bool,
    has_recent_invoice: bool,
}

/// Customers billed both a year or more ago and within the last six months.
fn invoice_eligible(invoices: &[InvoiceSummary], today: NaiveDate) -> HashMap<i64, bool> {
    let year_ago = today.checked_sub_months(Months::new(12));
    let half_year_ago = today.checked_sub_months(Months::new(6));

    let mut history: HashMap<i64, InvoiceHistory> = HashMap::new();
    for invoice in invoices {
        let entry = history.entry(invoice.customer_id).or_default();
        if year_ago.is_some_and(|cutoff| invoice.tran_date <= cutoff) {
            entry.has_year_old_invoice = true;
        }
        if half_year_ago.is_some_and(|cutoff| invoice.tran_date >= cutoff) {
            entry.has_recent_invoice = true;
        }
    }

    history
        .into_iter()
        .map(|(id, h)| (id, h.has_year_old_invoice && h.has_recent_invoice))
        .collect()
}

/// Rows for every eligible service, with rules and prior edits applied but
/// nothing persisted.
///
/// `rules` drive the adjustment of ordinary customers; national accounts
/// always take the session's own rules and are confirmed automatically.
/// Prior rows (matched by service id) keep their adjustment and confirmation
/// unless `reapply_rules` is set.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if any record cannot be read.
#[allow(clippy::too_many_arguments)]
pub async fn prepare_rows(
    store: &dyn RecordStore,
    directory: &Directory,
    today: NaiveDate,
    session: &AdjustmentSession,
    franchisee_id: i64,
    rules: &[PricingRule],
    prior: &[ServiceAdjustmentRow],
    reapply_rules: bool,
) -> Result<Vec<ServiceAdjustmentRow>, PipelineError> {
    let effective_date = session.effective_date();
    let franchisee = store.load_franchisee(franchisee_id).await?;

    let since = today
        .checked_sub_months(Months::new(INVOICE_LOOKBACK_MONTHS))
        .unwrap_or(NaiveDate::MIN);
    let eligible = invoice_eligible(&store.list_invoices(franchisee_id, since).await?, today);

    let services = store.list_franchisee_services(franchisee_id).await?;

    let mut customers: BTreeMap<i64, CustomerRecord> = BTreeMap::new();
    for service in &services {
        if !customers.contains_key(&service.customer_id) {
            let customer = store.load_customer(service.customer_id).await?;
            customers.insert(customer.id, customer);
        }
    }

    let prior: HashMap<i64, &ServiceAdjustmentRow> =
        prior.iter().map(|row| (row.service_id, row)).collect();

    let mut rows: Vec<ServiceAdjustmentRow> = services
        .iter()
        .filter(|service| service.is_active_service())
        .filter_map(|service| {
            let customer = customers.get(&service.customer_id)?;
            let keep = customer.signed
                && customer.due_for_increase(effective_date)
                && !directory.is_excluded_customer(&customer.company_name)
                && eligible.get(&customer.id).copied().unwrap_or(false);
            if !keep {
                return None;
            }

            let mut row = ServiceAdjustmentRow {
                service_id: service.id,
                service_type_id: service.service_type_id,
                service_name: service.name.clone(),
                current_price: service.price,
                adjustment: apply_rules(rules, service.service_type_id, service.price)
                    .unwrap_or(Decimal::ZERO),
                confirmed: false,
                customer_id: customer.id,
                customer_entity_id: customer.entity_id.clone(),
                customer_name: customer.company_name.clone(),
                franchisee_id: franchisee.id,
                franchisee_name: franchisee.company_name.clone(),
                national_account: customer.national_account,
            };

            if !reapply_rules {
                if let Some(previous) = prior.get(&service.id) {
                    row.adjustment = previous.adjustment;
                    row.confirmed = previous.confirmed;
                }
            }

            if row.national_account {
                row.confirmed = true;
                if let Some(adjustment) = apply_rules(
                    &session.pricing_rules,
                    service.service_type_id,
                    service.price,
                ) {
                    row.adjustment = adjustment;
                }
            }

            Some(row)
        })
        .collect();

    rows.sort_by(|a, b| {
        a.customer_name
            .cmp(&b.customer_name)
            .then_with(|| a.franchisee_name.cmp(&b.franchisee_name))
            .then_with(|| a.customer_entity_id.cmp(&b.customer_entity_id))
    });

    Ok(rows)
}

/// Rebuild and save a franchisee's sheet for `session`.
///
/// The stored record's rules are used, falling back to the session's rules
/// for a franchisee without a record yet.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if records cannot be read or the sheet
/// cannot be saved.
pub async fn build_franchisee_snapshot(
    store: &dyn RecordStore,
    directory: &Directory,
    today: NaiveDate,
    session: &AdjustmentSession,
    franchisee_id: i64,
    reapply_rules: bool,
) -> Result<FranchiseeAdjustmentRecord, PipelineError> {
    let existing = store.find_franchisee_record(session.id, franchisee_id).await?;

    let (rules, prior) = match &existing {
        Some(record) if !record.pricing_rules.is_empty() => {
            (record.pricing_rules.clone(), record.rows.clone())
        }
        Some(record) => (session.pricing_rules.clone(), record.rows.clone()),
        None => (session.pricing_rules.clone(), Vec::new()),
    };

    let rows = prepare_rows(
        store,
        directory,
        today,
        session,
        franchisee_id,
        &rules,
        &prior,
        reapply_rules,
    )
    .await?;

    let record = store
        .save_franchisee_record(session.id, franchisee_id, &rows, &rules)
        .await?;

    tracing::info!(
        session_id = session.id,
        franchisee_id,
        rows = record.rows.len(),
        reapply_rules,
        "pipeline: franchisee snapshot saved"
    );

    Ok(record)
}
