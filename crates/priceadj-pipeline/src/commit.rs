//! Apply a customer's confirmed adjustments to the live records.
//!
//! Steps run strictly in order and are not transactional: a failure part-way
//! leaves earlier steps applied and surfaces as an item failure.

use priceadj_core::{
    CommencementStatus, NewCommencementEntry, NewServiceChange, SaleType, ServiceChangeStatus,
};

use crate::error::PipelineError;
use crate::store::RecordStore;
use crate::work_item::RevalidatedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    /// The new signed commencement entry, when one was created.
    pub commencement_entry_id: Option<i64>,
    pub service_changes_created: usize,
    pub commencement_entries_changed: usize,
    pub service_changes_ceased: usize,
    /// The customer already carried this increase; nothing was written.
    pub already_committed: bool,
}

/// Commit one customer's actionable services for the item's session.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] on the first failing step.
pub async fn commit_customer(
    store: &dyn RecordStore,
    item: &RevalidatedItem,
) -> Result<CommitOutcome, PipelineError> {
    let services: Vec<_> = item.actionable().collect();
    if services.is_empty() {
        return Ok(CommitOutcome::default());
    }

    let effective_date = item.effective_date;

    if already_committed(store, item).await? {
        tracing::info!(
            customer_id = item.customer_id,
            session_id = item.session_id,
            %effective_date,
            "pipeline: increase already committed, skipping"
        );
        return Ok(CommitOutcome {
            already_committed: true,
            ..CommitOutcome::default()
        });
    }

    let mut outcome = CommitOutcome::default();

    // 1. Supersede signed entries.
    let signed = store
        .list_commencement_entries(item.customer_id, Some(&CommencementStatus::Signed))
        .await?;
    for entry in &signed {
        store
            .set_commencement_status(entry.id, &CommencementStatus::Changed)
            .await?;
    }
    outcome.commencement_entries_changed = signed.len();

    // 2. Cease active changes of every affected service.
    for service in &services {
        let active = store
            .list_service_changes(service.row.service_id, Some(ServiceChangeStatus::Active))
            .await?;
        for change in &active {
            store
                .set_service_change_status(change.id, ServiceChangeStatus::Ceased)
                .await?;
        }
        outcome.service_changes_ceased += active.len();
    }

    // 3. New signed entry.
    let franchisee = store.load_franchisee(item.franchisee_id).await?;
    let entry = store
        .create_commencement_entry(&NewCommencementEntry::price_increase(
            item.customer_id,
            item.franchisee_id,
            effective_date,
            franchisee.state,
        ))
        .await?;
    outcome.commencement_entry_id = Some(entry.id);

    // 4. One active change per service, then the live price.
    for service in &services {
        let change = NewServiceChange::price_increase(
            service.row.service_id,
            entry.id,
            effective_date,
            service.row.current_price,
            service.row.adjustment,
            service.frequency.clone(),
        );
        store.create_service_change(&change).await?;
        store
            .update_service_price(service.row.service_id, change.new_price)
            .await?;
        outcome.service_changes_created += 1;
    }

    // 5. Stamp the customer.
    store
        .set_customer_last_price_increase(item.customer_id, effective_date)
        .await?;

    tracing::info!(
        customer_id = item.customer_id,
        session_id = item.session_id,
        commencement_entry_id = entry.id,
        services = outcome.service_changes_created,
        "pipeline: customer committed"
    );

    Ok(outcome)
}

/// A re-delivered item for a customer whose commit already finished.
async fn already_committed(
    store: &dyn RecordStore,
    item: &RevalidatedItem,
) -> Result<bool, PipelineError> {
    let customer = store.load_customer(item.customer_id).await?;
    if customer.last_price_increase != Some(item.effective_date) {
        return Ok(false);
    }

    let signed = store
        .list_commencement_entries(item.customer_id, Some(&CommencementStatus::Signed))
        .await?;
    Ok(signed
        .iter()
        .any(|e| e.sale_type == SaleType::PriceIncrease && e.commencement_date == item.effective_date))
}
