use std::collections::HashMap;

use crate::error::PipelineError;
use crate::store::RecordStore;
use crate::work_item::{CandidateService, RevalidatedItem, WorkItem};

/// Intersect an item's rows with the customer's live services.
///
/// Rows whose service is gone (inactive, re-categorised or deleted) are
/// dropped. Returns `None` when nothing survives.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if the live services cannot be read.
pub async fn revalidate(
    store: &dyn RecordStore,
    item: WorkItem,
) -> Result<Option<RevalidatedItem>, PipelineError> {
    let live: HashMap<i64, _> = store
        .list_active_services(item.customer_id)
        .await?
        .into_iter()
        .map(|service| (service.id, service))
        .collect();

    let services: Vec<CandidateService> = item
        .rows
        .into_iter()
        .filter_map(|row| {
            live.get(&row.service_id).map(|service| CandidateService {
                frequency: service.days.frequency(),
                row,
            })
        })
        .collect();

    if services.is_empty() {
        tracing::debug!(
            customer_id = item.customer_id,
            session_id = item.session_id,
            "pipeline: no live services left, dropping item"
        );
        return Ok(None);
    }

    Ok(Some(RevalidatedItem {
        phase: item.phase,
        session_id: item.session_id,
        effective_date: item.effective_date,
        customer_id: item.customer_id,
        customer_name: item.customer_name,
        customer_entity_id: item.customer_entity_id,
        franchisee_id: item.franchisee_id,
        franchisee_name: item.franchisee_name,
        services,
    }))
}
