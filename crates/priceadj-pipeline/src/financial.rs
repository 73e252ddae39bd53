use chrono::{Datelike, NaiveDate};

use priceadj_core::PricingLine;

use crate::error::PipelineError;
use crate::store::RecordStore;
use crate::work_item::RevalidatedItem;

/// Pricing lines are rebuilt only from the cutoff day of the month onward,
/// and only for customers with something applied.
#[must_use]
pub fn should_refresh(item: &RevalidatedItem, today: NaiveDate, cutoff_day: u32) -> bool {
    today.day() >= cutoff_day && item.has_actionable()
}

/// Replace the customer's pricing lines with one line per live service.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if services cannot be read or lines written.
pub async fn refresh_pricing_lines(
    store: &dyn RecordStore,
    customer_id: i64,
) -> Result<Vec<PricingLine>, PipelineError> {
    let lines: Vec<PricingLine> = store
        .list_active_services(customer_id)
        .await?
        .iter()
        .map(PricingLine::from_service)
        .collect();

    store.replace_pricing_lines(customer_id, &lines).await?;

    tracing::info!(
        customer_id,
        lines = lines.len(),
        "pipeline: pricing lines refreshed"
    );

    Ok(lines)
}
