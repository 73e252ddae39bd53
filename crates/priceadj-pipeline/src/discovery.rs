//! Find due sessions and fan their franchisee records out into per-customer
//! work items.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use priceadj_core::{AdjustmentSession, SessionStatus};

use crate::error::PipelineError;
use crate::outcome::{ItemFailure, Stage};
use crate::store::{RecordStore, SessionFilter};
use crate::work_item::{Phase, WorkItem};

/// Effective dates that make a session due today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerWindows {
    pub notify_effective: NaiveDate,
    pub process_effective: NaiveDate,
}

impl TriggerWindows {
    #[must_use]
    pub fn for_day(today: NaiveDate, notify_lead_days: u32) -> Self {
        Self {
            notify_effective: today + Duration::days(i64::from(notify_lead_days)),
            process_effective: today,
        }
    }
}

#[derive(Debug, Default)]
pub struct Discovery {
    /// Keyed by [`WorkItem::key`]; a later item with the same key replaces
    /// the earlier one.
    pub items: BTreeMap<String, WorkItem>,
    /// Due sessions whose records loaded, with the phase they are due for.
    pub sessions: Vec<(Phase, i64)>,
    pub failures: Vec<ItemFailure>,
}

/// Sessions due for a phase under `windows`.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if sessions cannot be listed.
pub async fn due_sessions(
    store: &dyn RecordStore,
    windows: TriggerWindows,
) -> Result<Vec<(Phase, AdjustmentSession)>, PipelineError> {
    let notify = store
        .list_sessions(&SessionFilter {
            effective_date: Some(windows.notify_effective),
            status: Some(SessionStatus::Open),
            ..SessionFilter::default()
        })
        .await?;
    let process = store
        .list_sessions(&SessionFilter {
            effective_date: Some(windows.process_effective),
            status: Some(SessionStatus::Notified),
            ..SessionFilter::default()
        })
        .await?;

    Ok(notify
        .into_iter()
        .map(|s| (Phase::Notify, s))
        .chain(process.into_iter().map(|s| (Phase::Process, s)))
        .collect())
}

/// Enumerate work items for every due session.
///
/// A session whose records cannot be loaded is recorded as a failure and
/// skipped; the rest of the run continues.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] only when the due sessions themselves
/// cannot be listed.
pub async fn discover(
    store: &dyn RecordStore,
    windows: TriggerWindows,
) -> Result<Discovery, PipelineError> {
    let sessions = due_sessions(store, windows).await?;
    let mut discovery = Discovery::default();

    for (phase, session) in sessions {
        let records = match store.list_franchisee_records(session.id, false).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    session_id = session.id,
                    error = %e,
                    "pipeline: failed to load franchisee records, skipping session"
                );
                discovery.failures.push(ItemFailure::new(
                    Stage::Discovery,
                    format!("Session_{}", session.id),
                    &e,
                ));
                continue;
            }
        };

        discovery.sessions.push((phase, session.id));
        let effective_date = session.effective_date();
        for record in records {
            // Rows of one customer, in sheet order.
            let mut by_customer: BTreeMap<i64, Vec<_>> = BTreeMap::new();
            for row in record.rows {
                by_customer.entry(row.customer_id).or_default().push(row);
            }

            for (customer_id, rows) in by_customer {
                let Some(first) = rows.first() else {
                    continue;
                };
                let item = WorkItem {
                    phase,
                    session_id: session.id,
                    effective_date,
                    customer_id,
                    customer_name: first.customer_name.clone(),
                    customer_entity_id: first.customer_entity_id.clone(),
                    franchisee_id: record.franchisee_id,
                    franchisee_name: first.franchisee_name.clone(),
                    rows,
                };
                let key = item.key();
                if let Some(previous) = discovery.items.insert(key.clone(), item) {
                    tracing::warn!(
                        key = %key,
                        replaced_session_id = previous.session_id,
                        replaced_franchisee_id = previous.franchisee_id,
                        "pipeline: duplicate work item key, keeping the later one"
                    );
                }
            }
        }
    }

    tracing::debug!(
        items = discovery.items.len(),
        failures = discovery.failures.len(),
        "pipeline: discovery finished"
    );

    Ok(discovery)
}
