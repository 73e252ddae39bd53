use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::outcome::{ItemFailure, Stage};
use crate::store::RecordStore;
use crate::work_item::{CompletedItem, Phase};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub sessions_notified: Vec<i64>,
    pub sessions_completed: Vec<i64>,
    pub failures: Vec<ItemFailure>,
}

/// Stamp notification or completion on every session that produced output,
/// and on every due session left with nothing to do (all records opted out
/// or every item dropped). A due session whose only outcomes are failures
/// stays unstamped.
///
/// A failing stamp is recorded and the remaining sessions are still stamped.
pub async fn reconcile(
    store: &dyn RecordStore,
    due: &[(Phase, i64)],
    completed: &[CompletedItem],
    failed_sessions: &BTreeSet<i64>,
    now: DateTime<Utc>,
) -> Reconciliation {
    let sessions_for = |phase: Phase| -> BTreeSet<i64> {
        let with_output = completed
            .iter()
            .filter(|c| c.item.phase == phase)
            .map(|c| c.item.session_id);
        let settled = due
            .iter()
            .filter(|(due_phase, id)| *due_phase == phase && !failed_sessions.contains(id))
            .map(|(_, id)| *id);
        with_output.chain(settled).collect()
    };

    let mut result = Reconciliation::default();

    for session_id in sessions_for(Phase::Process) {
        match store.mark_session_completed(session_id, now).await {
            Ok(()) => {
                tracing::info!(session_id, "pipeline: session completed");
                result.sessions_completed.push(session_id);
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "pipeline: failed to stamp completion");
                result.failures.push(ItemFailure::new(
                    Stage::Reconcile,
                    format!("Session_{session_id}"),
                    &e,
                ));
            }
        }
    }

    for session_id in sessions_for(Phase::Notify) {
        match store.mark_session_notified(session_id, now).await {
            Ok(()) => {
                tracing::info!(session_id, "pipeline: session notified");
                result.sessions_notified.push(session_id);
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "pipeline: failed to stamp notification");
                result.failures.push(ItemFailure::new(
                    Stage::Reconcile,
                    format!("Session_{session_id}"),
                    &e,
                ));
            }
        }
    }

    result
}
