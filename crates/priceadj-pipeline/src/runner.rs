//! One end-to-end processor run: discover, revalidate and dispatch in
//! parallel, then report and reconcile.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use priceadj_core::{business_today, format_dmy, AppConfig, Directory};

use crate::clock::Clock;
use crate::discovery::{discover, TriggerWindows};
use crate::dispatch::{dispatch, DispatchDeps};
use crate::error::{PipelineError, StoreError};
use crate::ledger::{ItemOutcome, RunItem, RunLedger};
use crate::notifier::{MaintainerAlert, Notifier};
use crate::outcome::{ItemFailure, Stage};
use crate::reconcile::reconcile;
use crate::report::{
    build_run_report, build_weekly_report, is_weekly_report_day, run_report_mail,
    weekly_report_mail,
};
use crate::revalidate::revalidate;
use crate::store::RecordStore;
use crate::work_item::{CompletedItem, Phase, Trigger, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub notify_lead_days: u32,
    pub financial_cutoff_day: u32,
    pub max_concurrent_items: usize,
    /// Stop after revalidation; nothing is written or sent.
    pub dry_run: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            notify_lead_days: 14,
            financial_cutoff_day: 15,
            max_concurrent_items: 4,
            dry_run: false,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            notify_lead_days: config.notify_lead_days,
            financial_cutoff_day: config.financial_cutoff_day,
            max_concurrent_items: config.max_concurrent_items,
            dry_run: false,
        }
    }
}

/// Everything a run needs, shareable between the scheduler, the API and the CLI.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn RecordStore>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<Directory>,
    pub settings: PipelineSettings,
}

impl PipelineContext {
    #[must_use]
    pub fn business_today(&self) -> NaiveDate {
        business_today(self.clock.now())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub business_date: Option<NaiveDate>,
    pub items_discovered: usize,
    /// `NotifiedCustomer_*` and `ProcessedCustomer_*` keys.
    pub completed_keys: Vec<String>,
    /// Discovery keys of items with no live service left.
    pub dropped_keys: Vec<String>,
    /// Process items skipped because their increase was already committed.
    pub already_committed_keys: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub sessions_notified: Vec<i64>,
    pub sessions_completed: Vec<i64>,
    pub run_report_sent: bool,
    pub weekly_report_sent: bool,
    /// Revalidated keys that a real run would dispatch. Only set on dry runs.
    pub dry_run_keys: Vec<String>,
}

impl RunSummary {
    #[must_use]
    pub fn items_processed(&self) -> i32 {
        i32::try_from(self.completed_keys.len()).unwrap_or(i32::MAX)
    }

    #[must_use]
    pub fn items_failed(&self) -> i32 {
        i32::try_from(self.failures.len()).unwrap_or(i32::MAX)
    }

    /// Per-key outcomes in the shape the run ledger stores.
    #[must_use]
    pub fn run_items(&self) -> Vec<RunItem> {
        let completed = self.completed_keys.iter().map(|key| RunItem {
            key: key.clone(),
            stage: Stage::Dispatch.as_str().to_string(),
            outcome: ItemOutcome::Succeeded,
            message: None,
        });
        let dropped = self.dropped_keys.iter().map(|key| RunItem {
            key: key.clone(),
            stage: Stage::Revalidate.as_str().to_string(),
            outcome: ItemOutcome::Dropped,
            message: Some("no live services".to_string()),
        });
        let failed = self.failures.iter().map(|failure| RunItem {
            key: failure.key.clone(),
            stage: failure.stage.as_str().to_string(),
            outcome: ItemOutcome::Failed,
            message: Some(failure.message.clone()),
        });
        completed.chain(dropped).chain(failed).collect()
    }
}

enum ItemResult {
    Completed(CompletedItem),
    Dropped(String),
    /// Carries the session id so the session is left unstamped.
    Failed(i64, ItemFailure),
}

async fn process_item(ctx: &PipelineContext, today: NaiveDate, item: WorkItem) -> ItemResult {
    let key = item.key();
    let session_id = item.session_id;

    let revalidated = match revalidate(ctx.store.as_ref(), item).await {
        Ok(Some(revalidated)) => revalidated,
        Ok(None) => return ItemResult::Dropped(key),
        Err(e) => {
            return ItemResult::Failed(session_id, ItemFailure::new(Stage::Revalidate, key, &e))
        }
    };

    let key = revalidated.key();
    let deps = DispatchDeps {
        store: ctx.store.as_ref(),
        notifier: ctx.notifier.as_ref(),
        template: &ctx.directory.notice_template,
        today,
        financial_cutoff_day: ctx.settings.financial_cutoff_day,
    };

    match dispatch(&deps, revalidated).await {
        Ok(completed) => ItemResult::Completed(completed),
        Err(e) => ItemResult::Failed(session_id, ItemFailure::new(Stage::Dispatch, key, &e)),
    }
}

async fn dry_run(ctx: &PipelineContext, items: Vec<WorkItem>, summary: &mut RunSummary) {
    for item in items {
        let key = item.key();
        match revalidate(ctx.store.as_ref(), item).await {
            Ok(Some(revalidated)) => summary.dry_run_keys.push(revalidated.key()),
            Ok(None) => summary.dropped_keys.push(key),
            Err(e) => summary
                .failures
                .push(ItemFailure::new(Stage::Revalidate, key, &e)),
        }
    }
}

async fn send_reports(
    ctx: &PipelineContext,
    today: NaiveDate,
    completed: &[CompletedItem],
    summary: &mut RunSummary,
) {
    let recipients = &ctx.directory.report_recipients;

    if let Some(workbook) = build_run_report(completed) {
        let sent = match run_report_mail(&workbook, today, recipients) {
            Ok(mail) => ctx.notifier.send_mail(&mail).await.map_err(PipelineError::from),
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => summary.run_report_sent = true,
            Err(e) => {
                tracing::error!(error = %e, "pipeline: failed to send run report");
                summary
                    .failures
                    .push(ItemFailure::new(Stage::Report, "RunReport", &e));
            }
        }
    }

    if !is_weekly_report_day(today) {
        return;
    }

    let weekly = match build_weekly_report(
        ctx.store.as_ref(),
        today,
        &ctx.directory.excluded_franchisee_ids,
    )
    .await
    {
        Ok(Some(workbook)) => weekly_report_mail(&workbook, today, recipients),
        Ok(None) => return,
        Err(e) => Err(e),
    };
    let sent = match weekly {
        Ok(mail) => ctx.notifier.send_mail(&mail).await.map_err(PipelineError::from),
        Err(e) => Err(e),
    };
    match sent {
        Ok(()) => summary.weekly_report_sent = true,
        Err(e) => {
            tracing::error!(error = %e, "pipeline: failed to send weekly report");
            summary
                .failures
                .push(ItemFailure::new(Stage::Report, "WeeklyReport", &e));
        }
    }
}

async fn alert_on_failures(ctx: &PipelineContext, today: NaiveDate, summary: &RunSummary) {
    if summary.failures.is_empty() || ctx.directory.maintainers.is_empty() {
        return;
    }

    let mut body = format!(
        "{} failure(s) during the price increase run for {}:\n\n",
        summary.failures.len(),
        format_dmy(today)
    );
    for failure in &summary.failures {
        let _ = writeln!(body, "{failure}");
    }

    let alert = MaintainerAlert {
        recipients: ctx.directory.maintainers.clone(),
        subject: format!("Price increase run failures ({})", format_dmy(today)),
        body,
    };
    if let Err(e) = ctx.notifier.alert_maintainers(&alert).await {
        tracing::error!(error = %e, "pipeline: failed to alert maintainers");
    }
}

/// Run the processor once for `date`, or for the clock's business day.
///
/// Per-item, report and reconciliation failures are collected in the
/// summary and never abort the run.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] when due sessions cannot be listed.
pub async fn run_pipeline(
    ctx: &PipelineContext,
    date: Option<NaiveDate>,
) -> Result<RunSummary, PipelineError> {
    let today = date.unwrap_or_else(|| ctx.business_today());
    let windows = TriggerWindows::for_day(today, ctx.settings.notify_lead_days);

    tracing::info!(
        %today,
        notify_effective = %windows.notify_effective,
        process_effective = %windows.process_effective,
        dry_run = ctx.settings.dry_run,
        "pipeline: run starting"
    );

    let discovery = discover(ctx.store.as_ref(), windows).await?;
    let mut summary = RunSummary {
        business_date: Some(today),
        items_discovered: discovery.items.len(),
        failures: discovery.failures,
        ..RunSummary::default()
    };
    let due_sessions = discovery.sessions;
    let items: Vec<WorkItem> = discovery.items.into_values().collect();

    if ctx.settings.dry_run {
        dry_run(ctx, items, &mut summary).await;
        tracing::info!(
            would_dispatch = summary.dry_run_keys.len(),
            dropped = summary.dropped_keys.len(),
            failed = summary.failures.len(),
            "pipeline: dry run finished"
        );
        return Ok(summary);
    }

    let results: Vec<ItemResult> = stream::iter(items)
        .map(|item| process_item(ctx, today, item))
        .buffer_unordered(ctx.settings.max_concurrent_items.max(1))
        .collect()
        .await;

    let mut completed = Vec::new();
    let mut failed_sessions = BTreeSet::new();
    for result in results {
        match result {
            ItemResult::Completed(done) => completed.push(done),
            ItemResult::Dropped(key) => summary.dropped_keys.push(key),
            ItemResult::Failed(session_id, failure) => {
                failed_sessions.insert(session_id);
                summary.failures.push(failure);
            }
        }
    }
    completed.sort_by_key(CompletedItem::key);
    summary.dropped_keys.sort();

    for failure in &summary.failures {
        tracing::error!(
            stage = %failure.stage,
            key = %failure.key,
            error = %failure.message,
            "pipeline: item failed"
        );
    }

    summary.completed_keys = completed.iter().map(CompletedItem::key).collect();
    summary.already_committed_keys = completed
        .iter()
        .filter(|c| c.item.phase == Phase::Process && c.already_committed)
        .map(CompletedItem::key)
        .collect();

    send_reports(ctx, today, &completed, &mut summary).await;

    let reconciliation = reconcile(
        ctx.store.as_ref(),
        &due_sessions,
        &completed,
        &failed_sessions,
        ctx.clock.now(),
    )
    .await;
    summary.sessions_notified = reconciliation.sessions_notified;
    summary.sessions_completed = reconciliation.sessions_completed;
    summary.failures.extend(reconciliation.failures);

    alert_on_failures(ctx, today, &summary).await;

    tracing::info!(
        completed = summary.completed_keys.len(),
        dropped = summary.dropped_keys.len(),
        failed = summary.failures.len(),
        sessions_notified = summary.sessions_notified.len(),
        sessions_completed = summary.sessions_completed.len(),
        "pipeline: run finished"
    );

    Ok(summary)
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedRun {
    pub run_id: i64,
    pub public_id: Uuid,
    pub summary: RunSummary,
}

async fn fail_run_best_effort(ledger: &dyn RunLedger, run_id: i64, message: &str) {
    if let Err(e) = ledger.fail_run(run_id, message).await {
        tracing::error!(run_id, error = %e, "pipeline: failed to mark run as failed");
    }
}

async fn record_outcome(
    ledger: &dyn RunLedger,
    run_id: i64,
    summary: &RunSummary,
) -> Result<(), StoreError> {
    ledger.record_items(run_id, &summary.run_items()).await?;
    ledger
        .complete_run(run_id, summary.items_processed(), summary.items_failed())
        .await
}

/// [`run_pipeline`] wrapped in a ledger entry: `queued -> running ->
/// succeeded | failed`, with every keyed outcome stored against the run.
///
/// # Errors
///
/// Returns an error if the run cannot be created or started, the pipeline
/// aborts, or the outcome cannot be recorded. The ledger entry is marked
/// failed (best effort) in the latter cases.
pub async fn run_and_record(
    ctx: &PipelineContext,
    ledger: &dyn RunLedger,
    trigger: Trigger,
    date: Option<NaiveDate>,
) -> Result<RecordedRun, PipelineError> {
    let today = date.unwrap_or_else(|| ctx.business_today());

    let run = ledger.create_run(trigger.as_str(), today).await?;
    if let Err(e) = ledger.start_run(run.id).await {
        fail_run_best_effort(ledger, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    let summary = match run_pipeline(ctx, Some(today)).await {
        Ok(summary) => summary,
        Err(e) => {
            fail_run_best_effort(ledger, run.id, &e.to_string()).await;
            return Err(e);
        }
    };

    if let Err(e) = record_outcome(ledger, run.id, &summary).await {
        fail_run_best_effort(ledger, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    tracing::info!(
        run_id = run.id,
        trigger = trigger.as_str(),
        items_processed = summary.items_processed(),
        items_failed = summary.items_failed(),
        "pipeline: run recorded"
    );

    Ok(RecordedRun {
        run_id: run.id,
        public_id: run.public_id,
        summary,
    })
}
