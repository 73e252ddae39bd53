//! Background job scheduler.
//!
//! Registers the daily processor run at server startup.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use priceadj_pipeline::{run_and_record, PipelineContext, RunLedger, Trigger};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// `run_cron` is not a valid six-field cron expression, or the scheduler
/// fails to start.
pub async fn build_scheduler(
    ctx: PipelineContext,
    ledger: Arc<dyn RunLedger>,
    run_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_processor_job(&scheduler, ctx, ledger, run_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the daily processor run.
///
/// The default `0 0 16 * * *` fires at 16:00 UTC, which is 02:00 the next
/// business day in Australian eastern time.
async fn register_processor_job(
    scheduler: &JobScheduler,
    ctx: PipelineContext,
    ledger: Arc<dyn RunLedger>,
    run_cron: &str,
) -> Result<(), JobSchedulerError> {
    let ctx = Arc::new(ctx);

    let job = Job::new_async(run_cron, move |_uuid, _lock| {
        let ctx = Arc::clone(&ctx);
        let ledger = Arc::clone(&ledger);

        Box::pin(async move {
            tracing::info!("scheduler: starting processor run");
            run_processor(&ctx, ledger.as_ref()).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = run_cron, "scheduler: processor run registered");
    Ok(())
}

async fn run_processor(ctx: &PipelineContext, ledger: &dyn RunLedger) {
    match run_and_record(ctx, ledger, Trigger::Scheduler, None).await {
        Ok(recorded) => {
            tracing::info!(
                run_id = recorded.run_id,
                items_processed = recorded.summary.items_processed(),
                items_failed = recorded.summary.items_failed(),
                "scheduler: processor run complete"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: processor run failed");
        }
    }
}
