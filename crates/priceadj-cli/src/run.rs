use chrono::NaiveDate;

use priceadj_pipeline::{
    run_and_record, run_pipeline, PipelineContext, RunLedger, RunSummary, Trigger,
};

/// Run the processor once for `date` (default: today's business date).
///
/// A dry run goes through discovery and revalidation only; nothing is
/// written, sent or recorded in the run ledger.
///
/// # Errors
///
/// Returns an error if the run aborts or cannot be recorded.
pub(crate) async fn run_once(
    ctx: &PipelineContext,
    ledger: &dyn RunLedger,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    if ctx.settings.dry_run {
        let summary = run_pipeline(ctx, date).await?;
        print_dry_run(&summary);
        return Ok(());
    }

    let recorded = run_and_record(ctx, ledger, Trigger::Cli, date).await?;
    println!("run {} ({})", recorded.run_id, recorded.public_id);
    for line in summary_lines(&recorded.summary) {
        println!("{line}");
    }

    if recorded.summary.items_failed() > 0 {
        anyhow::bail!(
            "{} work item(s) failed; see the run ledger for details",
            recorded.summary.items_failed()
        );
    }
    Ok(())
}

fn print_dry_run(summary: &RunSummary) {
    let date = summary
        .business_date
        .map_or_else(|| "unknown".to_string(), |d| d.to_string());
    println!(
        "dry run for {date}: {} item(s) discovered",
        summary.items_discovered
    );

    if summary.dry_run_keys.is_empty() {
        println!("nothing to dispatch");
    }
    for key in &summary.dry_run_keys {
        println!("  would dispatch {key}");
    }
    for key in &summary.dropped_keys {
        println!("  dropped        {key}");
    }
    for failure in &summary.failures {
        println!(
            "  failed         {} [{}]: {}",
            failure.key,
            failure.stage.as_str(),
            failure.message
        );
    }
}

fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![
        format!("discovered:        {}", summary.items_discovered),
        format!("completed:         {}", summary.completed_keys.len()),
        format!("dropped:           {}", summary.dropped_keys.len()),
        format!("already committed: {}", summary.already_committed_keys.len()),
        format!("failed:            {}", summary.failures.len()),
    ];
    if !summary.sessions_notified.is_empty() {
        lines.push(format!("sessions notified: {:?}", summary.sessions_notified));
    }
    if !summary.sessions_completed.is_empty() {
        lines.push(format!("sessions completed: {:?}", summary.sessions_completed));
    }
    if summary.run_report_sent {
        lines.push("run report sent".to_string());
    }
    if summary.weekly_report_sent {
        lines.push("weekly report sent".to_string());
    }
    for failure in &summary.failures {
        lines.push(format!(
            "  {} [{}]: {}",
            failure.key,
            failure.stage.as_str(),
            failure.message
        ));
    }
    lines
}
