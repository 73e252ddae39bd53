//! Report command handlers for the CLI.

use chrono::NaiveDate;
use clap::Subcommand;

use priceadj_core::business_today;
use priceadj_pipeline::{build_weekly_report, weekly_report_mail};

use crate::Env;

/// Sub-commands available under `report`.
#[derive(Debug, Subcommand)]
pub enum ReportCommands {
    /// Franchisee activity across sessions still accepting input
    Weekly {
        /// Report as of this date (defaults to today in Sydney)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Mail the report to the configured recipients instead of printing it
        #[arg(long)]
        send: bool,
    },
}

pub(crate) async fn run_report(env: &Env, command: &ReportCommands) -> anyhow::Result<()> {
    match command {
        ReportCommands::Weekly { date, send } => {
            let today = date.unwrap_or_else(|| business_today(chrono::Utc::now()));
            let ctx = env.pipeline()?;

            let Some(workbook) = build_weekly_report(
                ctx.store.as_ref(),
                today,
                &ctx.directory.excluded_franchisee_ids,
            )
            .await?
            else {
                println!("no session is accepting input on {today}");
                return Ok(());
            };

            if *send {
                let mail = weekly_report_mail(&workbook, today, &ctx.directory.report_recipients)?;
                ctx.notifier.send_mail(&mail).await?;
                println!(
                    "weekly report sent to {}",
                    ctx.directory.report_recipients.join(", ")
                );
            } else {
                print!("{}", String::from_utf8_lossy(&workbook.to_csv()?));
            }
            Ok(())
        }
    }
}
