//! Read-only session queries for the CLI.

use clap::Subcommand;

use priceadj_core::format_dmy;
use priceadj_pipeline::{franchisee_statuses, RecordStore, SessionFilter};

use crate::Env;

/// Sub-commands available under `sessions`.
#[derive(Debug, Subcommand)]
pub enum SessionsCommands {
    /// List adjustment sessions, oldest effective date first
    List {
        /// Include completed sessions
        #[arg(long)]
        all: bool,
    },
    /// Show each franchisee's status in a session
    Franchisees {
        /// Session id
        session: i64,
    },
}

pub(crate) async fn run_sessions(env: &Env, command: &SessionsCommands) -> anyhow::Result<()> {
    match command {
        SessionsCommands::List { all } => list_sessions(env.store.as_ref(), *all).await,
        SessionsCommands::Franchisees { session } => {
            let directory = priceadj_core::load_directory(&env.config.directory_path)?;
            list_franchisees(
                env.store.as_ref(),
                *session,
                &directory.excluded_franchisee_ids,
            )
            .await
        }
    }
}

async fn list_sessions(store: &dyn RecordStore, include_completed: bool) -> anyhow::Result<()> {
    let sessions = store
        .list_sessions(&SessionFilter {
            exclude_completed: !include_completed,
            ..SessionFilter::default()
        })
        .await?;

    if sessions.is_empty() {
        println!("no sessions found");
        return Ok(());
    }

    let header = format!(
        "{:<6}{:<12}{:<12}{:<12}{:<11}RULES",
        "ID", "EFFECTIVE", "OPENS", "DEADLINE", "STATUS"
    );
    println!("{header}");
    for session in &sessions {
        println!(
            "{:<6}{:<12}{:<12}{:<12}{:<11}{}",
            session.id,
            format_dmy(session.effective_date()),
            format_dmy(session.opening_date),
            format_dmy(session.deadline),
            session.status,
            session.pricing_rules.len()
        );
    }
    Ok(())
}

async fn list_franchisees(
    store: &dyn RecordStore,
    session_id: i64,
    excluded_ids: &[i64],
) -> anyhow::Result<()> {
    store.load_session(session_id).await?;
    let rows = franchisee_statuses(store, session_id, excluded_ids).await?;

    let header = format!("{:<8}{:<40}STATUS", "ID", "FRANCHISEE");
    println!("{header}");
    for row in &rows {
        println!(
            "{:<8}{:<40}{}",
            row.franchisee_id, row.franchisee_name, row.label
        );
    }
    Ok(())
}
