mod report;
mod run;
mod sessions;

use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use priceadj_core::AppConfig;
use priceadj_db::PgStore;
use priceadj_pipeline::{PipelineContext, PipelineSettings, SystemClock};

use crate::report::ReportCommands;
use crate::sessions::SessionsCommands;

#[derive(Debug, Parser)]
#[command(name = "priceadj-cli")]
#[command(about = "Franchise price adjustment processor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run the processor once
    Run {
        /// Business date to run as (defaults to today in Sydney)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Print the work items a real run would dispatch without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect adjustment sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommands,
    },
    /// Build activity reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

/// Config, pool and the processor's collaborators, shared by every command
/// that touches records.
struct Env {
    config: AppConfig,
    store: Arc<PgStore>,
}

impl Env {
    async fn connect() -> anyhow::Result<Self> {
        let config = priceadj_core::load_app_config()?;
        let pool_config = priceadj_db::PoolConfig::from_app_config(&config);
        let pool = priceadj_db::connect_pool(&config.database_url, pool_config).await?;
        Ok(Self {
            config,
            store: Arc::new(PgStore::new(pool)),
        })
    }

    fn pipeline(&self) -> anyhow::Result<PipelineContext> {
        let directory = priceadj_core::load_directory(&self.config.directory_path)?;
        Ok(PipelineContext {
            store: self.store.clone(),
            notifier: priceadj_mailer::notifier_from_config(&self.config)?,
            clock: Arc::new(SystemClock),
            directory: Arc::new(directory),
            settings: PipelineSettings::from_config(&self.config),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("priceadj-cli: pass --help for the available commands");
        return Ok(());
    };

    let env = Env::connect().await?;
    match command {
        Commands::Db { command } => run_db(&env, &command).await,
        Commands::Run { date, dry_run } => {
            let mut ctx = env.pipeline()?;
            ctx.settings.dry_run = dry_run;
            run::run_once(&ctx, env.store.as_ref(), date).await
        }
        Commands::Sessions { command } => sessions::run_sessions(&env, &command).await,
        Commands::Report { command } => report::run_report(&env, &command).await,
    }
}

async fn run_db(env: &Env, command: &DbCommands) -> anyhow::Result<()> {
    let pool = env.store.pool();
    match command {
        DbCommands::Ping => {
            priceadj_db::ping(pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = priceadj_db::run_migrations(pool).await?;
            println!("migrations applied: {applied}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
