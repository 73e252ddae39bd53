mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use priceadj_pipeline::{PipelineContext, PipelineSettings, RunLedger, SystemClock};

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = priceadj_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = priceadj_db::PoolConfig::from_app_config(&config);
    let pool = priceadj_db::connect_pool(&config.database_url, pool_config).await?;
    priceadj_db::run_migrations(&pool).await?;

    let directory = priceadj_core::load_directory(&config.directory_path)?;
    let store = Arc::new(priceadj_db::PgStore::new(pool));
    let ledger: Arc<dyn RunLedger> = store.clone();

    let pipeline = PipelineContext {
        store,
        notifier: priceadj_mailer::notifier_from_config(&config)?,
        clock: Arc::new(SystemClock),
        directory: Arc::new(directory),
        settings: PipelineSettings::from_config(&config),
    };

    let _scheduler =
        scheduler::build_scheduler(pipeline.clone(), Arc::clone(&ledger), &config.run_cron)
            .await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        priceadj_core::Environment::Development
    ))?;
    let app = build_app(AppState { pipeline, ledger }, auth, default_rate_limit_state());

    tracing::info!(addr = %config.bind_addr, env = %config.env, "server: listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
